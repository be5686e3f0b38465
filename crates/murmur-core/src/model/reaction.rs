use serde::{Deserialize, Serialize, Serializer};
use std::{fmt, str::FromStr};

use crate::error::LedgerError;

/// The three reactions a user can hold on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReactionKind {
    Upvote,
    Downvote,
    Laugh,
}

impl ReactionKind {
    pub const ALL: [Self; 3] = [Self::Upvote, Self::Downvote, Self::Laugh];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upvote => "upvote",
            Self::Downvote => "downvote",
            Self::Laugh => "laugh",
        }
    }

    /// The kind that cannot be active alongside this one, if any.
    ///
    /// Upvote and downvote exclude each other; laugh coexists with both.
    #[must_use]
    pub const fn opposing(self) -> Option<Self> {
        match self {
            Self::Upvote => Some(Self::Downvote),
            Self::Downvote => Some(Self::Upvote),
            Self::Laugh => None,
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Upvote => 0b001,
            Self::Downvote => 0b010,
            Self::Laugh => 0b100,
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "upvote" | "upvotes" | "up" => Ok(Self::Upvote),
            "downvote" | "downvotes" | "down" => Ok(Self::Downvote),
            "laugh" | "laughs" => Ok(Self::Laugh),
            _ => Err(LedgerError::InvalidKind(s.to_string())),
        }
    }
}

/// The set of reactions one user holds on one post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ReactionSet(u8);

impl ReactionSet {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub const fn contains(self, kind: ReactionKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub const fn insert(&mut self, kind: ReactionKind) {
        self.0 |= kind.bit();
    }

    pub const fn remove(&mut self, kind: ReactionKind) {
        self.0 &= !kind.bit();
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Active kinds in canonical order (upvote, downvote, laugh).
    pub fn iter(self) -> impl Iterator<Item = ReactionKind> {
        ReactionKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

impl FromIterator<ReactionKind> for ReactionSet {
    fn from_iter<I: IntoIterator<Item = ReactionKind>>(iter: I) -> Self {
        let mut set = Self::empty();
        for kind in iter {
            set.insert(kind);
        }
        set
    }
}

impl Serialize for ReactionSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for ReactionSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let kinds = Vec::<ReactionKind>::deserialize(deserializer)?;
        Ok(kinds.into_iter().collect())
    }
}

impl fmt::Display for ReactionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(ReactionKind::as_str).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// Cached per-post aggregate counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReactionCounts {
    pub upvotes: u64,
    pub downvotes: u64,
    pub laughs: u64,
}

impl ReactionCounts {
    #[must_use]
    pub const fn get(&self, kind: ReactionKind) -> u64 {
        match kind {
            ReactionKind::Upvote => self.upvotes,
            ReactionKind::Downvote => self.downvotes,
            ReactionKind::Laugh => self.laughs,
        }
    }

    pub const fn set(&mut self, kind: ReactionKind, value: u64) {
        match kind {
            ReactionKind::Upvote => self.upvotes = value,
            ReactionKind::Downvote => self.downvotes = value,
            ReactionKind::Laugh => self.laughs = value,
        }
    }

    pub const fn increment(&mut self, kind: ReactionKind) {
        self.set(kind, self.get(kind).saturating_add(1));
    }

    pub const fn decrement(&mut self, kind: ReactionKind) {
        self.set(kind, self.get(kind).saturating_sub(1));
    }

    /// Ranking score for the "hot" view: `upvotes + laughs - downvotes`.
    #[must_use]
    pub fn score(&self) -> i64 {
        let positive = i64::try_from(self.upvotes.saturating_add(self.laughs)).unwrap_or(i64::MAX);
        let negative = i64::try_from(self.downvotes).unwrap_or(i64::MAX);
        positive.saturating_sub(negative)
    }
}

/// Whether a toggle turns a reaction on or off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleAction {
    On,
    Off,
}

/// The state transition decided for one `(user, post, kind)` toggle.
///
/// Computed from the user's currently active set alone; the ledger applies it
/// to the entry rows and counters inside one transaction, and the client view
/// applies it to its local prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TogglePlan {
    pub kind: ReactionKind,
    pub action: ToggleAction,
    /// Opposing kind removed as part of this toggle (toggle-on only).
    pub displaced: Option<ReactionKind>,
}

impl TogglePlan {
    /// Decide what toggling `kind` does given the user's `active` reactions.
    #[must_use]
    pub fn decide(active: ReactionSet, kind: ReactionKind) -> Self {
        if active.contains(kind) {
            return Self {
                kind,
                action: ToggleAction::Off,
                displaced: None,
            };
        }

        let displaced = kind.opposing().filter(|other| active.contains(*other));
        Self {
            kind,
            action: ToggleAction::On,
            displaced,
        }
    }

    /// Apply the plan to an active set and its counters.
    pub const fn apply(&self, active: &mut ReactionSet, counts: &mut ReactionCounts) {
        if let Some(displaced) = self.displaced {
            active.remove(displaced);
            counts.decrement(displaced);
        }
        match self.action {
            ToggleAction::On => {
                active.insert(self.kind);
                counts.increment(self.kind);
            }
            ToggleAction::Off => {
                active.remove(self.kind);
                counts.decrement(self.kind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(kinds: &[ReactionKind]) -> ReactionSet {
        kinds.iter().copied().collect()
    }

    #[test]
    fn parse_accepts_singular_plural_and_short_forms() {
        assert_eq!("upvote".parse::<ReactionKind>().unwrap(), ReactionKind::Upvote);
        assert_eq!("Upvotes".parse::<ReactionKind>().unwrap(), ReactionKind::Upvote);
        assert_eq!(" down ".parse::<ReactionKind>().unwrap(), ReactionKind::Downvote);
        assert_eq!("LAUGHS".parse::<ReactionKind>().unwrap(), ReactionKind::Laugh);
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let err = "heart".parse::<ReactionKind>().unwrap_err();
        assert!(matches!(err, LedgerError::InvalidKind(ref got) if got == "heart"));
    }

    #[test]
    fn serde_uses_lowercase_names() {
        assert_eq!(serde_json::to_string(&ReactionKind::Laugh).unwrap(), "\"laugh\"");
        let active = set(&[ReactionKind::Laugh, ReactionKind::Upvote]);
        assert_eq!(serde_json::to_string(&active).unwrap(), r#"["upvote","laugh"]"#);
        let back: ReactionSet = serde_json::from_str(r#"["laugh","upvote"]"#).unwrap();
        assert_eq!(back, active);
    }

    #[test]
    fn toggle_on_absent_kind() {
        let plan = TogglePlan::decide(ReactionSet::empty(), ReactionKind::Upvote);
        assert_eq!(plan.action, ToggleAction::On);
        assert_eq!(plan.displaced, None);
    }

    #[test]
    fn toggle_off_present_kind() {
        let plan = TogglePlan::decide(set(&[ReactionKind::Laugh]), ReactionKind::Laugh);
        assert_eq!(plan.action, ToggleAction::Off);
        assert_eq!(plan.displaced, None);
    }

    #[test]
    fn upvote_displaces_downvote() {
        let mut active = set(&[ReactionKind::Downvote, ReactionKind::Laugh]);
        let mut counts = ReactionCounts {
            upvotes: 3,
            downvotes: 2,
            laughs: 1,
        };

        let plan = TogglePlan::decide(active, ReactionKind::Upvote);
        assert_eq!(plan.displaced, Some(ReactionKind::Downvote));

        plan.apply(&mut active, &mut counts);
        assert_eq!(active, set(&[ReactionKind::Upvote, ReactionKind::Laugh]));
        assert_eq!(
            counts,
            ReactionCounts {
                upvotes: 4,
                downvotes: 1,
                laughs: 1,
            }
        );
    }

    #[test]
    fn toggling_off_never_displaces() {
        let plan = TogglePlan::decide(set(&[ReactionKind::Downvote]), ReactionKind::Downvote);
        assert_eq!(plan.action, ToggleAction::Off);
        assert_eq!(plan.displaced, None);
    }

    #[test]
    fn laugh_never_displaces() {
        let plan = TogglePlan::decide(
            set(&[ReactionKind::Upvote, ReactionKind::Downvote]),
            ReactionKind::Laugh,
        );
        assert_eq!(plan.displaced, None);
    }

    #[test]
    fn score_is_up_plus_laugh_minus_down() {
        let counts = ReactionCounts {
            upvotes: 2,
            downvotes: 5,
            laughs: 1,
        };
        assert_eq!(counts.score(), -2);
    }

    #[test]
    fn display_lists_kinds_in_order() {
        assert_eq!(set(&[]).to_string(), "{}");
        assert_eq!(
            set(&[ReactionKind::Laugh, ReactionKind::Downvote]).to_string(),
            "{downvote, laugh}"
        );
    }
}
