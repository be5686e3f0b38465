//! Client-side reaction state with optimistic updates.
//!
//! A client shows the predicted result of a toggle immediately
//! ([`ReactionView::toggle_local`]), then replaces it with the server's answer
//! when it arrives ([`ReactionView::confirm`]). The server state always wins;
//! a failed call restores the last confirmed state ([`ReactionView::reject`]).

use serde::Serialize;

use crate::ledger::ToggleOutcome;
use crate::model::{PostWithState, ReactionCounts, ReactionKind, ReactionSet, TogglePlan};

/// Counters and active kinds for one `(user, post)` pair.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub counts: ReactionCounts,
    pub active: ReactionSet,
}

impl From<&ToggleOutcome> for Snapshot {
    fn from(outcome: &ToggleOutcome) -> Self {
        Self {
            counts: outcome.counts,
            active: outcome.active,
        }
    }
}

impl From<&PostWithState> for Snapshot {
    fn from(row: &PostWithState) -> Self {
        Self {
            counts: row.post.counts,
            active: row.active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ViewState {
    Confirmed(Snapshot),
    Pending {
        confirmed: Snapshot,
        predicted: Snapshot,
    },
}

/// Optimistic view of one post's reactions for the local user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactionView {
    state: ViewState,
}

impl ReactionView {
    #[must_use]
    pub const fn new(server: Snapshot) -> Self {
        Self {
            state: ViewState::Confirmed(server),
        }
    }

    /// What the client should render right now.
    #[must_use]
    pub const fn displayed(&self) -> Snapshot {
        match self.state {
            ViewState::Confirmed(snapshot) => snapshot,
            ViewState::Pending { predicted, .. } => predicted,
        }
    }

    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.state, ViewState::Pending { .. })
    }

    /// Apply a toggle locally ahead of the server. Further toggles while
    /// pending stack on the prediction.
    pub fn toggle_local(&mut self, kind: ReactionKind) -> TogglePlan {
        let confirmed = match self.state {
            ViewState::Confirmed(snapshot) | ViewState::Pending { confirmed: snapshot, .. } => {
                snapshot
            }
        };
        let mut predicted = self.displayed();
        let plan = TogglePlan::decide(predicted.active, kind);
        plan.apply(&mut predicted.active, &mut predicted.counts);
        self.state = ViewState::Pending {
            confirmed,
            predicted,
        };
        plan
    }

    /// Overwrite local state with the server's. Returns whether the
    /// prediction (if any) matched.
    pub fn confirm(&mut self, server: Snapshot) -> bool {
        let matched = self.displayed() == server;
        if !matched && self.is_pending() {
            tracing::warn!(
                predicted = ?self.displayed(),
                server = ?server,
                "optimistic prediction diverged from server"
            );
        }
        self.state = ViewState::Confirmed(server);
        matched
    }

    /// Drop the prediction and return to the last confirmed state.
    pub const fn reject(&mut self) {
        if let ViewState::Pending { confirmed, .. } = self.state {
            self.state = ViewState::Confirmed(confirmed);
        }
    }
}
