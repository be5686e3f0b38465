//! Read-side feed projections: ordering, cursor paging, relative time labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::LedgerError;
use crate::model::{PostId, PostWithState};

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

/// Feed ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Newest first, ties broken by post ID ascending.
    #[default]
    Recent,
    /// Highest `upvotes + laughs - downvotes` first, then recency.
    Hot,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Recent => f.write_str("recent"),
            Self::Hot => f.write_str("hot"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "recent" | "new" | "newest" => Ok(Self::Recent),
            "hot" | "top" => Ok(Self::Hot),
            other => Err(LedgerError::InvalidInput(format!(
                "unknown sort order '{other}': expected one of recent, hot"
            ))),
        }
    }
}

fn recency(a: &PostWithState, b: &PostWithState) -> Ordering {
    b.post
        .created_at
        .cmp(&a.post.created_at)
        .then_with(|| a.post.id.cmp(&b.post.id))
}

/// Sort posts in place. Stable for equal keys.
pub fn sort_posts(posts: &mut [PostWithState], order: SortOrder) {
    match order {
        SortOrder::Recent => posts.sort_by(recency),
        SortOrder::Hot => posts.sort_by(|a, b| {
            b.post
                .counts
                .score()
                .cmp(&a.post.counts.score())
                .then_with(|| recency(a, b))
        }),
    }
}

// ---------------------------------------------------------------------------
// Paging
// ---------------------------------------------------------------------------

/// Position in the recency ordering: the last row a caller has seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    pub created_at_us: i64,
    pub post_id: PostId,
}

impl FeedCursor {
    #[must_use]
    pub fn after(post: &PostWithState) -> Self {
        Self {
            created_at_us: post.post.created_at_us(),
            post_id: post.post.id.clone(),
        }
    }

    /// Whether a row at `(created_at_us, post_id)` comes strictly after this
    /// cursor in recency order.
    #[must_use]
    pub fn admits(&self, created_at_us: i64, post_id: &PostId) -> bool {
        created_at_us < self.created_at_us
            || (created_at_us == self.created_at_us && post_id > &self.post_id)
    }
}

impl fmt::Display for FeedCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.created_at_us, self.post_id)
    }
}

impl FromStr for FeedCursor {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::InvalidInput(format!("invalid feed cursor '{s}'"));
        let (micros, id) = s.split_once(':').ok_or_else(invalid)?;
        let created_at_us = micros.parse::<i64>().map_err(|_| invalid())?;
        if id.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            created_at_us,
            post_id: PostId::new(id),
        })
    }
}

/// Which slice of the recency-ordered feed to read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRequest {
    pub after: Option<FeedCursor>,
    pub limit: Option<usize>,
}

impl PageRequest {
    /// The whole feed.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            after: None,
            limit: None,
        }
    }
}

/// One page of the feed plus the cursor for the next page, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page {
    pub posts: Vec<PostWithState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<FeedCursor>,
}

// ---------------------------------------------------------------------------
// Relative time
// ---------------------------------------------------------------------------

/// Short relative-time label such as `5m ago` or `2h ago`.
#[must_use]
pub fn time_ago(created_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - created_at).num_seconds();
    if secs < 60 {
        return "just now".to_string();
    }
    let minutes = secs / 60;
    if minutes < 60 {
        return format!("{minutes}m ago");
    }
    let hours = minutes / 60;
    if hours < 24 {
        return format!("{hours}h ago");
    }
    let days = hours / 24;
    if days < 7 {
        return format!("{days}d ago");
    }
    let weeks = days / 7;
    if weeks < 5 {
        return format!("{weeks}w ago");
    }
    created_at.format("%Y-%m-%d").to_string()
}
