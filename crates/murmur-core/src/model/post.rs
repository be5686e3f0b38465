use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::reaction::{ReactionCounts, ReactionSet};
use crate::error::LedgerError;

/// Upper bound on post length, in characters.
pub const MAX_CONTENT_CHARS: usize = 2000;

const POST_ID_PREFIX: &str = "mm-";

/// Opaque post identifier (`mm-` followed by 16 hex digits when generated).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    /// Generate a fresh random identifier.
    #[must_use]
    pub fn generate() -> Self {
        let n: u64 = rand::thread_rng().r#gen();
        Self(format!("{POST_ID_PREFIX}{n:016x}"))
    }

    /// Wrap an identifier read from storage or supplied by a caller.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PostId {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// A post row: immutable content plus its cached reaction counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub counts: ReactionCounts,
}

impl Post {
    /// Build a new post with zeroed counters after validating `content`.
    ///
    /// Surrounding whitespace is trimmed before storage and `created_at` is
    /// truncated to the microsecond precision the store keeps.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InvalidInput`] when the content is empty,
    /// whitespace-only, or longer than [`MAX_CONTENT_CHARS`].
    pub fn compose(content: &str, created_at: DateTime<Utc>) -> Result<Self, LedgerError> {
        let content = validate_content(content)?;
        Ok(Self {
            id: PostId::generate(),
            content: content.to_string(),
            created_at: DateTime::from_timestamp_micros(created_at.timestamp_micros())
                .unwrap_or(created_at),
            counts: ReactionCounts::default(),
        })
    }

    #[must_use]
    pub fn created_at_us(&self) -> i64 {
        self.created_at.timestamp_micros()
    }
}

/// A post together with the reactions the requesting user holds on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostWithState {
    #[serde(flatten)]
    pub post: Post,
    pub active: ReactionSet,
}

fn validate_content(content: &str) -> Result<&str, LedgerError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::InvalidInput(
            "post content must not be empty".to_string(),
        ));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_CONTENT_CHARS {
        return Err(LedgerError::InvalidInput(format!(
            "post content is {chars} characters; the limit is {MAX_CONTENT_CHARS}"
        )));
    }
    Ok(trimmed)
}
