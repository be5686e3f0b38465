//! Persistence adapter interface for the reaction ledger.
//!
//! The ledger runs every mutation against a [`LedgerTx`]: a unit of work that
//! either commits all of its writes or none of them. Dropping a transaction
//! without calling [`LedgerTx::commit`] rolls it back.
//!
//! Implementations:
//! - [`crate::db::SqliteStore`]: durable, cross-process safe (`BEGIN IMMEDIATE`
//!   for writes, deferred snapshots for reads)
//! - [`memory::MemoryStore`]: in-process, for embedding and as a test oracle

pub mod memory;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::feed::PageRequest;
use crate::identity::UserId;
use crate::model::{Post, PostId, PostWithState, ReactionCounts, ReactionKind, ReactionSet};

/// A `(user, post)` pair holding both an upvote and a downvote entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusivityConflict {
    pub user_id: UserId,
    pub post_id: PostId,
    pub upvoted_at_us: i64,
    pub downvoted_at_us: i64,
}

impl ExclusivityConflict {
    /// The entry to drop when resolving: the older of the two, keeping the
    /// upvote on a tie.
    #[must_use]
    pub const fn superseded(&self) -> ReactionKind {
        if self.downvoted_at_us > self.upvoted_at_us {
            ReactionKind::Upvote
        } else {
            ReactionKind::Downvote
        }
    }
}

/// One atomic unit of work against the store.
pub trait LedgerTx {
    fn insert_post(&mut self, post: &Post) -> Result<(), StoreError>;

    /// Stored counters for a post, or `None` if the post does not exist.
    fn post_counts(&self, post_id: &PostId) -> Result<Option<ReactionCounts>, StoreError>;

    /// Kinds `user_id` currently holds on `post_id`.
    fn active_kinds(&self, user_id: &UserId, post_id: &PostId) -> Result<ReactionSet, StoreError>;

    /// Insert an entry; returns `false` if the key already existed.
    fn insert_entry(
        &mut self,
        user_id: &UserId,
        post_id: &PostId,
        kind: ReactionKind,
        created_at_us: i64,
    ) -> Result<bool, StoreError>;

    /// Delete an entry; returns `false` if it did not exist.
    fn delete_entry(
        &mut self,
        user_id: &UserId,
        post_id: &PostId,
        kind: ReactionKind,
    ) -> Result<bool, StoreError>;

    /// Add `delta` to one counter of an existing post.
    fn adjust_counter(
        &mut self,
        post_id: &PostId,
        kind: ReactionKind,
        delta: i64,
    ) -> Result<(), StoreError>;

    /// Overwrite all three counters of an existing post.
    fn set_counts(&mut self, post_id: &PostId, counts: ReactionCounts) -> Result<(), StoreError>;

    /// Delete a post and every entry referencing it.
    ///
    /// Returns the number of entries removed, or `None` if the post did not
    /// exist.
    fn delete_post(&mut self, post_id: &PostId) -> Result<Option<u64>, StoreError>;

    /// Stored counters for every post.
    fn stored_counts(&self) -> Result<BTreeMap<PostId, ReactionCounts>, StoreError>;

    /// Counters recomputed from the entry rows; posts without entries are
    /// absent.
    fn tally_entries(&self) -> Result<BTreeMap<PostId, ReactionCounts>, StoreError>;

    /// Every `(user, post)` pair violating upvote/downvote exclusion.
    fn exclusivity_conflicts(&self) -> Result<Vec<ExclusivityConflict>, StoreError>;

    fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// A store the ledger can open transactions on and read the feed from.
pub trait LedgerStore {
    /// Begin a write transaction. Mutations of other transactions on the same
    /// store serialize behind it.
    fn begin(&mut self) -> Result<Box<dyn LedgerTx + '_>, StoreError>;

    /// Begin a transaction that only reads. It sees a consistent snapshot but
    /// does not hold the write lock, so writers are not blocked behind it.
    ///
    /// Stores without a separate read path fall back to [`Self::begin`].
    fn begin_read(&mut self) -> Result<Box<dyn LedgerTx + '_>, StoreError> {
        self.begin()
    }

    /// Posts in recency order (`created_at` descending, ID ascending) with the
    /// kinds `user_id` holds on each.
    fn list_posts(
        &self,
        user_id: &UserId,
        page: &PageRequest,
    ) -> Result<Vec<PostWithState>, StoreError>;
}
