//! In-process [`LedgerStore`] backed by ordered maps.
//!
//! Transactions stage a copy of the state and swap it in on commit, so a
//! dropped transaction leaves the store untouched.

use std::collections::BTreeMap;

use super::{ExclusivityConflict, LedgerStore, LedgerTx};
use crate::error::StoreError;
use crate::feed::{FeedCursor, PageRequest, SortOrder, sort_posts};
use crate::identity::UserId;
use crate::model::{Post, PostId, PostWithState, ReactionCounts, ReactionKind, ReactionSet};

type EntryKey = (UserId, PostId, ReactionKind);

#[derive(Debug, Clone, Default)]
struct MemoryState {
    posts: BTreeMap<PostId, Post>,
    /// Entry key -> creation time (micros).
    entries: BTreeMap<EntryKey, i64>,
}

impl MemoryState {
    fn active_kinds(&self, user_id: &UserId, post_id: &PostId) -> ReactionSet {
        ReactionKind::ALL
            .into_iter()
            .filter(|kind| {
                self.entries
                    .contains_key(&(user_id.clone(), post_id.clone(), *kind))
            })
            .collect()
    }

    fn post_mut(&mut self, post_id: &PostId) -> Result<&mut Post, StoreError> {
        self.posts
            .get_mut(post_id)
            .ok_or_else(|| StoreError::Invariant(format!("post {post_id} vanished mid-transaction")))
    }
}

/// Ledger store held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: MemoryState,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an entry without touching counters, as data written by an
    /// older client would appear.
    pub fn import_entry(
        &mut self,
        user_id: &UserId,
        post_id: &PostId,
        kind: ReactionKind,
        created_at_us: i64,
    ) {
        self.state
            .entries
            .insert((user_id.clone(), post_id.clone(), kind), created_at_us);
    }

    /// Overwrite a post's counters directly, bypassing the ledger.
    pub fn force_counts(&mut self, post_id: &PostId, counts: ReactionCounts) {
        if let Some(post) = self.state.posts.get_mut(post_id) {
            post.counts = counts;
        }
    }
}

impl LedgerStore for MemoryStore {
    fn begin(&mut self) -> Result<Box<dyn LedgerTx + '_>, StoreError> {
        let staged = self.state.clone();
        Ok(Box::new(MemoryTx {
            target: &mut self.state,
            staged,
        }))
    }

    fn list_posts(
        &self,
        user_id: &UserId,
        page: &PageRequest,
    ) -> Result<Vec<PostWithState>, StoreError> {
        let mut posts: Vec<PostWithState> = self
            .state
            .posts
            .values()
            .filter(|post| {
                page.after
                    .as_ref()
                    .is_none_or(|cursor: &FeedCursor| cursor.admits(post.created_at_us(), &post.id))
            })
            .map(|post| PostWithState {
                active: self.state.active_kinds(user_id, &post.id),
                post: post.clone(),
            })
            .collect();
        sort_posts(&mut posts, SortOrder::Recent);
        if let Some(limit) = page.limit {
            posts.truncate(limit);
        }
        Ok(posts)
    }
}

struct MemoryTx<'a> {
    target: &'a mut MemoryState,
    staged: MemoryState,
}

impl LedgerTx for MemoryTx<'_> {
    fn insert_post(&mut self, post: &Post) -> Result<(), StoreError> {
        if self.staged.posts.contains_key(&post.id) {
            return Err(StoreError::Invariant(format!("duplicate post id {}", post.id)));
        }
        self.staged.posts.insert(post.id.clone(), post.clone());
        Ok(())
    }

    fn post_counts(&self, post_id: &PostId) -> Result<Option<ReactionCounts>, StoreError> {
        Ok(self.staged.posts.get(post_id).map(|post| post.counts))
    }

    fn active_kinds(&self, user_id: &UserId, post_id: &PostId) -> Result<ReactionSet, StoreError> {
        Ok(self.staged.active_kinds(user_id, post_id))
    }

    fn insert_entry(
        &mut self,
        user_id: &UserId,
        post_id: &PostId,
        kind: ReactionKind,
        created_at_us: i64,
    ) -> Result<bool, StoreError> {
        if !self.staged.posts.contains_key(post_id) {
            return Err(StoreError::Invariant(format!(
                "entry references missing post {post_id}"
            )));
        }
        let key = (user_id.clone(), post_id.clone(), kind);
        if self.staged.entries.contains_key(&key) {
            return Ok(false);
        }
        self.staged.entries.insert(key, created_at_us);
        Ok(true)
    }

    fn delete_entry(
        &mut self,
        user_id: &UserId,
        post_id: &PostId,
        kind: ReactionKind,
    ) -> Result<bool, StoreError> {
        Ok(self
            .staged
            .entries
            .remove(&(user_id.clone(), post_id.clone(), kind))
            .is_some())
    }

    fn adjust_counter(
        &mut self,
        post_id: &PostId,
        kind: ReactionKind,
        delta: i64,
    ) -> Result<(), StoreError> {
        let post = self.staged.post_mut(post_id)?;
        let current = post.counts.get(kind);
        let next = current.checked_add_signed(delta).ok_or_else(|| {
            StoreError::Invariant(format!("{kind} counter of {post_id} would go negative"))
        })?;
        post.counts.set(kind, next);
        Ok(())
    }

    fn set_counts(&mut self, post_id: &PostId, counts: ReactionCounts) -> Result<(), StoreError> {
        self.staged.post_mut(post_id)?.counts = counts;
        Ok(())
    }

    fn delete_post(&mut self, post_id: &PostId) -> Result<Option<u64>, StoreError> {
        if self.staged.posts.remove(post_id).is_none() {
            return Ok(None);
        }
        let before = self.staged.entries.len();
        self.staged.entries.retain(|(_, entry_post, _), _| entry_post != post_id);
        let removed = before - self.staged.entries.len();
        Ok(Some(u64::try_from(removed).unwrap_or(u64::MAX)))
    }

    fn stored_counts(&self) -> Result<BTreeMap<PostId, ReactionCounts>, StoreError> {
        Ok(self
            .staged
            .posts
            .iter()
            .map(|(id, post)| (id.clone(), post.counts))
            .collect())
    }

    fn tally_entries(&self) -> Result<BTreeMap<PostId, ReactionCounts>, StoreError> {
        let mut tally: BTreeMap<PostId, ReactionCounts> = BTreeMap::new();
        for (_, post_id, kind) in self.staged.entries.keys() {
            tally.entry(post_id.clone()).or_default().increment(*kind);
        }
        Ok(tally)
    }

    fn exclusivity_conflicts(&self) -> Result<Vec<ExclusivityConflict>, StoreError> {
        let mut conflicts = Vec::new();
        for ((user_id, post_id, kind), upvoted_at_us) in &self.staged.entries {
            if *kind != ReactionKind::Upvote {
                continue;
            }
            let opposing = (user_id.clone(), post_id.clone(), ReactionKind::Downvote);
            if let Some(downvoted_at_us) = self.staged.entries.get(&opposing) {
                conflicts.push(ExclusivityConflict {
                    user_id: user_id.clone(),
                    post_id: post_id.clone(),
                    upvoted_at_us: *upvoted_at_us,
                    downvoted_at_us: *downvoted_at_us,
                });
            }
        }
        conflicts.sort_by(|a, b| (&a.post_id, &a.user_id).cmp(&(&b.post_id, &b.user_id)));
        Ok(conflicts)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        *this.target = this.staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn user(raw: &str) -> UserId {
        UserId::parse(raw).expect("valid id")
    }

    fn seeded() -> (MemoryStore, PostId) {
        let mut store = MemoryStore::new();
        let post = Post::compose("hello", Utc::now()).expect("valid post");
        let id = post.id.clone();
        let mut tx = store.begin().expect("begin");
        tx.insert_post(&post).expect("insert");
        tx.commit().expect("commit");
        (store, id)
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let (mut store, id) = seeded();
        {
            let mut tx = store.begin().expect("begin");
            assert!(tx.insert_entry(&user("u1"), &id, ReactionKind::Laugh, 1).expect("insert"));
            tx.adjust_counter(&id, ReactionKind::Laugh, 1).expect("adjust");
        }
        let listed = store.list_posts(&user("u1"), &PageRequest::all()).expect("list");
        assert_eq!(listed[0].post.counts, ReactionCounts::default());
        assert!(listed[0].active.is_empty());
    }

    #[test]
    fn counter_cannot_go_negative() {
        let (mut store, id) = seeded();
        let mut tx = store.begin().expect("begin");
        assert!(matches!(
            tx.adjust_counter(&id, ReactionKind::Upvote, -1),
            Err(StoreError::Invariant(_))
        ));
    }

    #[test]
    fn duplicate_entry_is_rejected_by_key() {
        let (mut store, id) = seeded();
        let mut tx = store.begin().expect("begin");
        assert!(tx.insert_entry(&user("u1"), &id, ReactionKind::Upvote, 1).expect("first"));
        assert!(!tx.insert_entry(&user("u1"), &id, ReactionKind::Upvote, 2).expect("second"));
    }

    #[test]
    fn conflicts_and_tallies_see_imported_entries() {
        let (mut store, id) = seeded();
        store.import_entry(&user("u1"), &id, ReactionKind::Upvote, 5);
        store.import_entry(&user("u1"), &id, ReactionKind::Downvote, 9);
        store.import_entry(&user("u2"), &id, ReactionKind::Downvote, 3);

        let tx = store.begin().expect("begin");
        let conflicts = tx.exclusivity_conflicts().expect("conflicts");
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].user_id, user("u1"));
        assert_eq!(conflicts[0].superseded(), ReactionKind::Upvote);

        let tally = tx.tally_entries().expect("tally");
        assert_eq!(tally[&id].upvotes, 1);
        assert_eq!(tally[&id].downvotes, 2);
    }
}
