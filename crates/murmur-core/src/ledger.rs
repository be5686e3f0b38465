//! The reaction ledger: posts, per-user reaction entries, and the counters
//! derived from them.
//!
//! Every mutating call runs in exactly one store transaction. Within it the
//! ledger reads the user's active kinds, decides a [`TogglePlan`], and writes
//! the entry rows and counter deltas together, so the counters always equal
//! the number of entries of each kind and a user never holds both an upvote
//! and a downvote on the same post.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::audit::{self, AuditReport};
use crate::error::{LedgerError, StoreError};
use crate::feed::{FeedCursor, Page, PageRequest};
use crate::identity::UserId;
use crate::model::{
    Post, PostId, PostWithState, ReactionCounts, ReactionKind, ReactionSet, ToggleAction,
    TogglePlan,
};
use crate::store::{LedgerStore, LedgerTx};

/// Result of a single toggle: what happened and the resulting state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    pub post_id: PostId,
    pub kind: ReactionKind,
    pub action: ToggleAction,
    /// Opposing kind removed by this toggle, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub displaced: Option<ReactionKind>,
    pub counts: ReactionCounts,
    pub active: ReactionSet,
}

/// Ledger over an injected store.
///
/// The store is owned for the ledger's lifetime and released on drop or via
/// [`Ledger::into_store`].
#[derive(Debug)]
pub struct Ledger<S> {
    store: S,
}

impl<S: LedgerStore> Ledger<S> {
    #[must_use]
    pub const fn new(store: S) -> Self {
        Self { store }
    }

    #[must_use]
    pub fn into_store(self) -> S {
        self.store
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Create a post stamped with the current time.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] for empty or oversized content,
    /// [`LedgerError::StoreUnavailable`] if the write fails.
    pub fn create_post(&mut self, content: &str) -> Result<Post, LedgerError> {
        self.create_post_at(content, Utc::now())
    }

    /// Create a post with an explicit creation time.
    ///
    /// # Errors
    ///
    /// Same as [`Ledger::create_post`].
    pub fn create_post_at(
        &mut self,
        content: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Post, LedgerError> {
        let post = Post::compose(content, created_at)?;
        let mut tx = self.store.begin()?;
        tx.insert_post(&post)?;
        tx.commit()?;
        tracing::info!(post = %post.id, chars = post.content.chars().count(), "created post");
        Ok(post)
    }

    /// Toggle `kind` for `user_id` on `post_id`.
    ///
    /// Turning on an upvote or downvote removes the opposing kind in the same
    /// transaction.
    ///
    /// # Errors
    ///
    /// [`LedgerError::NotFound`] if the post does not exist (or was deleted
    /// concurrently), [`LedgerError::StoreUnavailable`] on store failure.
    pub fn toggle(
        &mut self,
        user_id: &UserId,
        post_id: &PostId,
        kind: ReactionKind,
    ) -> Result<ToggleOutcome, LedgerError> {
        let mut tx = self.store.begin()?;
        if tx.post_counts(post_id)?.is_none() {
            return Err(LedgerError::NotFound(post_id.clone()));
        }

        let active = tx.active_kinds(user_id, post_id)?;
        let plan = TogglePlan::decide(active, kind);
        tracing::debug!(
            post = %post_id,
            kind = %kind,
            action = ?plan.action,
            displaced = ?plan.displaced,
            "toggle plan"
        );

        apply_plan(tx.as_mut(), user_id, post_id, &plan)?;

        let counts = tx
            .post_counts(post_id)?
            .ok_or_else(|| LedgerError::NotFound(post_id.clone()))?;
        let active = tx.active_kinds(user_id, post_id)?;
        tx.commit()?;

        Ok(ToggleOutcome {
            post_id: post_id.clone(),
            kind,
            action: plan.action,
            displaced: plan.displaced,
            counts,
            active,
        })
    }

    /// Every post, newest first, with the kinds `user_id` holds on each.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] if the read fails.
    pub fn list_with_user_state(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PostWithState>, LedgerError> {
        Ok(self.store.list_posts(user_id, &PageRequest::all())?)
    }

    /// One page of the recency-ordered feed.
    ///
    /// `next` is set when the page is full; following it yields the rows
    /// strictly after the last one returned.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] if the read fails.
    pub fn list_page(&self, user_id: &UserId, request: &PageRequest) -> Result<Page, LedgerError> {
        let posts = self.store.list_posts(user_id, request)?;
        let next = match (request.limit, posts.last()) {
            (Some(limit), Some(last)) if posts.len() >= limit => Some(FeedCursor::after(last)),
            _ => None,
        };
        Ok(Page { posts, next })
    }

    /// Delete a post and every entry referencing it.
    ///
    /// Returns the number of reaction entries removed alongside the post.
    ///
    /// # Errors
    ///
    /// [`LedgerError::Unauthorized`] unless `caller_is_admin`, checked before
    /// any store access; [`LedgerError::NotFound`] if the post is absent.
    pub fn delete_post(
        &mut self,
        post_id: &PostId,
        caller_is_admin: bool,
    ) -> Result<u64, LedgerError> {
        if !caller_is_admin {
            tracing::warn!(post = %post_id, "rejected non-admin delete");
            return Err(LedgerError::Unauthorized);
        }

        let mut tx = self.store.begin()?;
        let removed = tx
            .delete_post(post_id)?
            .ok_or_else(|| LedgerError::NotFound(post_id.clone()))?;
        tx.commit()?;
        tracing::info!(post = %post_id, entries = removed, "deleted post");
        Ok(removed)
    }

    /// Compare stored counters with the entry rows without changing anything.
    ///
    /// Runs on a read snapshot, so concurrent reactions are not held up.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] if the read fails.
    pub fn audit(&mut self) -> Result<AuditReport, LedgerError> {
        let tx = self.store.begin_read()?;
        let report = audit::collect(tx.as_ref())?;
        drop(tx);
        Ok(report)
    }

    /// Resolve exclusivity conflicts and overwrite drifted counters.
    ///
    /// Returns the report of what was found before the repair.
    ///
    /// # Errors
    ///
    /// [`LedgerError::StoreUnavailable`] if the repair transaction fails; no
    /// partial repair is committed.
    pub fn repair(&mut self) -> Result<AuditReport, LedgerError> {
        let mut tx = self.store.begin()?;
        let report = audit::repair(tx.as_mut())?;
        tx.commit()?;
        Ok(report)
    }
}

fn apply_plan(
    tx: &mut dyn LedgerTx,
    user_id: &UserId,
    post_id: &PostId,
    plan: &TogglePlan,
) -> Result<(), StoreError> {
    let now_us = Utc::now().timestamp_micros();

    if let Some(displaced) = plan.displaced {
        expect_changed(tx.delete_entry(user_id, post_id, displaced)?, "remove", displaced)?;
        tx.adjust_counter(post_id, displaced, -1)?;
    }

    match plan.action {
        ToggleAction::On => {
            expect_changed(tx.insert_entry(user_id, post_id, plan.kind, now_us)?, "add", plan.kind)?;
            tx.adjust_counter(post_id, plan.kind, 1)?;
        }
        ToggleAction::Off => {
            expect_changed(tx.delete_entry(user_id, post_id, plan.kind)?, "remove", plan.kind)?;
            tx.adjust_counter(post_id, plan.kind, -1)?;
        }
    }
    Ok(())
}

fn expect_changed(changed: bool, verb: &str, kind: ReactionKind) -> Result<(), StoreError> {
    if changed {
        Ok(())
    } else {
        Err(StoreError::Invariant(format!(
            "{verb} {kind} entry did not change the ledger"
        )))
    }
}
