//! Counter reconciliation: compare stored aggregates against the entry rows.
//!
//! Counters are maintained incrementally by toggles. An audit recomputes them
//! from scratch and reports every mismatch, plus any `(user, post)` pair that
//! holds both an upvote and a downvote. A repair resolves both in one
//! transaction.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::StoreError;
use crate::model::{PostId, ReactionCounts, ReactionKind};
use crate::store::{ExclusivityConflict, LedgerTx};

/// One counter whose stored value disagrees with its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterDrift {
    pub post_id: PostId,
    pub kind: ReactionKind,
    pub stored: u64,
    pub actual: u64,
}

/// Result of an audit pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub posts_checked: usize,
    pub drifts: Vec<CounterDrift>,
    pub conflicts: Vec<ExclusivityConflict>,
}

impl AuditReport {
    /// Return `true` when every counter matches and no pair violates
    /// exclusion.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.drifts.is_empty() && self.conflicts.is_empty()
    }
}

fn drifts_between(
    stored: &BTreeMap<PostId, ReactionCounts>,
    tally: &BTreeMap<PostId, ReactionCounts>,
) -> Vec<CounterDrift> {
    let mut drifts = Vec::new();
    for (post_id, counts) in stored {
        let actual = tally.get(post_id).copied().unwrap_or_default();
        for kind in ReactionKind::ALL {
            if counts.get(kind) != actual.get(kind) {
                drifts.push(CounterDrift {
                    post_id: post_id.clone(),
                    kind,
                    stored: counts.get(kind),
                    actual: actual.get(kind),
                });
            }
        }
    }
    drifts
}

/// Audit the state visible to `tx` without modifying it.
///
/// # Errors
///
/// Returns [`StoreError`] if the store cannot be read.
pub fn collect(tx: &dyn LedgerTx) -> Result<AuditReport, StoreError> {
    let stored = tx.stored_counts()?;
    let tally = tx.tally_entries()?;
    let report = AuditReport {
        posts_checked: stored.len(),
        drifts: drifts_between(&stored, &tally),
        conflicts: tx.exclusivity_conflicts()?,
    };

    for drift in &report.drifts {
        tracing::warn!(
            post = %drift.post_id,
            kind = %drift.kind,
            stored = drift.stored,
            actual = drift.actual,
            "counter drift"
        );
    }
    for conflict in &report.conflicts {
        tracing::warn!(
            post = %conflict.post_id,
            "pair holds both upvote and downvote"
        );
    }
    Ok(report)
}

/// Audit, then fix everything found inside `tx`.
///
/// Conflicting pairs keep their more recent entry (ties keep the upvote).
/// Counters are then overwritten with values recomputed after conflict
/// resolution. The returned report describes the state before repair.
///
/// # Errors
///
/// Returns [`StoreError`] if any read or write fails; the caller's
/// transaction should then be dropped.
pub fn repair(tx: &mut dyn LedgerTx) -> Result<AuditReport, StoreError> {
    let report = collect(tx)?;
    if report.is_ok() {
        return Ok(report);
    }

    for conflict in &report.conflicts {
        let dropped = conflict.superseded();
        if !tx.delete_entry(&conflict.user_id, &conflict.post_id, dropped)? {
            return Err(StoreError::Invariant(format!(
                "conflicting {dropped} entry on {} disappeared",
                conflict.post_id
            )));
        }
    }

    let stored = tx.stored_counts()?;
    let tally = tx.tally_entries()?;
    let mut fixed = 0_usize;
    for (post_id, counts) in &stored {
        let actual = tally.get(post_id).copied().unwrap_or_default();
        if *counts != actual {
            tx.set_counts(post_id, actual)?;
            fixed += 1;
        }
    }

    tracing::info!(
        conflicts = report.conflicts.len(),
        posts_fixed = fixed,
        "repaired board counters"
    );
    Ok(report)
}
