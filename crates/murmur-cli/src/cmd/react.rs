//! `mm react`: toggle a reaction on a post.
//!
//! The command predicts the result locally, sends the toggle to the ledger,
//! and shows the server's answer. A diverging prediction (another user
//! reacted in between) is logged and the server state is shown.

use clap::Args;
use murmur_core::error::LedgerError;
use murmur_core::ledger::ToggleOutcome;
use murmur_core::model::{PostId, ReactionKind, ToggleAction};
use murmur_core::optimistic::{ReactionView, Snapshot};
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::cmd::list::reaction_line;
use crate::cmd::{fail_ledger, open_board, resolve_user};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct ReactArgs {
    /// Post ID (as shown by `mm list`).
    pub post: String,

    /// Reaction kind: upvote, downvote, or laugh (also up/down).
    pub kind: String,
}

#[derive(Debug, Serialize)]
struct ReactOutput {
    #[serde(flatten)]
    outcome: ToggleOutcome,
    prediction_matched: bool,
}

pub fn run_react(
    args: &ReactArgs,
    as_flag: Option<&str>,
    output: OutputMode,
    project_root: &Path,
) -> anyhow::Result<()> {
    let kind: ReactionKind = args.kind.parse().map_err(|err| fail_ledger(output, err))?;
    let post_id = PostId::new(args.post.trim());
    let user = resolve_user(as_flag, output)?;
    let mut board = open_board(project_root, output)?;

    let current = board
        .ledger
        .list_with_user_state(&user)
        .map_err(|err| fail_ledger(output, err))?
        .into_iter()
        .find(|row| row.post.id == post_id)
        .ok_or_else(|| fail_ledger(output, LedgerError::NotFound(post_id.clone())))?;

    let mut view = ReactionView::new(Snapshot::from(&current));
    let plan = view.toggle_local(kind);
    tracing::debug!(predicted = ?view.displayed(), action = ?plan.action, "optimistic toggle");

    let outcome = match board.ledger.toggle(&user, &post_id, kind) {
        Ok(outcome) => outcome,
        Err(err) => {
            view.reject();
            return Err(fail_ledger(output, err));
        }
    };
    let prediction_matched = view.confirm(Snapshot::from(&outcome));

    let payload = ReactOutput {
        outcome,
        prediction_matched,
    };
    render(output, &payload, |p, w| {
        let o = &p.outcome;
        let verb = match o.action {
            ToggleAction::On => "added",
            ToggleAction::Off => "removed",
        };
        match o.displaced {
            Some(displaced) => writeln!(
                w,
                "✓ {} {verb} on {} (replaced {displaced})",
                o.kind, o.post_id
            )?,
            None => writeln!(w, "✓ {} {verb} on {}", o.kind, o.post_id)?,
        }
        writeln!(w, "  {}", reaction_line(&o.counts, o.active))
    })
}
