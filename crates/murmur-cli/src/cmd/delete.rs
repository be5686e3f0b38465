//! `mm delete`: remove a post and its reactions (admin only).

use clap::Args;
use murmur_core::admin::{self, AdminSecret};
use murmur_core::model::PostId;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::cmd::{fail_ledger, open_board};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Post ID to delete.
    pub post: String,

    /// Admin secret; must match the value of the configured secret env var.
    #[arg(long)]
    pub secret: Option<String>,
}

#[derive(Debug, Serialize)]
struct DeleteOutput {
    post_id: PostId,
    reactions_removed: u64,
}

pub fn run_delete(args: &DeleteArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let mut board = open_board(project_root, output)?;
    let held = AdminSecret::from_env(&board.config.admin.secret_env);
    if held.is_none() {
        tracing::warn!(
            var = %board.config.admin.secret_env,
            "no admin secret configured; deletes are disabled"
        );
    }
    let is_admin = admin::caller_is_admin(held.as_ref(), args.secret.as_deref());

    let post_id = PostId::new(args.post.trim());
    let reactions_removed = board
        .ledger
        .delete_post(&post_id, is_admin)
        .map_err(|err| fail_ledger(output, err))?;

    let payload = DeleteOutput {
        post_id,
        reactions_removed,
    };
    render(output, &payload, |p, w| {
        writeln!(
            w,
            "✓ Deleted {} ({} reaction(s) removed)",
            p.post_id, p.reactions_removed
        )
    })
}
