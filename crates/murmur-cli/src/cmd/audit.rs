//! `mm audit`: check reaction counters against the entry rows.

use clap::Args;
use murmur_core::audit::AuditReport;
use murmur_core::error::ErrorCode;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use crate::cmd::{fail, fail_ledger, open_board};
use crate::output::{CliError, OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Fix what the audit finds: resolve up/down conflicts, recompute counters.
    #[arg(long)]
    pub repair: bool,
}

#[derive(Debug, Serialize)]
struct AuditOutput {
    ok: bool,
    repaired: bool,
    #[serde(flatten)]
    report: AuditReport,
}

pub fn run_audit(args: &AuditArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let mut board = open_board(project_root, output)?;
    let report = if args.repair {
        board.ledger.repair()
    } else {
        board.ledger.audit()
    }
    .map_err(|err| fail_ledger(output, err))?;

    let clean = report.is_ok();
    let payload = AuditOutput {
        ok: clean || args.repair,
        repaired: args.repair && !clean,
        report,
    };

    render(output, &payload, |p, w| {
        pretty_kv(w, "posts", p.report.posts_checked.to_string())?;
        pretty_kv(w, "drift", p.report.drifts.len().to_string())?;
        pretty_kv(w, "conflicts", p.report.conflicts.len().to_string())?;
        for drift in &p.report.drifts {
            writeln!(
                w,
                "  {} {}: stored {} actual {}",
                drift.post_id, drift.kind, drift.stored, drift.actual
            )?;
        }
        for conflict in &p.report.conflicts {
            writeln!(
                w,
                "  {} holds both upvote and downvote (older: {})",
                conflict.post_id,
                conflict.superseded()
            )?;
        }
        if p.repaired {
            writeln!(w, "✓ Repaired")?;
        } else if p.ok {
            writeln!(w, "✓ Counters consistent")?;
        }
        Ok(())
    })?;

    if payload.ok {
        Ok(())
    } else {
        Err(fail(
            output,
            &CliError::from_code(
                ErrorCode::CounterDrift,
                format!(
                    "{} drifted counter(s), {} conflicting pair(s)",
                    payload.report.drifts.len(),
                    payload.report.conflicts.len()
                ),
            ),
        ))
    }
}
