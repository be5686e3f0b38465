//! `mm post`: publish an anonymous post.

use clap::Args;
use std::io::Write;
use std::path::Path;

use crate::cmd::{fail_ledger, open_board};
use crate::output::{OutputMode, render};

#[derive(Args, Debug)]
pub struct PostArgs {
    /// Post text; multiple words are joined with spaces.
    #[arg(required = true, num_args = 1..)]
    pub content: Vec<String>,
}

pub fn run_post(args: &PostArgs, output: OutputMode, project_root: &Path) -> anyhow::Result<()> {
    let mut board = open_board(project_root, output)?;
    let content = args.content.join(" ");
    let post = board
        .ledger
        .create_post(&content)
        .map_err(|err| fail_ledger(output, err))?;

    render(output, &post, |p, w| match output {
        OutputMode::Pretty => writeln!(w, "✓ Posted {}", p.id),
        OutputMode::Text | OutputMode::Json => writeln!(w, "{}", p.id),
    })
}
