//! `mm init`: create a board in the current directory.

use anyhow::{Context as _, Result};
use clap::Args;
use murmur_core::config::{self, BOARD_DIR_NAME, BoardConfig};
use murmur_core::db::{SqliteStore, migrations};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::output::{OutputMode, pretty_kv, render};

#[derive(Args, Debug)]
pub struct InitArgs {
    /// Rewrite the default config even if `.murmur/` already exists.
    #[arg(long)]
    pub force: bool,
}

const GITIGNORE: &str = "*.sqlite3\n*.sqlite3-wal\n*.sqlite3-shm\n";

#[derive(Debug, Serialize)]
struct InitOutput {
    board_dir: PathBuf,
    database: PathBuf,
    schema_version: u32,
    reinitialized: bool,
}

/// Execute `mm init`. Creates the board skeleton:
///
/// ```text
/// .murmur/
///   config.toml     (defaults, see `BoardConfig`)
///   .gitignore      (database files)
///   board.sqlite3   (migrated to the latest schema)
/// ```
///
/// # Errors
///
/// Returns an error if `.murmur/` already exists and `--force` is not set, or
/// if any filesystem or database operation fails.
pub fn run_init(args: &InitArgs, output: OutputMode, project_root: &Path) -> Result<()> {
    let board_dir = project_root.join(BOARD_DIR_NAME);
    let existed = board_dir.exists();
    if existed && !args.force {
        anyhow::bail!("{BOARD_DIR_NAME}/ already exists. Use `mm init --force` to reinitialize.");
    }

    let board_config = if existed {
        config::load_board_config(&board_dir)?
    } else {
        BoardConfig::default()
    };
    config::write_board_config(&board_dir, &board_config)?;

    let gitignore = board_dir.join(".gitignore");
    std::fs::write(&gitignore, GITIGNORE)
        .with_context(|| format!("Failed to write {}", gitignore.display()))?;

    let database = board_config.db_path(&board_dir);
    let store = SqliteStore::open(&database, &board_config.store_options())
        .with_context(|| format!("Failed to create board database {}", database.display()))?;
    let schema_version = migrations::current_schema_version(store.connection())?;
    store.close()?;

    tracing::info!(board = %board_dir.display(), "initialized board");

    let payload = InitOutput {
        board_dir,
        database,
        schema_version,
        reinitialized: existed,
    };
    render(output, &payload, |p, w| {
        let verb = if p.reinitialized {
            "Reinitialized"
        } else {
            "Initialized"
        };
        writeln!(w, "✓ {verb} murmur board in {}", p.board_dir.display())?;
        pretty_kv(w, "database", p.database.display().to_string())?;
        pretty_kv(w, "schema", format!("v{}", p.schema_version))
    })
}
