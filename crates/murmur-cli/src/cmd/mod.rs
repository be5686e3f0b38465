//! Command handlers for `mm`.

pub mod audit;
pub mod completions;
pub mod delete;
pub mod init;
pub mod list;
pub mod post;
pub mod react;
pub mod whoami;

use std::path::Path;

use murmur_core::config::{self, BoardConfig};
use murmur_core::db::SqliteStore;
use murmur_core::error::{ErrorCode, LedgerError};
use murmur_core::identity::{self, ProcessEnv, UserId};
use murmur_core::ledger::Ledger;

use crate::output::{CliError, OutputMode, render_error};

/// An opened board: its config and the ledger over its database.
pub struct Board {
    pub config: BoardConfig,
    pub ledger: Ledger<SqliteStore>,
}

/// Render `error` in the active output mode and turn it into the command's
/// failure value.
pub fn fail(output: OutputMode, error: &CliError) -> anyhow::Error {
    render_error(output, error).ok();
    anyhow::anyhow!("{}", error.message)
}

/// Render a ledger failure and return it as the command's error.
pub fn fail_ledger(output: OutputMode, err: LedgerError) -> anyhow::Error {
    render_error(output, &CliError::from(&err)).ok();
    anyhow::Error::new(err)
}

/// Locate the board above `project_root`, load its config, and open the
/// database.
pub fn open_board(project_root: &Path, output: OutputMode) -> anyhow::Result<Board> {
    let dir = config::find_board_dir(project_root).ok_or_else(|| {
        fail(
            output,
            &CliError::from_code(
                ErrorCode::NotInitialized,
                format!(
                    "not a murmur board: no {} directory found",
                    config::BOARD_DIR_NAME
                ),
            ),
        )
    })?;

    let config =
        config::load_board_config(&dir).map_err(|err| fail(output, &CliError::from(&err)))?;

    let db_path = config.db_path(&dir);
    let store = SqliteStore::open(&db_path, &config.store_options())
        .map_err(|err| fail_ledger(output, LedgerError::from(err)))?;
    tracing::debug!(board = %dir.display(), "opened board");

    Ok(Board {
        config,
        ledger: Ledger::new(store),
    })
}

/// Resolve the caller's anonymous identity (`--as` > env > identity file).
pub fn resolve_user(as_flag: Option<&str>, output: OutputMode) -> anyhow::Result<UserId> {
    identity::resolve_identity(as_flag, &ProcessEnv)
        .map_err(|err| fail(output, &CliError::from(&err)))
}

/// Collapse whitespace so multi-line content fits one output row.
pub fn single_line(content: &str) -> String {
    content.split_whitespace().collect::<Vec<_>>().join(" ")
}
