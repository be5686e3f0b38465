use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::db::StoreOptions;
use crate::error::ErrorCode;
use crate::feed::SortOrder;

/// Name of the per-board directory holding config and database.
pub const BOARD_DIR_NAME: &str = ".murmur";
const CONFIG_FILE_NAME: &str = "config.toml";

/// Failure loading or writing board configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

impl ConfigError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Parse { .. } => ErrorCode::ConfigParseError,
            Self::Read { .. } | Self::Write { .. } | Self::Serialize(_) => {
                ErrorCode::InternalUnexpected
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BoardConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub admin: AdminConfig,
    #[serde(default)]
    pub feed: FeedConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file, relative to the board directory unless absolute.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Environment variable holding the admin secret.
    #[serde(default = "default_secret_env")]
    pub secret_env: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            secret_env: default_secret_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedConfig {
    #[serde(default)]
    pub default_sort: SortOrder,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            default_sort: SortOrder::default(),
            page_size: default_page_size(),
        }
    }
}

impl BoardConfig {
    /// Resolved database path for a board rooted at `board_dir`.
    #[must_use]
    pub fn db_path(&self, board_dir: &Path) -> PathBuf {
        board_dir.join(&self.store.path)
    }

    #[must_use]
    pub const fn store_options(&self) -> StoreOptions {
        StoreOptions {
            busy_timeout: Duration::from_millis(self.store.busy_timeout_ms),
        }
    }
}

/// Load `<board_dir>/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
pub fn load_board_config(board_dir: &Path) -> Result<BoardConfig, ConfigError> {
    let path = board_dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        return Ok(BoardConfig::default());
    }

    let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;

    toml::from_str::<BoardConfig>(&content).map_err(|source| ConfigError::Parse { path, source })
}

/// Write `config` to `<board_dir>/config.toml`, creating the directory.
///
/// # Errors
///
/// Returns [`ConfigError`] if serialization or the write fails.
pub fn write_board_config(board_dir: &Path, config: &BoardConfig) -> Result<PathBuf, ConfigError> {
    let path = board_dir.join(CONFIG_FILE_NAME);
    let rendered = toml::to_string_pretty(config)?;
    std::fs::create_dir_all(board_dir)
        .and_then(|()| std::fs::write(&path, rendered))
        .map_err(|source| ConfigError::Write {
            path: path.clone(),
            source,
        })?;
    Ok(path)
}

/// Walk up from `start` to the nearest directory containing `.murmur/`.
///
/// Returns the `.murmur` directory itself.
#[must_use]
pub fn find_board_dir(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(BOARD_DIR_NAME))
        .find(|candidate| candidate.is_dir())
}

fn default_store_path() -> PathBuf {
    PathBuf::from("board.sqlite3")
}

const fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_secret_env() -> String {
    "MURMUR_ADMIN_SECRET".to_string()
}

const fn default_page_size() -> usize {
    50
}
