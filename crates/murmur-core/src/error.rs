use std::{fmt, path::PathBuf};

use crate::model::PostId;

/// Machine-readable error codes for scripted callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    IdentityUnavailable,
    InvalidInput,
    InvalidKind,
    PostNotFound,
    Unauthorized,
    CounterDrift,
    StoreUnavailable,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::IdentityUnavailable => "E1003",
            Self::InvalidInput => "E2001",
            Self::InvalidKind => "E2002",
            Self::PostNotFound => "E2003",
            Self::Unauthorized => "E2004",
            Self::CounterDrift => "E3001",
            Self::StoreUnavailable => "E5001",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Board not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::IdentityUnavailable => "Anonymous identity unavailable",
            Self::InvalidInput => "Invalid post content",
            Self::InvalidKind => "Unknown reaction kind",
            Self::PostNotFound => "Post not found",
            Self::Unauthorized => "Admin secret required",
            Self::CounterDrift => "Reaction counters out of sync",
            Self::StoreUnavailable => "Board database unavailable",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint surfaced next to the error.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `mm init` to create a board in this directory."),
            Self::ConfigParseError => Some("Fix syntax in .murmur/config.toml and retry."),
            Self::IdentityUnavailable => {
                Some("Set MURMUR_IDENTITY or make the identity file location writable.")
            }
            Self::InvalidInput => Some("Post non-empty text of at most 2000 characters."),
            Self::InvalidKind => Some("Use one of: upvote, downvote, laugh."),
            Self::PostNotFound => Some("Run `mm list` to see current post IDs."),
            Self::Unauthorized => Some("Pass the board's admin secret with --secret."),
            Self::CounterDrift => Some("Run `mm audit --repair` to recompute counters."),
            Self::StoreUnavailable => {
                Some("Retry after other writers finish; check disk space and permissions.")
            }
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Failures of the persistence collaborator.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Opening or creating the database file failed.
    #[error("open board database {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Any SQLite failure, including busy-timeout expiry.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error around the database file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The database schema is newer than this build or missing required parts.
    #[error("board schema: {0}")]
    Schema(String),

    /// A stored row could not be decoded.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// A write did not affect the rows the transaction had just observed.
    #[error("ledger invariant violated: {0}")]
    Invariant(String),
}

/// Structured failures reported by the reaction ledger.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid reaction kind '{0}'")]
    InvalidKind(String),

    #[error("post '{0}' not found")]
    NotFound(PostId),

    #[error("admin authorization required")]
    Unauthorized,

    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

impl LedgerError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::InvalidKind(_) => ErrorCode::InvalidKind,
            Self::NotFound(_) => ErrorCode::PostNotFound,
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::StoreUnavailable(_) => ErrorCode::StoreUnavailable,
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}
