//! Anonymous client identity.
//!
//! An identity is an opaque token created once per client and persisted on the
//! client side. The ledger only ever receives an already-resolved [`UserId`];
//! issuing one is a separate get-or-create step.
//!
//! Resolution chain for a client: explicit override > `MURMUR_IDENTITY` env >
//! identity file (`MURMUR_IDENTITY_FILE`, else `<config dir>/murmur/identity`).

use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Write as _};
use std::fs::{self, OpenOptions};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use crate::error::ErrorCode;

const MAX_USER_ID_LEN: usize = 128;
const GENERATED_PREFIX: &str = "anon-";

/// Opaque anonymous user identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a caller-supplied identity token.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError::Invalid`] when the token is empty, longer than
    /// 128 characters, or contains whitespace or control characters.
    pub fn parse(raw: &str) -> Result<Self, IdentityError> {
        if raw.is_empty() {
            return Err(IdentityError::Invalid("identity must not be empty".into()));
        }
        if raw.chars().count() > MAX_USER_ID_LEN {
            return Err(IdentityError::Invalid(format!(
                "identity longer than {MAX_USER_ID_LEN} characters"
            )));
        }
        if raw.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(IdentityError::Invalid(
                "identity must not contain whitespace or control characters".into(),
            ));
        }
        Ok(Self(raw.to_string()))
    }

    /// Generate a fresh random identity (`anon-` + 32 hex digits).
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0_u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let mut token = String::with_capacity(GENERATED_PREFIX.len() + 32);
        token.push_str(GENERATED_PREFIX);
        for byte in bytes {
            let _ = write!(token, "{byte:02x}");
        }
        Self(token)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity resolution failures.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("invalid identity: {0}")]
    Invalid(String),

    #[error("identity file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("no location for the identity file; set MURMUR_IDENTITY or MURMUR_IDENTITY_FILE")]
    NoLocation,
}

impl IdentityError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::IdentityUnavailable
    }
}

const CLAIM_ATTEMPTS: usize = 8;

/// What the identity file currently holds.
enum Stored {
    Missing,
    Empty,
    Token(UserId),
}

fn write_synced(path: &Path, token: &UserId) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    writeln!(file, "{token}")?;
    file.sync_all()
}

/// A client-side identity file, the CLI's equivalent of a durable cookie.
#[derive(Debug, Clone)]
pub struct IdentityFile {
    path: PathBuf,
}

impl IdentityFile {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the stored identity, creating and persisting one on first use.
    ///
    /// A fresh token is written to a private temp file and then hard-linked
    /// into place, so the identity file is never observed half-written and an
    /// existing token is never replaced. Concurrent first contacts converge on
    /// whichever link landed first. An empty file left by an older client is
    /// set aside and replaced.
    ///
    /// # Errors
    ///
    /// Returns [`IdentityError`] when the file cannot be read or written, or
    /// holds an invalid token.
    pub fn get_or_create(&self) -> Result<UserId, IdentityError> {
        for _ in 0..CLAIM_ATTEMPTS {
            match self.read()? {
                Stored::Token(existing) => return Ok(existing),
                Stored::Empty => self.set_aside_empty()?,
                Stored::Missing => {
                    let fresh = UserId::generate();
                    if self.publish(&fresh)? {
                        tracing::info!(path = %self.path.display(), "issued new anonymous identity");
                        return Ok(fresh);
                    }
                }
            }
        }
        Err(IdentityError::Invalid(
            "identity file kept changing while it was being claimed".into(),
        ))
    }

    fn read(&self) -> Result<Stored, IdentityError> {
        match fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                if token.is_empty() {
                    Ok(Stored::Empty)
                } else {
                    UserId::parse(token).map(Stored::Token)
                }
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Stored::Missing),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// Link a fully written token file into place. Returns `false` if another
    /// client published first.
    fn publish(&self, token: &UserId) -> Result<bool, IdentityError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|source| self.io_error(source))?;
        }

        let staged = self.sibling("tmp");
        let written = write_synced(&staged, token);
        let linked = written.and_then(|()| fs::hard_link(&staged, &self.path));
        let _ = fs::remove_file(&staged);

        match linked {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(source) => Err(self.io_error(source)),
        }
    }

    /// Move an empty identity file out of the way.
    ///
    /// If the moved file turns out to hold a token (another client published
    /// between our read and the rename), that token is linked back.
    fn set_aside_empty(&self) -> Result<(), IdentityError> {
        let stale = self.sibling("stale");
        match fs::rename(&self.path, &stale) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(self.io_error(source)),
        }

        let restored = match fs::read_to_string(&stale) {
            Ok(content) if !content.trim().is_empty() => match fs::hard_link(&stale, &self.path) {
                Ok(()) => Ok(()),
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(()),
                Err(source) => Err(self.io_error(source)),
            },
            Ok(_) => {
                tracing::warn!(path = %self.path.display(), "replacing empty identity file");
                Ok(())
            }
            Err(source) => Err(self.io_error(source)),
        };
        let _ = fs::remove_file(&stale);
        restored
    }

    /// A uniquely named file next to the identity file.
    fn sibling(&self, suffix: &str) -> PathBuf {
        let nonce: u64 = rand::thread_rng().next_u64();
        let name = self
            .path
            .file_name()
            .map_or_else(|| "identity".into(), |n| n.to_string_lossy().into_owned());
        self.path.with_file_name(format!(".{name}.{nonce:016x}.{suffix}"))
    }

    fn io_error(&self, source: io::Error) -> IdentityError {
        IdentityError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

/// Environment reader, injectable for tests.
pub trait EnvReader {
    fn get(&self, key: &str) -> Option<String>;
}

/// Process environment.
pub struct ProcessEnv;

impl EnvReader for ProcessEnv {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Resolve the client's identity following the chain:
///
/// 1. `explicit` (e.g. a `--as` flag)
/// 2. `MURMUR_IDENTITY` environment variable
/// 3. identity file at `MURMUR_IDENTITY_FILE`, else the default location
///
/// # Errors
///
/// Returns [`IdentityError`] when the chosen token is invalid or the identity
/// file cannot be used.
pub fn resolve_identity(
    explicit: Option<&str>,
    env: &dyn EnvReader,
) -> Result<UserId, IdentityError> {
    if let Some(raw) = explicit.filter(|v| !v.is_empty()) {
        return UserId::parse(raw);
    }

    if let Some(raw) = env.get("MURMUR_IDENTITY") {
        return UserId::parse(raw.trim());
    }

    let path = match env.get("MURMUR_IDENTITY_FILE") {
        Some(path) => PathBuf::from(path),
        None => default_identity_path().ok_or(IdentityError::NoLocation)?,
    };
    IdentityFile::new(path).get_or_create()
}

/// Default identity file location under the user's config directory.
#[must_use]
pub fn default_identity_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("murmur").join("identity"))
}
