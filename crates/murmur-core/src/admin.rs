//! Shared-secret admin check.
//!
//! The process holds a BLAKE3 digest of the configured secret and compares
//! digests of caller-supplied secrets against it. The ledger itself only sees
//! the resulting `caller_is_admin` flag.

use std::fmt;

/// Process-held admin secret.
#[derive(Clone)]
pub struct AdminSecret {
    digest: blake3::Hash,
}

impl AdminSecret {
    /// Hold `secret`; returns `None` for an empty or whitespace-only secret.
    #[must_use]
    pub fn new(secret: &str) -> Option<Self> {
        if secret.trim().is_empty() {
            return None;
        }
        Some(Self {
            digest: blake3::hash(secret.as_bytes()),
        })
    }

    /// Read the secret from the environment variable `var`.
    #[must_use]
    pub fn from_env(var: &str) -> Option<Self> {
        std::env::var(var).ok().and_then(|value| Self::new(&value))
    }

    /// Whether `supplied` matches the held secret.
    ///
    /// `blake3::Hash` equality is constant-time.
    #[must_use]
    pub fn authorizes(&self, supplied: &str) -> bool {
        blake3::hash(supplied.as_bytes()) == self.digest
    }
}

impl fmt::Debug for AdminSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminSecret(<redacted>)")
    }
}

/// Decide admin status for a request; no configured secret means no admin.
#[must_use]
pub fn caller_is_admin(held: Option<&AdminSecret>, supplied: Option<&str>) -> bool {
    match (held, supplied) {
        (Some(held), Some(supplied)) => held.authorizes(supplied),
        _ => false,
    }
}
