//! murmur-core library.
//!
//! Reaction ledger for an anonymous feedback board: posts, per-user
//! upvote/downvote/laugh entries, and the counters derived from them.
//!
//! # Conventions
//!
//! - **Errors**: typed `thiserror` enums per concern ([`error::LedgerError`],
//!   [`error::StoreError`], [`identity::IdentityError`], [`config::ConfigError`]),
//!   each mapping to a stable [`error::ErrorCode`].
//! - **Logging**: `tracing` macros (`info!`, `warn!`, `debug!`); the binary
//!   installs the subscriber.
//! - **Storage**: the [`ledger::Ledger`] runs against any
//!   [`store::LedgerStore`]; [`db::SqliteStore`] is the durable one.

pub mod admin;
pub mod audit;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod identity;
pub mod ledger;
pub mod model;
pub mod optimistic;
pub mod store;
