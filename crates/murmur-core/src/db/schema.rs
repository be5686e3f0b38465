//! Canonical SQLite schema for a murmur board.
//!
//! - `posts` holds immutable content plus the three cached reaction counters
//! - `reactions` is the per-user vote ledger, one row per active
//!   `(user_id, post_id, kind)`
//! - `board_meta` tracks the schema version alongside `PRAGMA user_version`

/// Migration v1: core tables plus board metadata.
pub const MIGRATION_V1_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS posts (
    post_id TEXT PRIMARY KEY,
    content TEXT NOT NULL CHECK (length(trim(content)) > 0),
    created_at_us INTEGER NOT NULL,
    upvotes INTEGER NOT NULL DEFAULT 0 CHECK (upvotes >= 0),
    downvotes INTEGER NOT NULL DEFAULT 0 CHECK (downvotes >= 0),
    laughs INTEGER NOT NULL DEFAULT 0 CHECK (laughs >= 0)
);

CREATE TABLE IF NOT EXISTS reactions (
    user_id TEXT NOT NULL CHECK (length(user_id) > 0),
    post_id TEXT NOT NULL REFERENCES posts(post_id) ON DELETE CASCADE,
    kind TEXT NOT NULL CHECK (kind IN ('upvote', 'downvote', 'laugh')),
    created_at_us INTEGER NOT NULL,
    PRIMARY KEY (user_id, post_id, kind)
);

CREATE TABLE IF NOT EXISTS board_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO board_meta (id, schema_version, created_at_us)
VALUES (1, 1, CAST((julianday('now') - 2440587.5) * 86400000000 AS INTEGER));
"#;

/// Migration v2: read-path indexes for the feed and the audit pass.
pub const MIGRATION_V2_SQL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_posts_created
    ON posts(created_at_us DESC, post_id ASC);

CREATE INDEX IF NOT EXISTS idx_reactions_post_kind
    ON reactions(post_id, kind);
"#;

/// Indexes expected after all migrations.
pub const REQUIRED_INDEXES: &[&str] = &["idx_posts_created", "idx_reactions_post_kind"];
