//! Board schema upgrades.
//!
//! A board records its schema version twice: in `PRAGMA user_version` (read
//! on every open) and in `board_meta.schema_version` (visible to anyone
//! inspecting the file). Each step bumps both inside the transaction that
//! applies it, so a crash leaves the board at a whole version.

use super::schema;
use crate::error::StoreError;
use rusqlite::{Connection, types::Type};

/// One schema upgrade.
struct Step {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const STEPS: &[Step] = &[
    Step {
        version: 1,
        name: "posts, reactions and board metadata",
        sql: schema::MIGRATION_V1_SQL,
    },
    Step {
        version: 2,
        name: "feed and audit indexes",
        sql: schema::MIGRATION_V2_SQL,
    },
];

/// Latest schema version understood by this binary.
pub const LATEST_SCHEMA_VERSION: u32 = 2;

/// Schema version the board was last upgraded to.
///
/// # Errors
///
/// Returns an error if querying SQLite fails or the stored value is not a
/// valid version.
pub fn current_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    u32::try_from(version).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(error))
    })
}

/// Bring a board up to [`LATEST_SCHEMA_VERSION`] and check that the feed and
/// audit indexes are in place.
///
/// Returns the resulting version.
///
/// # Errors
///
/// [`StoreError::Schema`] if the board was written by a newer murmur or an
/// index is missing afterwards; [`StoreError::Sqlite`] if a step fails, in
/// which case that step is rolled back.
pub fn upgrade_board(conn: &mut Connection) -> Result<u32, StoreError> {
    let found = current_schema_version(conn)?;
    if found > LATEST_SCHEMA_VERSION {
        return Err(StoreError::Schema(format!(
            "board uses schema v{found}, this build understands up to v{LATEST_SCHEMA_VERSION}"
        )));
    }

    for step in STEPS.iter().filter(|step| step.version > found) {
        let tx = conn.transaction()?;
        tx.execute_batch(step.sql)?;
        tx.pragma_update(None, "user_version", i64::from(step.version))?;
        tx.execute(
            "UPDATE board_meta SET schema_version = ?1 WHERE id = 1",
            [i64::from(step.version)],
        )?;
        tx.commit()?;
        tracing::debug!(version = step.version, step = step.name, "upgraded board schema");
    }

    let missing = missing_indexes(conn)?;
    if !missing.is_empty() {
        return Err(StoreError::Schema(format!(
            "missing index(es): {}",
            missing.join(", ")
        )));
    }

    current_schema_version(conn).map_err(StoreError::from)
}

fn missing_indexes(conn: &Connection) -> rusqlite::Result<Vec<&'static str>> {
    let mut stmt =
        conn.prepare("SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'index' AND name = ?1)")?;
    let mut missing = Vec::new();
    for index in schema::REQUIRED_INDEXES {
        let present: bool = stmt.query_row([index], |row| row.get(0))?;
        if !present {
            missing.push(*index);
        }
    }
    Ok(missing)
}

#[cfg(test)]
mod tests {
    use super::{LATEST_SCHEMA_VERSION, STEPS, current_schema_version, upgrade_board};
    use crate::db::schema;
    use crate::error::StoreError;
    use rusqlite::{Connection, params};

    fn sqlite_object_exists(
        conn: &Connection,
        object_type: &str,
        object_name: &str,
    ) -> rusqlite::Result<bool> {
        conn.query_row(
            "SELECT EXISTS(
                SELECT 1
                FROM sqlite_master
                WHERE type = ?1 AND name = ?2
            )",
            params![object_type, object_name],
            |row| row.get(0),
        )
    }

    #[test]
    fn steps_are_contiguous_up_to_latest() {
        let versions: Vec<u32> = STEPS.iter().map(|step| step.version).collect();
        let expected: Vec<u32> = (1..=LATEST_SCHEMA_VERSION).collect();
        assert_eq!(versions, expected);
    }

    #[test]
    fn fresh_board_reaches_latest() -> Result<(), StoreError> {
        let mut conn = Connection::open_in_memory()?;

        let applied = upgrade_board(&mut conn)?;
        assert_eq!(applied, LATEST_SCHEMA_VERSION);
        assert_eq!(current_schema_version(&conn)?, LATEST_SCHEMA_VERSION);

        assert!(sqlite_object_exists(&conn, "table", "posts")?);
        assert!(sqlite_object_exists(&conn, "table", "reactions")?);
        assert!(sqlite_object_exists(&conn, "table", "board_meta")?);

        for index in schema::REQUIRED_INDEXES {
            assert!(
                sqlite_object_exists(&conn, "index", index)?,
                "missing expected index {index}"
            );
        }

        Ok(())
    }

    #[test]
    fn upgrading_twice_changes_nothing() -> Result<(), StoreError> {
        let mut conn = Connection::open_in_memory()?;

        assert_eq!(upgrade_board(&mut conn)?, LATEST_SCHEMA_VERSION);
        assert_eq!(upgrade_board(&mut conn)?, LATEST_SCHEMA_VERSION);

        let meta_rows: i64 =
            conn.query_row("SELECT COUNT(*) FROM board_meta", [], |row| row.get(0))?;
        assert_eq!(meta_rows, 1);

        let schema_version: i64 = conn.query_row(
            "SELECT schema_version FROM board_meta WHERE id = 1",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(schema_version, i64::from(LATEST_SCHEMA_VERSION));

        Ok(())
    }

    #[test]
    fn v1_board_keeps_its_posts() -> Result<(), StoreError> {
        let mut conn = Connection::open_in_memory()?;

        conn.execute_batch(schema::MIGRATION_V1_SQL)?;
        conn.pragma_update(None, "user_version", 1_i64)?;
        conn.execute(
            "INSERT INTO posts (post_id, content, created_at_us, upvotes)
             VALUES ('mm-legacy', 'from v1', 42, 3)",
            [],
        )?;

        assert_eq!(upgrade_board(&mut conn)?, LATEST_SCHEMA_VERSION);

        let upvotes: i64 = conn.query_row(
            "SELECT upvotes FROM posts WHERE post_id = 'mm-legacy'",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(upvotes, 3);
        assert!(sqlite_object_exists(&conn, "index", "idx_posts_created")?);

        Ok(())
    }

    #[test]
    fn board_from_newer_build_is_refused() -> Result<(), StoreError> {
        let mut conn = Connection::open_in_memory()?;
        upgrade_board(&mut conn)?;
        conn.pragma_update(None, "user_version", i64::from(LATEST_SCHEMA_VERSION + 1))?;

        assert!(matches!(upgrade_board(&mut conn), Err(StoreError::Schema(_))));
        Ok(())
    }

    #[test]
    fn dropped_index_is_reported() -> Result<(), StoreError> {
        let mut conn = Connection::open_in_memory()?;
        upgrade_board(&mut conn)?;
        conn.execute_batch("DROP INDEX idx_reactions_post_kind")?;

        match upgrade_board(&mut conn) {
            Err(StoreError::Schema(message)) => {
                assert!(message.contains("idx_reactions_post_kind"), "{message}");
            }
            other => panic!("expected schema error, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn schema_rejects_unknown_kind_and_negative_counters() -> Result<(), StoreError> {
        let mut conn = Connection::open_in_memory()?;
        upgrade_board(&mut conn)?;
        conn.execute(
            "INSERT INTO posts (post_id, content, created_at_us) VALUES ('mm-1', 'x', 1)",
            [],
        )?;

        let bad_kind = conn.execute(
            "INSERT INTO reactions (user_id, post_id, kind, created_at_us)
             VALUES ('u', 'mm-1', 'heart', 1)",
            [],
        );
        assert!(bad_kind.is_err());

        let negative = conn.execute("UPDATE posts SET laughs = laughs - 1 WHERE post_id = 'mm-1'", []);
        assert!(negative.is_err());

        Ok(())
    }
}
