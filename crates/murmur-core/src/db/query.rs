//! SQL behind the [`LedgerStore`] / [`LedgerTx`] traits for [`SqliteStore`].

use chrono::DateTime;
use rusqlite::{OptionalExtension, Row, Transaction, TransactionBehavior, params};
use std::collections::BTreeMap;

use super::SqliteStore;
use crate::error::StoreError;
use crate::feed::PageRequest;
use crate::identity::UserId;
use crate::model::{Post, PostId, PostWithState, ReactionCounts, ReactionKind, ReactionSet};
use crate::store::{ExclusivityConflict, LedgerStore, LedgerTx};

const fn counter_column(kind: ReactionKind) -> &'static str {
    match kind {
        ReactionKind::Upvote => "upvotes",
        ReactionKind::Downvote => "downvotes",
        ReactionKind::Laugh => "laughs",
    }
}

fn to_count(raw: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(raw).map_err(|_| StoreError::Corrupt(format!("negative {column} counter {raw}")))
}

fn to_sql_count(value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Corrupt(format!("counter {value} overflows")))
}

fn parse_kind(raw: &str) -> Result<ReactionKind, StoreError> {
    raw.parse::<ReactionKind>()
        .map_err(|_| StoreError::Corrupt(format!("unknown reaction kind '{raw}'")))
}

fn counts_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<(i64, i64, i64)> {
    Ok((row.get(offset)?, row.get(offset + 1)?, row.get(offset + 2)?))
}

fn decode_counts((up, down, laugh): (i64, i64, i64)) -> Result<ReactionCounts, StoreError> {
    Ok(ReactionCounts {
        upvotes: to_count(up, "upvotes")?,
        downvotes: to_count(down, "downvotes")?,
        laughs: to_count(laugh, "laughs")?,
    })
}

struct RawPost {
    post_id: String,
    content: String,
    created_at_us: i64,
    counts: (i64, i64, i64),
    active: Option<String>,
}

impl RawPost {
    fn decode(self) -> Result<PostWithState, StoreError> {
        let created_at = DateTime::from_timestamp_micros(self.created_at_us).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "post {} has out-of-range timestamp {}",
                self.post_id, self.created_at_us
            ))
        })?;
        let active = match self.active.as_deref() {
            None | Some("") => ReactionSet::empty(),
            Some(list) => list
                .split(',')
                .map(parse_kind)
                .collect::<Result<ReactionSet, _>>()?,
        };
        Ok(PostWithState {
            post: Post {
                id: PostId::new(self.post_id),
                content: self.content,
                created_at,
                counts: decode_counts(self.counts)?,
            },
            active,
        })
    }
}

impl LedgerStore for SqliteStore {
    fn begin(&mut self) -> Result<Box<dyn LedgerTx + '_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        Ok(Box::new(SqliteTx { tx }))
    }

    fn begin_read(&mut self) -> Result<Box<dyn LedgerTx + '_>, StoreError> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Deferred)?;
        Ok(Box::new(SqliteTx { tx }))
    }

    fn list_posts(
        &self,
        user_id: &UserId,
        page: &PageRequest,
    ) -> Result<Vec<PostWithState>, StoreError> {
        let after_us = page.after.as_ref().map(|cursor| cursor.created_at_us);
        let after_id = page.after.as_ref().map(|cursor| cursor.post_id.as_str());
        let limit = match page.limit {
            Some(limit) => i64::try_from(limit).unwrap_or(i64::MAX),
            None => -1,
        };

        let mut stmt = self.conn.prepare_cached(
            "SELECT p.post_id, p.content, p.created_at_us, p.upvotes, p.downvotes, p.laughs,
                    (SELECT group_concat(r.kind, ',')
                       FROM reactions r
                      WHERE r.post_id = p.post_id AND r.user_id = ?1)
               FROM posts p
              WHERE ?2 IS NULL
                 OR p.created_at_us < ?2
                 OR (p.created_at_us = ?2 AND p.post_id > ?3)
              ORDER BY p.created_at_us DESC, p.post_id ASC
              LIMIT ?4",
        )?;
        let rows = stmt.query_map(
            params![user_id.as_str(), after_us, after_id, limit],
            |row| {
                Ok(RawPost {
                    post_id: row.get(0)?,
                    content: row.get(1)?,
                    created_at_us: row.get(2)?,
                    counts: counts_from_row(row, 3)?,
                    active: row.get(6)?,
                })
            },
        )?;

        let mut posts = Vec::new();
        for raw in rows {
            posts.push(raw?.decode()?);
        }
        Ok(posts)
    }
}

struct SqliteTx<'conn> {
    tx: Transaction<'conn>,
}

impl LedgerTx for SqliteTx<'_> {
    fn insert_post(&mut self, post: &Post) -> Result<(), StoreError> {
        self.tx.execute(
            "INSERT INTO posts (post_id, content, created_at_us, upvotes, downvotes, laughs)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                post.id.as_str(),
                post.content,
                post.created_at_us(),
                to_sql_count(post.counts.upvotes)?,
                to_sql_count(post.counts.downvotes)?,
                to_sql_count(post.counts.laughs)?,
            ],
        )?;
        Ok(())
    }

    fn post_counts(&self, post_id: &PostId) -> Result<Option<ReactionCounts>, StoreError> {
        let raw = self
            .tx
            .query_row(
                "SELECT upvotes, downvotes, laughs FROM posts WHERE post_id = ?1",
                params![post_id.as_str()],
                |row| counts_from_row(row, 0),
            )
            .optional()?;
        raw.map(decode_counts).transpose()
    }

    fn active_kinds(&self, user_id: &UserId, post_id: &PostId) -> Result<ReactionSet, StoreError> {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT kind FROM reactions WHERE user_id = ?1 AND post_id = ?2")?;
        let kinds = stmt.query_map(params![user_id.as_str(), post_id.as_str()], |row| {
            row.get::<_, String>(0)
        })?;

        let mut active = ReactionSet::empty();
        for kind in kinds {
            active.insert(parse_kind(&kind?)?);
        }
        Ok(active)
    }

    fn insert_entry(
        &mut self,
        user_id: &UserId,
        post_id: &PostId,
        kind: ReactionKind,
        created_at_us: i64,
    ) -> Result<bool, StoreError> {
        let inserted = self.tx.execute(
            "INSERT OR IGNORE INTO reactions (user_id, post_id, kind, created_at_us)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id.as_str(), post_id.as_str(), kind.as_str(), created_at_us],
        )?;
        Ok(inserted == 1)
    }

    fn delete_entry(
        &mut self,
        user_id: &UserId,
        post_id: &PostId,
        kind: ReactionKind,
    ) -> Result<bool, StoreError> {
        let deleted = self.tx.execute(
            "DELETE FROM reactions WHERE user_id = ?1 AND post_id = ?2 AND kind = ?3",
            params![user_id.as_str(), post_id.as_str(), kind.as_str()],
        )?;
        Ok(deleted == 1)
    }

    fn adjust_counter(
        &mut self,
        post_id: &PostId,
        kind: ReactionKind,
        delta: i64,
    ) -> Result<(), StoreError> {
        let column = counter_column(kind);
        let sql = format!("UPDATE posts SET {column} = {column} + ?1 WHERE post_id = ?2");
        let updated = self.tx.execute(&sql, params![delta, post_id.as_str()])?;
        if updated != 1 {
            return Err(StoreError::Invariant(format!(
                "post {post_id} vanished mid-transaction"
            )));
        }
        Ok(())
    }

    fn set_counts(&mut self, post_id: &PostId, counts: ReactionCounts) -> Result<(), StoreError> {
        let updated = self.tx.execute(
            "UPDATE posts SET upvotes = ?1, downvotes = ?2, laughs = ?3 WHERE post_id = ?4",
            params![
                to_sql_count(counts.upvotes)?,
                to_sql_count(counts.downvotes)?,
                to_sql_count(counts.laughs)?,
                post_id.as_str(),
            ],
        )?;
        if updated != 1 {
            return Err(StoreError::Invariant(format!(
                "post {post_id} vanished mid-transaction"
            )));
        }
        Ok(())
    }

    fn delete_post(&mut self, post_id: &PostId) -> Result<Option<u64>, StoreError> {
        let entries = self.tx.execute(
            "DELETE FROM reactions WHERE post_id = ?1",
            params![post_id.as_str()],
        )?;
        let posts = self
            .tx
            .execute("DELETE FROM posts WHERE post_id = ?1", params![post_id.as_str()])?;
        if posts == 0 {
            return Ok(None);
        }
        Ok(Some(u64::try_from(entries).unwrap_or(u64::MAX)))
    }

    fn stored_counts(&self) -> Result<BTreeMap<PostId, ReactionCounts>, StoreError> {
        let mut stmt = self
            .tx
            .prepare_cached("SELECT post_id, upvotes, downvotes, laughs FROM posts")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, counts_from_row(row, 1)?))
        })?;

        let mut stored = BTreeMap::new();
        for row in rows {
            let (post_id, raw) = row?;
            stored.insert(PostId::new(post_id), decode_counts(raw)?);
        }
        Ok(stored)
    }

    fn tally_entries(&self) -> Result<BTreeMap<PostId, ReactionCounts>, StoreError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT post_id, kind, COUNT(*) FROM reactions GROUP BY post_id, kind",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut tally: BTreeMap<PostId, ReactionCounts> = BTreeMap::new();
        for row in rows {
            let (post_id, kind, count) = row?;
            let kind = parse_kind(&kind)?;
            let count = to_count(count, kind.as_str())?;
            tally.entry(PostId::new(post_id)).or_default().set(kind, count);
        }
        Ok(tally)
    }

    fn exclusivity_conflicts(&self) -> Result<Vec<ExclusivityConflict>, StoreError> {
        let mut stmt = self.tx.prepare_cached(
            "SELECT u.user_id, u.post_id, u.created_at_us, d.created_at_us
               FROM reactions u
               JOIN reactions d
                 ON d.user_id = u.user_id AND d.post_id = u.post_id AND d.kind = 'downvote'
              WHERE u.kind = 'upvote'
              ORDER BY u.post_id, u.user_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
                row.get::<_, i64>(3)?,
            ))
        })?;

        let mut conflicts = Vec::new();
        for row in rows {
            let (user_id, post_id, upvoted_at_us, downvoted_at_us) = row?;
            let user_id = UserId::parse(&user_id)
                .map_err(|err| StoreError::Corrupt(format!("reaction row: {err}")))?;
            conflicts.push(ExclusivityConflict {
                user_id,
                post_id: PostId::new(post_id),
                upvoted_at_us,
                downvoted_at_us,
            });
        }
        Ok(conflicts)
    }

    fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit()?;
        Ok(())
    }
}
