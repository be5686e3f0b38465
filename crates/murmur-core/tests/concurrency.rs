//! Several connections toggling on one database file at once.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use murmur_core::db::{SqliteStore, StoreOptions};
use murmur_core::identity::UserId;
use murmur_core::ledger::Ledger;
use murmur_core::model::{PostId, ReactionCounts, ReactionKind};
use murmur_core::store::{LedgerStore, LedgerTx};

const THREADS: usize = 6;
const ROUNDS: usize = 40;

fn options() -> StoreOptions {
    StoreOptions {
        busy_timeout: Duration::from_secs(30),
    }
}

#[test]
fn concurrent_toggles_keep_counters_consistent() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("board.sqlite3");

    let post_id: PostId = {
        let mut ledger = Ledger::new(SqliteStore::open(&path, &options()).expect("open"));
        ledger.create_post("shared post").expect("create").id
    };

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let path = path.clone();
            let post_id = post_id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut ledger = Ledger::new(SqliteStore::open(&path, &options()).expect("open"));
                // pairs of threads share one identity so their toggles race on
                // the same (user, post) entries
                let user = UserId::parse(&format!("racer-{}", t / 2)).expect("valid id");
                barrier.wait();
                for round in 0..ROUNDS {
                    let kind = ReactionKind::ALL[(round + t) % ReactionKind::ALL.len()];
                    ledger.toggle(&user, &post_id, kind).expect("toggle");
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked");
    }

    let mut ledger = Ledger::new(SqliteStore::open(&path, &options()).expect("reopen"));
    let report = ledger.audit().expect("audit");
    assert!(report.is_ok(), "{report:?}");

    let mut recount = ReactionCounts::default();
    for racer in 0..THREADS.div_ceil(2) {
        let user = UserId::parse(&format!("racer-{racer}")).expect("valid id");
        let rows = ledger.list_with_user_state(&user).expect("list");
        let active = rows[0].active;
        assert!(
            !(active.contains(ReactionKind::Upvote) && active.contains(ReactionKind::Downvote)),
            "{user} holds {active}"
        );
        for kind in active.iter() {
            recount.increment(kind);
        }
    }

    let rows = ledger.list_with_user_state(&UserId::parse("observer").expect("valid id"));
    assert_eq!(rows.expect("list")[0].post.counts, recount);
}

#[test]
fn read_snapshot_does_not_block_writers() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("board.sqlite3");
    let impatient = StoreOptions {
        busy_timeout: Duration::from_millis(50),
    };

    let post_id: PostId = {
        let mut ledger = Ledger::new(SqliteStore::open(&path, &options()).expect("open"));
        ledger.create_post("audited post").expect("create").id
    };
    let voter = UserId::parse("voter").expect("valid id");

    let mut reader = SqliteStore::open(&path, &options()).expect("open reader");
    let snapshot = reader.begin_read().expect("begin read");
    let before = snapshot.stored_counts().expect("read counts");
    assert_eq!(before[&post_id], ReactionCounts::default());

    let mut writer = Ledger::new(SqliteStore::open(&path, &impatient).expect("open writer"));
    writer
        .toggle(&voter, &post_id, ReactionKind::Upvote)
        .expect("write while a reader holds a snapshot");

    let during = snapshot.stored_counts().expect("re-read counts");
    assert_eq!(during[&post_id], ReactionCounts::default());
    drop(snapshot);

    let mut ledger = Ledger::new(reader);
    assert!(ledger.audit().expect("audit").is_ok());
    let rows = ledger.list_with_user_state(&voter).expect("list");
    assert_eq!(rows[0].post.counts.upvotes, 1);
}

#[test]
fn write_transaction_holds_off_other_writers() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("board.sqlite3");
    let impatient = StoreOptions {
        busy_timeout: Duration::from_millis(50),
    };

    let post_id: PostId = {
        let mut ledger = Ledger::new(SqliteStore::open(&path, &options()).expect("open"));
        ledger.create_post("locked post").expect("create").id
    };
    let voter = UserId::parse("voter").expect("valid id");

    let mut holder = SqliteStore::open(&path, &options()).expect("open holder");
    let lock = holder.begin().expect("begin write");

    let mut writer = Ledger::new(SqliteStore::open(&path, &impatient).expect("open writer"));
    assert!(writer.toggle(&voter, &post_id, ReactionKind::Upvote).is_err());

    drop(lock);
    writer
        .toggle(&voter, &post_id, ReactionKind::Upvote)
        .expect("toggle after lock released");
}

#[test]
fn delete_racing_toggles_leaves_no_orphans() {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("board.sqlite3");

    let post_id = {
        let mut ledger = Ledger::new(SqliteStore::open(&path, &options()).expect("open"));
        ledger.create_post("doomed").expect("create").id
    };

    let barrier = Arc::new(Barrier::new(THREADS + 1));
    let togglers: Vec<_> = (0..THREADS)
        .map(|t| {
            let path = path.clone();
            let post_id = post_id.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let mut ledger = Ledger::new(SqliteStore::open(&path, &options()).expect("open"));
                let user = UserId::parse(&format!("user-{t}")).expect("valid id");
                barrier.wait();
                for _ in 0..ROUNDS {
                    // NotFound once the delete lands; anything else is a failure
                    if let Err(err) = ledger.toggle(&user, &post_id, ReactionKind::Laugh) {
                        assert!(
                            matches!(err, murmur_core::error::LedgerError::NotFound(_)),
                            "{err}"
                        );
                        break;
                    }
                }
            })
        })
        .collect();

    let mut admin = Ledger::new(SqliteStore::open(&path, &options()).expect("open"));
    barrier.wait();
    admin.delete_post(&post_id, true).expect("delete");

    for handle in togglers {
        handle.join().expect("worker panicked");
    }

    let orphans: i64 = admin
        .store()
        .connection()
        .query_row("SELECT COUNT(*) FROM reactions", [], |row| row.get(0))
        .expect("count");
    assert_eq!(orphans, 0);
    assert!(admin.audit().expect("audit").is_ok());
}
