use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use murmur_core::db::SqliteStore;
use murmur_core::identity::UserId;
use murmur_core::ledger::Ledger;
use murmur_core::model::{PostId, PostWithState, ReactionCounts, ReactionKind};
use murmur_core::store::LedgerStore;
use murmur_core::store::memory::MemoryStore;

const USERS: usize = 4;
const POSTS: usize = 3;

#[derive(Debug, Clone, Copy)]
struct Toggle {
    user: usize,
    post: usize,
    kind: ReactionKind,
}

fn arb_kind() -> impl Strategy<Value = ReactionKind> {
    prop_oneof![
        Just(ReactionKind::Upvote),
        Just(ReactionKind::Downvote),
        Just(ReactionKind::Laugh),
    ]
}

fn arb_toggle() -> impl Strategy<Value = Toggle> {
    (0..USERS, 0..POSTS, arb_kind()).prop_map(|(user, post, kind)| Toggle { user, post, kind })
}

fn users() -> Vec<UserId> {
    (0..USERS)
        .map(|i| UserId::parse(&format!("user-{i}")).expect("valid id"))
        .collect()
}

/// Seed `POSTS` posts with distinct timestamps so both stores list them in
/// the same order.
fn seed<S: LedgerStore>(ledger: &mut Ledger<S>) -> Vec<PostId> {
    (0..POSTS)
        .map(|i| {
            let secs = 1_700_000_000 + i64::try_from(i).expect("small index");
            let at = Utc.timestamp_opt(secs, 0).single().expect("valid ts");
            ledger
                .create_post_at(&format!("post {i}"), at)
                .expect("create")
                .id
        })
        .collect()
}

fn run<S: LedgerStore>(ledger: &mut Ledger<S>, toggles: &[Toggle]) -> Vec<PostWithState> {
    let users = users();
    let posts = seed(ledger);
    for toggle in toggles {
        ledger
            .toggle(&users[toggle.user], &posts[toggle.post], toggle.kind)
            .expect("toggle");
    }
    ledger.list_with_user_state(&users[0]).expect("list")
}

/// Counters recomputed from every user's active set.
fn recount<S: LedgerStore>(ledger: &Ledger<S>) -> Vec<ReactionCounts> {
    let mut totals = vec![ReactionCounts::default(); POSTS];
    for user in users() {
        let rows = ledger.list_with_user_state(&user).expect("list");
        for (slot, row) in totals.iter_mut().zip(&rows) {
            for kind in row.active.iter() {
                slot.increment(kind);
            }
        }
    }
    totals
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(256))]

    #[test]
    fn counters_match_entries_after_any_sequence(
        toggles in prop::collection::vec(arb_toggle(), 0..60)
    ) {
        let mut ledger = Ledger::new(SqliteStore::open_in_memory().expect("open"));
        let rows = run(&mut ledger, &toggles);

        let stored: Vec<_> = rows.iter().map(|row| row.post.counts).collect();
        prop_assert_eq!(stored, recount(&ledger));
        prop_assert!(ledger.audit().expect("audit").is_ok());
    }

    #[test]
    fn upvote_and_downvote_never_coexist(
        toggles in prop::collection::vec(arb_toggle(), 0..60)
    ) {
        let mut ledger = Ledger::new(MemoryStore::new());
        run(&mut ledger, &toggles);

        for user in users() {
            for row in ledger.list_with_user_state(&user).expect("list") {
                prop_assert!(
                    !(row.active.contains(ReactionKind::Upvote)
                        && row.active.contains(ReactionKind::Downvote)),
                    "{} holds {}", user, row.active
                );
            }
        }
    }

    #[test]
    fn sqlite_and_memory_stores_agree(
        toggles in prop::collection::vec(arb_toggle(), 0..60)
    ) {
        let mut sqlite = Ledger::new(SqliteStore::open_in_memory().expect("open"));
        let mut memory = Ledger::new(MemoryStore::new());
        let from_sqlite = run(&mut sqlite, &toggles);
        let from_memory = run(&mut memory, &toggles);

        prop_assert_eq!(from_sqlite.len(), from_memory.len());
        for (a, b) in from_sqlite.iter().zip(&from_memory) {
            prop_assert_eq!(&a.post.content, &b.post.content);
            prop_assert_eq!(a.post.counts, b.post.counts);
            prop_assert_eq!(a.active, b.active);
        }
    }

    #[test]
    fn toggling_twice_restores_state(
        prefix in prop::collection::vec(arb_toggle(), 0..30),
        repeated in arb_toggle(),
    ) {
        let mut ledger = Ledger::new(MemoryStore::new());
        let users = users();
        let posts = seed(&mut ledger);
        for toggle in &prefix {
            ledger.toggle(&users[toggle.user], &posts[toggle.post], toggle.kind).expect("toggle");
        }
        let user = &users[repeated.user];
        let before = ledger.list_with_user_state(user).expect("list");

        let first = ledger.toggle(user, &posts[repeated.post], repeated.kind).expect("first");
        let second = ledger.toggle(user, &posts[repeated.post], repeated.kind).expect("second");

        // a toggle-on that displaced the opposing vote cannot be undone by
        // toggling the same kind again
        if first.displaced.is_none() {
            let after = ledger.list_with_user_state(user).expect("list");
            prop_assert_eq!(before, after);
        } else {
            prop_assert!(second.active.iter().all(|kind| kind != repeated.kind));
        }
    }
}
