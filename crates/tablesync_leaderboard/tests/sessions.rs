//! Leaderboards shared by several sessions on one backend.

use parking_lot::Mutex;
use std::sync::Arc;
use tablesync_core::{MemoryBackend, SessionContext};
use tablesync_leaderboard::{
    Leaderboard, LeaderboardConfig, LevelMap, MemoryReplayStore, TimeRecord,
};

fn session(
    backend: &Arc<MemoryBackend>,
    store: &Arc<MemoryReplayStore>,
    map: &LevelMap,
) -> Leaderboard {
    let ctx = SessionContext::new(backend.clone());
    Leaderboard::open(&ctx, map.clone(), store.clone(), LeaderboardConfig::default())
}

fn settle(boards: &[&Leaderboard]) {
    for _ in 0..10 {
        for board in boards {
            board.poll().unwrap();
        }
        if boards.iter().all(|b| b.is_settled()) {
            return;
        }
    }
    panic!("leaderboards did not settle");
}

#[test]
fn players_see_each_others_times() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(MemoryReplayStore::new());
    let map = LevelMap::published("castle", "Maps/u1/castle");

    let alice = session(&backend, &store, &map);
    let bob = session(&backend, &store, &map);

    alice.submit("alice", 5_000, Some(vec![1, 2]), true).unwrap();
    bob.submit("bob", 4_000, None, false).unwrap();
    settle(&[&alice, &bob]);

    let names = |board: &Leaderboard| -> Vec<String> {
        board.top_ranks().into_iter().map(|(_, r)| r.name).collect()
    };
    assert_eq!(names(&alice), ["bob", "alice"]);
    assert_eq!(names(&bob), ["bob", "alice"]);

    let path = bob.best_shared_replay_path().unwrap();
    assert!(path.starts_with("Replay/Maps/u1/castle/"));

    let fetched = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&fetched);
    bob.fetch_replay(&path, Box::new(move |r| *sink.lock() = Some(r)));
    assert_eq!(*fetched.lock(), Some(Ok(vec![1, 2])));
}

#[test]
fn maps_do_not_share_ranks() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(MemoryReplayStore::new());
    let first = session(&backend, &store, &LevelMap::offline("m1"));
    let second = session(&backend, &store, &LevelMap::offline("m2"));

    first.submit("a", 100, None, false).unwrap();
    settle(&[&first, &second]);

    assert_eq!(first.top_ranks().len(), 1);
    assert!(second.top_ranks().is_empty());
    assert_eq!(
        backend.children("Leaderboard/Map/OfflineMaps/m1/Top/Ranks").len(),
        1
    );
}

#[test]
fn existing_records_load_on_open() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(MemoryReplayStore::new());
    let map = LevelMap::offline("m1");
    let raw = serde_json::to_vec(&TimeRecord::new("ghost", 1_234)).unwrap();
    backend.put_remote(&map.rank_path(), "-OLD", raw);

    let board = session(&backend, &store, &map);
    assert!(board.top_ranks().is_empty());
    board.poll().unwrap();
    assert_eq!(board.top_ranks(), vec![("-OLD".to_string(), TimeRecord::new("ghost", 1_234))]);
}

#[test]
fn offline_submissions_confirm_after_reconnect() {
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(MemoryReplayStore::new());
    let board = session(&backend, &store, &LevelMap::offline("m1"));

    backend.set_offline(true);
    let key = board.submit("ham", 2_000, None, false).unwrap();
    board.poll().unwrap();
    assert!(!board.is_settled());
    assert!(board.ranks().get(&key).unwrap().is_dirty());

    backend.set_offline(false);
    settle(&[&board]);
    assert!(backend
        .get("Leaderboard/Map/OfflineMaps/m1/Top/Ranks", &key)
        .is_some());
}
