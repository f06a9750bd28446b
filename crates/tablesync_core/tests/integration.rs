//! Integration tests for remote tables sharing one backend.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::thread;
use tablesync_core::{
    CborCodec, Completion, JsonCodec, MemoryBackend, RemoteBackend, RemoteListener, RemoteTable,
    SessionContext, SubscriptionId, TableError,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    name: String,
    level: u32,
}

type Profiles = RemoteTable<Profile, JsonCodec<Profile>>;

fn profile(name: &str, level: u32) -> Profile {
    Profile {
        name: name.to_string(),
        level,
    }
}

/// A backend that forwards to another one and records every path touched.
struct RecordingBackend {
    inner: Arc<MemoryBackend>,
    touched: parking_lot::Mutex<Vec<String>>,
}

impl RemoteBackend for RecordingBackend {
    fn subscribe(&self, path: &str, listener: Arc<dyn RemoteListener>) -> SubscriptionId {
        self.inner.subscribe(path, listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id)
    }

    fn write(&self, path: &str, key: &str, value: Vec<u8>, done: Completion) {
        self.touched.lock().push(format!("{path}/{key}"));
        self.inner.write(path, key, value, done)
    }

    fn remove(&self, path: &str, done: Completion) {
        self.touched.lock().push(path.to_string());
        self.inner.remove(path, done)
    }
}

#[test]
fn two_clients_converge() {
    let backend = Arc::new(MemoryBackend::new());
    let alice_ctx = SessionContext::new(backend.clone());
    let bob_ctx = SessionContext::new(backend.clone());

    let alice: Profiles = RemoteTable::open(&alice_ctx, "profiles", JsonCodec::new());
    let bob: Profiles = RemoteTable::open(&bob_ctx, "profiles", JsonCodec::new());

    let key = alice.unique_key();
    alice.add(key.clone(), profile("alice", 3)).unwrap();
    alice.push().unwrap();

    bob.apply_remote_changes().unwrap();
    assert_eq!(bob.value(&key), Some(profile("alice", 3)));

    bob.update(&key, |p| p.level = 4).unwrap();
    bob.push().unwrap();

    alice.apply_remote_changes().unwrap();
    assert_eq!(alice.value(&key).unwrap().level, 4);
    assert!(!alice.get(&key).unwrap().is_dirty());

    bob.remove(&key).unwrap();
    bob.push().unwrap();
    alice.apply_remote_changes().unwrap();
    assert!(alice.is_empty());
}

#[test]
fn push_then_remote_batch() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());
    let table: RemoteTable<i64, JsonCodec<i64>> = RemoteTable::open(&ctx, "numbers", JsonCodec::new());

    // Add then confirmed push leaves the entry clean.
    table.add("a", 100).unwrap();
    table.push().unwrap();
    assert!(!table.get("a").unwrap().is_dirty());

    // Remote upsert of "b" and delete of "a" in one batch.
    table.apply_remote_changes().unwrap();
    backend.put_remote("numbers", "b", b"7".to_vec());
    backend.remove_remote("numbers/a");
    table.apply_remote_changes().unwrap();
    let snapshot = table.snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot["b"], 7);

    // Overlapping notifications for "c".
    backend.put_remote("numbers", "c", b"1".to_vec());
    backend.put_remote("numbers", "c", b"2".to_vec());
    table.apply_remote_changes().unwrap();
    assert_eq!(table.value("c"), Some(2));
}

#[test]
fn tables_on_different_paths_are_isolated() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());
    let ranks: Profiles = RemoteTable::open(&ctx, "Top/Ranks", JsonCodec::new());
    let replays: Profiles = RemoteTable::open(&ctx, "Top/SharedReplays", JsonCodec::new());

    ranks.add("r1", profile("a", 1)).unwrap();
    ranks.push().unwrap();
    replays.apply_remote_changes().unwrap();
    assert!(replays.is_empty());

    ranks.clear().unwrap();
    assert!(ranks.is_empty());
    assert!(backend.children("Top/Ranks").is_empty());
}

#[test]
fn session_keys_never_repeat_across_tables() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend);
    let a: Profiles = RemoteTable::open(&ctx, "a", JsonCodec::new());
    let b: Profiles = RemoteTable::open(&ctx, "b", JsonCodec::new());

    let mut keys: Vec<String> = (0..100).map(|_| a.unique_key()).collect();
    keys.extend((0..100).map(|_| b.unique_key()));
    let total = keys.len();
    keys.sort();
    keys.dedup();
    assert_eq!(keys.len(), total);
}

#[test]
fn concurrent_notifications_and_applies() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());
    let table: Arc<RemoteTable<u64, CborCodec<u64>>> =
        Arc::new(RemoteTable::open(&ctx, "counters", CborCodec::new()));
    let codec = CborCodec::<u64>::new();

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let backend = backend.clone();
            let raw: Vec<Vec<u8>> = (0..50u64)
                .map(|i| tablesync_core::RecordCodec::encode(&codec, &(w * 1000 + i)).unwrap())
                .collect();
            thread::spawn(move || {
                for (i, payload) in raw.into_iter().enumerate() {
                    backend.put_remote("counters", &format!("w{w}-{i}"), payload);
                }
            })
        })
        .collect();

    let poller = {
        let table = table.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                table.apply_remote_changes().unwrap();
                thread::yield_now();
            }
        })
    };

    for writer in writers {
        writer.join().unwrap();
    }
    poller.join().unwrap();
    table.apply_remote_changes().unwrap();

    assert_eq!(table.len(), 200);
    assert_eq!(table.value("w3-49"), Some(3049));
    assert!(table.dirty_keys().is_empty());
}

#[test]
fn writes_go_to_record_paths() {
    let inner = Arc::new(MemoryBackend::new());
    let recording = Arc::new(RecordingBackend {
        inner: inner.clone(),
        touched: parking_lot::Mutex::new(Vec::new()),
    });
    let ctx = SessionContext::new(recording.clone());
    let table: Profiles = RemoteTable::open(&ctx, "profiles", JsonCodec::new());

    table.add("p1", profile("x", 1)).unwrap();
    table.push().unwrap();
    table.remove("p1").unwrap();
    table.push().unwrap();

    let touched = recording.touched.lock().clone();
    assert_eq!(touched, vec!["profiles/p1".to_string(), "profiles/p1".to_string()]);
    assert!(inner.get("profiles", "p1").is_none());
}

#[test]
fn disposed_table_reports_misuse() {
    let backend = Arc::new(MemoryBackend::new());
    let ctx = SessionContext::new(backend.clone());
    let table: Profiles = RemoteTable::open(&ctx, "profiles", JsonCodec::new());
    table.close();

    let err = table.apply_remote_changes().unwrap_err();
    assert!(err.is_misuse());
    assert!(matches!(err, TableError::Disposed(name) if name == "profiles"));
}
