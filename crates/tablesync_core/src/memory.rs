//! In-process backend.

use crate::backend::{
    child_path, segments, Completion, RemoteBackend, RemoteEvent, RemoteListener, SubscriptionId,
};
use crate::error::{BackendError, BackendResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

struct Subscription {
    id: SubscriptionId,
    path: String,
    listener: Arc<dyn RemoteListener>,
}

enum Request {
    Write {
        path: String,
        key: String,
        value: Vec<u8>,
        done: Completion,
    },
    Remove {
        path: String,
        done: Completion,
    },
}

type Delivery = (Arc<dyn RemoteListener>, RemoteEvent);

/// A backend that keeps every record in memory.
///
/// Records are stored by normalized path. Subscribers of a path receive
/// events for its direct children. In deferred mode requests are parked
/// until [`complete_pending`](Self::complete_pending), which models a
/// network round-trip.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<BTreeMap<String, Vec<u8>>>,
    subscriptions: Mutex<Vec<Subscription>>,
    parked: Mutex<VecDeque<Request>>,
    next_subscription: AtomicU64,
    deferred: AtomicBool,
    offline: AtomicBool,
    failing_writes: AtomicUsize,
    writes: AtomicU64,
}

fn normalize(path: &str) -> String {
    segments(path).join("/")
}

fn parent_of(path: &str) -> (&str, &str) {
    path.rsplit_once('/').unwrap_or(("", path))
}

impl MemoryBackend {
    /// Creates an empty backend that completes requests immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty backend that parks requests until completed.
    pub fn deferred() -> Self {
        let backend = Self::default();
        backend.deferred.store(true, Ordering::SeqCst);
        backend
    }

    /// Switches deferred mode on or off.
    pub fn set_deferred(&self, deferred: bool) {
        self.deferred.store(deferred, Ordering::SeqCst);
    }

    /// While offline every write and remove fails.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Makes the next `count` writes fail.
    pub fn fail_next_writes(&self, count: usize) {
        self.failing_writes.store(count, Ordering::SeqCst);
    }

    /// Number of requests waiting in deferred mode.
    pub fn pending_requests(&self) -> usize {
        self.parked.lock().len()
    }

    /// Completes every parked request, in arrival order.
    ///
    /// Returns the number of requests processed.
    pub fn complete_pending(&self) -> usize {
        let requests: Vec<Request> = self.parked.lock().drain(..).collect();
        let count = requests.len();
        for request in requests {
            self.process(request);
        }
        count
    }

    /// Number of write requests received, including failed ones.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Reads a stored record.
    pub fn get(&self, path: &str, key: &str) -> Option<Vec<u8>> {
        self.records
            .lock()
            .get(&normalize(&child_path(path, key)))
            .cloned()
    }

    /// Returns the direct children of `path`.
    pub fn children(&self, path: &str) -> BTreeMap<String, Vec<u8>> {
        let parent = normalize(path);
        self.records
            .lock()
            .iter()
            .filter_map(|(full, raw)| {
                let (p, key) = parent_of(full);
                (p == parent).then(|| (key.to_string(), raw.clone()))
            })
            .collect()
    }

    /// Stores a record as if another client wrote it.
    ///
    /// Bypasses deferral and failure injection.
    pub fn put_remote(&self, path: &str, key: &str, raw: Vec<u8>) {
        let deliveries = self.store(path, key, raw);
        Self::deliver(deliveries);
    }

    /// Removes a record or subtree as if another client deleted it.
    pub fn remove_remote(&self, path: &str) {
        let deliveries = self.erase(path);
        Self::deliver(deliveries);
    }

    /// Cancels every subscription on `path` with the given reason.
    pub fn cancel_path(&self, path: &str, message: &str) {
        let path = normalize(path);
        let cancelled: Vec<Subscription> = {
            let mut subs = self.subscriptions.lock();
            let (gone, kept): (Vec<_>, Vec<_>) = subs.drain(..).partition(|s| s.path == path);
            *subs = kept;
            gone
        };
        for sub in cancelled {
            sub.listener.on_event(RemoteEvent::Cancelled {
                message: message.to_string(),
            });
        }
    }

    fn listeners_for(&self, parent: &str) -> Vec<Arc<dyn RemoteListener>> {
        self.subscriptions
            .lock()
            .iter()
            .filter(|s| s.path == parent)
            .map(|s| Arc::clone(&s.listener))
            .collect()
    }

    fn store(&self, path: &str, key: &str, raw: Vec<u8>) -> Vec<Delivery> {
        let full = normalize(&child_path(path, key));
        let existed = self.records.lock().insert(full.clone(), raw.clone()).is_some();
        let (parent, key) = parent_of(&full);
        let event = if existed {
            RemoteEvent::ChildChanged {
                key: key.to_string(),
                raw,
            }
        } else {
            RemoteEvent::ChildAdded {
                key: key.to_string(),
                raw,
            }
        };
        self.listeners_for(parent)
            .into_iter()
            .map(|l| (l, event.clone()))
            .collect()
    }

    fn erase(&self, path: &str) -> Vec<Delivery> {
        let target = normalize(path);
        let prefix = format!("{target}/");
        let removed: Vec<String> = {
            let mut records = self.records.lock();
            let keys: Vec<String> = records
                .keys()
                .filter(|k| target.is_empty() || **k == target || k.starts_with(&prefix))
                .cloned()
                .collect();
            for key in &keys {
                records.remove(key);
            }
            keys
        };

        let mut deliveries = Vec::new();
        for full in removed {
            let (parent, key) = parent_of(&full);
            for listener in self.listeners_for(parent) {
                deliveries.push((
                    listener,
                    RemoteEvent::ChildRemoved {
                        key: key.to_string(),
                    },
                ));
            }
        }
        deliveries
    }

    fn deliver(deliveries: Vec<Delivery>) {
        for (listener, event) in deliveries {
            listener.on_event(event);
        }
    }

    fn check_online(&self, path: &str) -> BackendResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable(format!("offline, cannot reach '{path}'")));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn process(&self, request: Request) {
        match request {
            Request::Write {
                path,
                key,
                value,
                done,
            } => {
                let target = child_path(&path, &key);
                let result = self.check_online(&target).and_then(|()| {
                    if self.take_injected_failure() {
                        Err(BackendError::Unavailable(format!("injected failure for '{target}'")))
                    } else {
                        Ok(())
                    }
                });
                match result {
                    Ok(()) => {
                        let deliveries = self.store(&path, &key, value);
                        Self::deliver(deliveries);
                        done(Ok(()));
                    }
                    Err(e) => done(Err(e)),
                }
            }
            Request::Remove { path, done } => match self.check_online(&path) {
                Ok(()) => {
                    let deliveries = self.erase(&path);
                    Self::deliver(deliveries);
                    done(Ok(()));
                }
                Err(e) => done(Err(e)),
            },
        }
    }

    fn submit(&self, request: Request) {
        if self.deferred.load(Ordering::SeqCst) {
            self.parked.lock().push_back(request);
        } else {
            self.process(request);
        }
    }
}

impl RemoteBackend for MemoryBackend {
    fn subscribe(&self, path: &str, listener: Arc<dyn RemoteListener>) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1);
        let path = normalize(path);
        let existing = self.children(&path);

        self.subscriptions.lock().push(Subscription {
            id,
            path,
            listener: Arc::clone(&listener),
        });

        for (key, raw) in existing {
            listener.on_event(RemoteEvent::ChildAdded { key, raw });
        }
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.lock().retain(|s| s.id != id);
    }

    fn write(&self, path: &str, key: &str, value: Vec<u8>, done: Completion) {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.submit(Request::Write {
            path: path.to_string(),
            key: key.to_string(),
            value,
            done,
        });
    }

    fn remove(&self, path: &str, done: Completion) {
        self.submit(Request::Remove {
            path: path.to_string(),
            done,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<RemoteEvent>>,
    }

    impl RemoteListener for Recorder {
        fn on_event(&self, event: RemoteEvent) {
            self.events.lock().push(event);
        }
    }

    fn noop() -> Completion {
        Box::new(|_| {})
    }

    fn capture() -> (Arc<Mutex<Option<BackendResult<()>>>>, Completion) {
        let slot = Arc::new(Mutex::new(None));
        let inner = Arc::clone(&slot);
        (slot, Box::new(move |r| *inner.lock() = Some(r)))
    }

    #[test]
    fn subscribe_replays_existing_children() {
        let backend = MemoryBackend::new();
        backend.put_remote("scores", "a", b"1".to_vec());
        backend.put_remote("scores/a", "deep", b"x".to_vec());

        let recorder = Arc::new(Recorder::default());
        backend.subscribe("/scores/", recorder.clone());

        let events = recorder.events.lock();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key(), Some("a"));
    }

    #[test]
    fn writes_notify_subscribers() {
        let backend = MemoryBackend::new();
        let recorder = Arc::new(Recorder::default());
        backend.subscribe("scores", recorder.clone());

        backend.write("scores", "a", b"1".to_vec(), noop());
        backend.write("scores", "a", b"2".to_vec(), noop());
        backend.write("other", "b", b"3".to_vec(), noop());

        let events = recorder.events.lock();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RemoteEvent::ChildAdded { .. }));
        assert!(matches!(events[1], RemoteEvent::ChildChanged { .. }));
        assert_eq!(backend.write_count(), 3);
    }

    #[test]
    fn remove_subtree_notifies_each_child() {
        let backend = MemoryBackend::new();
        backend.put_remote("scores", "a", b"1".to_vec());
        backend.put_remote("scores", "b", b"2".to_vec());
        backend.put_remote("scoresheet", "c", b"3".to_vec());

        let recorder = Arc::new(Recorder::default());
        backend.subscribe("scores", recorder.clone());
        recorder.events.lock().clear();

        let (result, done) = capture();
        backend.remove("scores", done);

        assert_eq!(*result.lock(), Some(Ok(())));
        assert_eq!(recorder.events.lock().len(), 2);
        assert!(backend.children("scores").is_empty());
        assert_eq!(backend.children("scoresheet").len(), 1);
    }

    #[test]
    fn deferred_requests_wait_for_completion() {
        let backend = MemoryBackend::deferred();
        let (result, done) = capture();
        backend.write("scores", "a", b"1".to_vec(), done);

        assert!(result.lock().is_none());
        assert!(backend.get("scores", "a").is_none());
        assert_eq!(backend.pending_requests(), 1);

        assert_eq!(backend.complete_pending(), 1);
        assert_eq!(*result.lock(), Some(Ok(())));
        assert_eq!(backend.get("scores", "a"), Some(b"1".to_vec()));
    }

    #[test]
    fn injected_failures() {
        let backend = MemoryBackend::new();
        backend.fail_next_writes(1);

        let (first, done) = capture();
        backend.write("scores", "a", b"1".to_vec(), done);
        assert!(matches!(*first.lock(), Some(Err(BackendError::Unavailable(_)))));

        let (second, done) = capture();
        backend.write("scores", "a", b"1".to_vec(), done);
        assert_eq!(*second.lock(), Some(Ok(())));

        backend.set_offline(true);
        let (third, done) = capture();
        backend.remove("scores", done);
        assert!(matches!(*third.lock(), Some(Err(_))));
        assert!(backend.get("scores", "a").is_some());
    }

    #[test]
    fn unsubscribe_and_cancel() {
        let backend = MemoryBackend::new();
        let recorder = Arc::new(Recorder::default());
        let id = backend.subscribe("scores", recorder.clone());
        backend.subscribe("scores", recorder.clone());
        assert_eq!(backend.subscriber_count(), 2);

        backend.unsubscribe(id);
        assert_eq!(backend.subscriber_count(), 1);

        backend.cancel_path("scores", "permission denied");
        assert_eq!(backend.subscriber_count(), 0);
        assert!(matches!(
            recorder.events.lock().last(),
            Some(RemoteEvent::Cancelled { .. })
        ));
    }
}
