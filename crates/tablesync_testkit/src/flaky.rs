//! Fault-injecting backend.
//!
//! Wraps any backend and fails a random share of writes and removes
//! before they reach it. The random source is seeded so a failing run can
//! be replayed.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tablesync_core::{
    child_path, BackendError, Completion, RemoteBackend, RemoteListener, SubscriptionId,
};
use tracing::trace;

/// A backend that randomly fails writes and removes.
pub struct FlakyBackend {
    inner: Arc<dyn RemoteBackend>,
    fail_rate: f64,
    rng: Mutex<StdRng>,
    injected: AtomicU64,
    forwarded: AtomicU64,
}

impl FlakyBackend {
    /// Wraps `inner`, failing requests with probability `fail_rate`.
    ///
    /// The rate is clamped to `0.0..=1.0`.
    pub fn new(inner: Arc<dyn RemoteBackend>, fail_rate: f64, seed: u64) -> Self {
        Self {
            inner,
            fail_rate: fail_rate.clamp(0.0, 1.0),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
            injected: AtomicU64::new(0),
            forwarded: AtomicU64::new(0),
        }
    }

    /// Failure probability.
    pub fn fail_rate(&self) -> f64 {
        self.fail_rate
    }

    /// Requests failed by this wrapper.
    pub fn injected_failures(&self) -> u64 {
        self.injected.load(Ordering::Relaxed)
    }

    /// Requests passed through to the wrapped backend.
    pub fn forwarded(&self) -> u64 {
        self.forwarded.load(Ordering::Relaxed)
    }

    fn roll(&self, target: &str, done: Completion) -> Option<Completion> {
        let fail = self.fail_rate > 0.0 && self.rng.lock().gen_bool(self.fail_rate);
        if fail {
            self.injected.fetch_add(1, Ordering::Relaxed);
            trace!(target_path = %target, "injecting backend failure");
            done(Err(BackendError::Unavailable(format!(
                "injected failure for '{target}'"
            ))));
            None
        } else {
            self.forwarded.fetch_add(1, Ordering::Relaxed);
            Some(done)
        }
    }
}

impl RemoteBackend for FlakyBackend {
    fn subscribe(&self, path: &str, listener: Arc<dyn RemoteListener>) -> SubscriptionId {
        self.inner.subscribe(path, listener)
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.unsubscribe(id);
    }

    fn write(&self, path: &str, key: &str, value: Vec<u8>, done: Completion) {
        if let Some(done) = self.roll(&child_path(path, key), done) {
            self.inner.write(path, key, value, done);
        }
    }

    fn remove(&self, path: &str, done: Completion) {
        if let Some(done) = self.roll(path, done) {
            self.inner.remove(path, done);
        }
    }
}
