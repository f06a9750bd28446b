//! Replay blob storage.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tablesync_core::{BackendError, BackendResult, Completion};

/// Called once with the downloaded bytes or the failure.
pub type Download = Box<dyn FnOnce(BackendResult<Vec<u8>>) + Send>;

/// Stores replay blobs by path.
///
/// Both operations are asynchronous: the callback may run on any thread,
/// before or after the call returns.
pub trait ReplayStore: Send + Sync {
    /// Uploads `data` to `path`, replacing any existing blob.
    fn upload(&self, path: &str, data: Vec<u8>, done: Completion);

    /// Downloads the blob at `path`.
    fn download(&self, path: &str, done: Download);
}

struct Upload {
    path: String,
    data: Vec<u8>,
    done: Completion,
}

/// In-memory replay storage.
///
/// Like [`MemoryBackend`](tablesync_core::MemoryBackend), uploads can be
/// parked until [`complete_pending`](Self::complete_pending) and made to
/// fail on demand.
#[derive(Default)]
pub struct MemoryReplayStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    parked: Mutex<VecDeque<Upload>>,
    deferred: AtomicBool,
    failing_uploads: AtomicUsize,
    uploads: AtomicU64,
}

impl MemoryReplayStore {
    /// Creates an empty store that completes uploads immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store that parks uploads until completed.
    pub fn deferred() -> Self {
        let store = Self::default();
        store.deferred.store(true, Ordering::SeqCst);
        store
    }

    /// Makes the next `count` uploads fail.
    pub fn fail_next_uploads(&self, count: usize) {
        self.failing_uploads.store(count, Ordering::SeqCst);
    }

    /// Number of parked uploads.
    pub fn pending_uploads(&self) -> usize {
        self.parked.lock().len()
    }

    /// Completes every parked upload in arrival order.
    pub fn complete_pending(&self) -> usize {
        let uploads: Vec<Upload> = self.parked.lock().drain(..).collect();
        let count = uploads.len();
        for upload in uploads {
            self.finish(upload);
        }
        count
    }

    /// Upload requests received, including failed ones.
    pub fn upload_count(&self) -> u64 {
        self.uploads.load(Ordering::SeqCst)
    }

    /// Returns the blob stored at `path`.
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(path).cloned()
    }

    /// Number of stored blobs.
    pub fn len(&self) -> usize {
        self.blobs.lock().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.blobs.lock().is_empty()
    }

    fn take_failure(&self) -> bool {
        self.failing_uploads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn finish(&self, upload: Upload) {
        let result = if self.take_failure() {
            Err(BackendError::Unavailable(format!(
                "upload to '{}' failed",
                upload.path
            )))
        } else {
            self.blobs.lock().insert(upload.path, upload.data);
            Ok(())
        };
        (upload.done)(result);
    }
}

impl ReplayStore for MemoryReplayStore {
    fn upload(&self, path: &str, data: Vec<u8>, done: Completion) {
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let upload = Upload {
            path: path.to_string(),
            data,
            done,
        };
        if self.deferred.load(Ordering::SeqCst) {
            self.parked.lock().push_back(upload);
        } else {
            self.finish(upload);
        }
    }

    fn download(&self, path: &str, done: Download) {
        let result = self
            .get(path)
            .ok_or_else(|| BackendError::Rejected(format!("no replay at '{path}'")));
        done(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn capture() -> (Arc<Mutex<Option<BackendResult<()>>>>, Completion) {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        (slot, Box::new(move |r| *sink.lock() = Some(r)))
    }

    #[test]
    fn upload_then_download() {
        let store = MemoryReplayStore::new();
        let (result, done) = capture();
        store.upload("Replay/OfflineMaps/m/k", vec![1, 2, 3], done);
        assert_eq!(*result.lock(), Some(Ok(())));

        let got = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&got);
        store.download("Replay/OfflineMaps/m/k", Box::new(move |r| *sink.lock() = Some(r)));
        assert_eq!(*got.lock(), Some(Ok(vec![1, 2, 3])));
    }

    #[test]
    fn deferred_uploads_wait() {
        let store = MemoryReplayStore::deferred();
        let (result, done) = capture();
        store.upload("p", vec![9], done);
        assert!(result.lock().is_none());
        assert!(store.is_empty());

        assert_eq!(store.complete_pending(), 1);
        assert_eq!(*result.lock(), Some(Ok(())));
        assert_eq!(store.get("p"), Some(vec![9]));
    }

    #[test]
    fn injected_failures() {
        let store = MemoryReplayStore::new();
        store.fail_next_uploads(1);

        let (first, done) = capture();
        store.upload("p", vec![1], done);
        assert!(matches!(*first.lock(), Some(Err(BackendError::Unavailable(_)))));

        let (second, done) = capture();
        store.upload("p", vec![2], done);
        assert_eq!(*second.lock(), Some(Ok(())));
        assert_eq!(store.upload_count(), 2);
    }

    #[test]
    fn missing_download_is_rejected() {
        let store = MemoryReplayStore::new();
        let got = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&got);
        store.download("nope", Box::new(move |r| *sink.lock() = Some(r)));
        assert!(matches!(*got.lock(), Some(Err(BackendError::Rejected(_)))));
    }
}
