//! Backend collaborator abstraction.
//!
//! A backend is whatever remote store a table mirrors. This trait only
//! covers the three things a table needs from it: child notifications for
//! a path, keyed writes, and removals. Writes and removals complete
//! asynchronously by invoking a [`Completion`].

use crate::error::BackendResult;
use std::fmt;
use std::sync::Arc;

/// Completion signal for an asynchronous backend request.
pub type Completion = Box<dyn FnOnce(BackendResult<()>) + Send + 'static>;

/// Handle identifying a listener registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub#{}", self.0)
    }
}

/// A child notification delivered for a subscribed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteEvent {
    /// A new child appeared.
    ChildAdded {
        /// Child key.
        key: String,
        /// Serialized payload.
        raw: Vec<u8>,
    },
    /// An existing child changed.
    ChildChanged {
        /// Child key.
        key: String,
        /// Serialized payload.
        raw: Vec<u8>,
    },
    /// A child was removed.
    ChildRemoved {
        /// Child key.
        key: String,
    },
    /// The subscription failed; no further events follow.
    Cancelled {
        /// Reason reported by the backend.
        message: String,
    },
}

impl RemoteEvent {
    /// Returns the child key, if the event concerns one.
    pub fn key(&self) -> Option<&str> {
        match self {
            RemoteEvent::ChildAdded { key, .. }
            | RemoteEvent::ChildChanged { key, .. }
            | RemoteEvent::ChildRemoved { key } => Some(key),
            RemoteEvent::Cancelled { .. } => None,
        }
    }
}

/// Receives child notifications from a backend.
///
/// Backends may call `on_event` from any thread.
pub trait RemoteListener: Send + Sync {
    /// Handles a single notification.
    fn on_event(&self, event: RemoteEvent);
}

/// A remote store that tables can mirror.
pub trait RemoteBackend: Send + Sync {
    /// Registers a listener for the children of `path`.
    ///
    /// Existing children are reported as `ChildAdded` events.
    fn subscribe(&self, path: &str, listener: Arc<dyn RemoteListener>) -> SubscriptionId;

    /// Removes a listener registration. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// Writes a serialized record under `path/key`.
    fn write(&self, path: &str, key: &str, value: Vec<u8>, done: Completion);

    /// Removes everything stored under `path`.
    fn remove(&self, path: &str, done: Completion);
}

/// Joins a table path and a record key.
pub fn child_path(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else if path.ends_with('/') {
        format!("{path}{key}")
    } else {
        format!("{path}/{key}")
    }
}

/// Splits a path into its non-empty segments.
pub fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_paths() {
        assert_eq!(child_path("", "a"), "a");
        assert_eq!(child_path("Top/Ranks/", "a"), "Top/Ranks/a");
        assert_eq!(child_path("Top/Ranks", "a"), "Top/Ranks/a");
    }

    #[test]
    fn path_segments() {
        assert_eq!(segments("/Leaderboard//Map/x/"), vec!["Leaderboard", "Map", "x"]);
        assert!(segments("").is_empty());
    }

    #[test]
    fn event_keys() {
        let added = RemoteEvent::ChildAdded {
            key: "a".into(),
            raw: vec![],
        };
        assert_eq!(added.key(), Some("a"));
        let cancelled = RemoteEvent::Cancelled {
            message: "denied".into(),
        };
        assert_eq!(cancelled.key(), None);
    }
}
