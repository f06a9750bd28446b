//! Coalescing buffer for remote notifications.

use std::collections::{HashMap, HashSet};

/// A coalesced batch of remote add/change/remove notifications.
///
/// Every notification received between two applies lands in the same
/// change set. Later notifications for a key replace earlier ones, so a
/// key is always in at most one of `upserts` and `deletes`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    upserts: HashMap<String, Vec<u8>>,
    deletes: HashSet<String>,
    read_error: Option<String>,
}

impl ChangeSet {
    /// Creates an empty change set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a remote add or change carrying a raw payload.
    pub fn upsert(&mut self, key: impl Into<String>, raw: Vec<u8>) {
        let key = key.into();
        self.deletes.remove(&key);
        self.upserts.insert(key, raw);
    }

    /// Records a remote removal.
    pub fn delete(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.upserts.remove(&key);
        self.deletes.insert(key);
    }

    /// Records that the backend cancelled or failed the subscription.
    ///
    /// Only the most recent message is kept.
    pub fn record_read_error(&mut self, message: impl Into<String>) {
        self.read_error = Some(message.into());
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty() && self.read_error.is_none()
    }

    /// Number of keys touched by this change set.
    pub fn len(&self) -> usize {
        self.upserts.len() + self.deletes.len()
    }

    /// Buffered upserts.
    pub fn upserts(&self) -> &HashMap<String, Vec<u8>> {
        &self.upserts
    }

    /// Buffered deletes.
    pub fn deletes(&self) -> &HashSet<String> {
        &self.deletes
    }

    /// Buffered read error, if any.
    pub fn read_error(&self) -> Option<&str> {
        self.read_error.as_deref()
    }

    /// Splits the change set into its parts.
    pub fn into_parts(self) -> (HashMap<String, Vec<u8>>, HashSet<String>, Option<String>) {
        (self.upserts, self.deletes, self.read_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_write_wins_within_batch() {
        let mut changes = ChangeSet::new();
        changes.upsert("c", b"1".to_vec());
        changes.upsert("c", b"2".to_vec());

        assert_eq!(changes.len(), 1);
        assert_eq!(changes.upserts()["c"], b"2".to_vec());
    }

    #[test]
    fn delete_after_upsert_is_delete() {
        let mut changes = ChangeSet::new();
        changes.upsert("a", b"1".to_vec());
        changes.delete("a");

        assert!(changes.upserts().is_empty());
        assert!(changes.deletes().contains("a"));
    }

    #[test]
    fn upsert_after_delete_is_upsert() {
        let mut changes = ChangeSet::new();
        changes.delete("a");
        changes.upsert("a", b"3".to_vec());

        assert!(changes.deletes().is_empty());
        assert_eq!(changes.upserts()["a"], b"3".to_vec());
    }

    #[test]
    fn latest_read_error_is_kept() {
        let mut changes = ChangeSet::new();
        changes.record_read_error("offline");
        changes.upsert("a", b"1".to_vec());
        changes.record_read_error("permission denied");

        let (upserts, deletes, read_error) = changes.into_parts();
        assert_eq!(upserts.len(), 1);
        assert!(deletes.is_empty());
        assert_eq!(read_error.as_deref(), Some("permission denied"));
    }

    #[test]
    fn empty_change_set() {
        let changes = ChangeSet::new();
        assert!(changes.is_empty());
        assert_eq!(changes.len(), 0);

        let mut errored = ChangeSet::new();
        errored.record_read_error("offline");
        assert!(!errored.is_empty());
        assert_eq!(errored.len(), 0);
    }
}
