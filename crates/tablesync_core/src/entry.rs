//! A single cached record.

/// One record's materialized value plus its local-modification state.
///
/// Entries are owned by their table. Callers receive clones through
/// [`RemoteTable::get`](crate::RemoteTable::get).
#[derive(Debug, Clone, PartialEq)]
pub struct Entry<T> {
    value: T,
    dirty: bool,
    revision: u64,
}

impl<T> Entry<T> {
    /// Creates an entry holding a local value that still needs a push.
    pub fn local(value: T) -> Self {
        Self {
            value,
            dirty: true,
            revision: 1,
        }
    }

    /// Creates a clean entry holding a value received from the backend.
    pub fn remote(value: T) -> Self {
        Self {
            value,
            dirty: false,
            revision: 0,
        }
    }

    /// Returns the cached value.
    pub fn value(&self) -> &T {
        &self.value
    }

    /// Consumes the entry, returning the value.
    pub fn into_value(self) -> T {
        self.value
    }

    /// Returns true if the entry holds edits the backend has not confirmed.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Revision of the last local edit.
    ///
    /// Entries stored in a table take their revisions from a per-table
    /// counter, so a revision is never reused within one table even when
    /// a key is removed and added again.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Flags the entry as locally modified.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }

    /// Resets the flag after the backend confirmed a write.
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    /// Stamps the entry with a table-issued revision.
    pub(crate) fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Edits the value locally and marks the entry dirty at `revision`.
    pub(crate) fn edit(&mut self, revision: u64, f: impl FnOnce(&mut T)) {
        f(&mut self.value);
        self.dirty = true;
        self.revision = revision;
    }

    /// Replaces the value with remote truth. Leaves the entry clean.
    pub(crate) fn overwrite(&mut self, value: T) {
        self.value = value;
        self.dirty = false;
    }
}
