//! The keyed remote table.

use crate::backend::{child_path, RemoteBackend, RemoteEvent, RemoteListener, SubscriptionId};
use crate::change_set::ChangeSet;
use crate::codec::RecordCodec;
use crate::config::ConflictPolicy;
use crate::context::SessionContext;
use crate::entry::Entry;
use crate::error::{BackendResult, TableError, TableResult};
use crate::lifecycle::LivenessToken;
use parking_lot::Mutex;
use std::collections::hash_map::Entry as MapEntry;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

/// Counters describing what a table has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Applies that merged a non-empty change set.
    pub applies: u64,
    /// Remote records merged into the table.
    pub records_applied: u64,
    /// Remote records skipped because they failed to decode.
    pub records_rejected: u64,
    /// Remote deletes merged into the table.
    pub deletes_applied: u64,
    /// Writes handed to the backend.
    pub writes_sent: u64,
    /// Writes the backend confirmed.
    pub writes_confirmed: u64,
    /// Writes the backend failed.
    pub write_failures: u64,
    /// Local deletes the backend confirmed.
    pub deletes_confirmed: u64,
    /// Remote wipes the backend confirmed.
    pub clears: u64,
    /// Read-side failures reported by the backend.
    pub read_errors: u64,
    /// Locally modified records replaced or removed by remote changes.
    pub local_overwrites: u64,
    /// Last backend error message.
    pub last_error: Option<String>,
}

/// Outcome of [`RemoteTable::apply_remote_changes`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Records inserted or overwritten.
    pub upserted: usize,
    /// Records removed.
    pub deleted: usize,
    /// Remote changes ignored because of the conflict policy.
    pub skipped: usize,
    /// Applied changes that replaced or removed a locally modified record.
    ///
    /// Only nonzero under [`ConflictPolicy::RemoteWins`]. Includes echoes of
    /// this session's own writes that arrive before their confirmation.
    pub overwritten: usize,
    /// Non-fatal errors: undecodable records and read failures.
    pub errors: Vec<TableError>,
}

impl ApplyReport {
    /// Returns true if nothing changed and nothing failed.
    pub fn is_noop(&self) -> bool {
        self.upserted == 0 && self.deleted == 0 && self.skipped == 0 && self.errors.is_empty()
    }
}

/// Outcome of [`RemoteTable::push`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PushReport {
    /// Writes handed to the backend.
    pub writes_sent: usize,
    /// Deletes handed to the backend.
    pub deletes_sent: usize,
    /// Dirty entries and queued deletes held back by the in-flight cap.
    pub deferred: usize,
    /// Records that could not be encoded; they stay dirty.
    pub errors: Vec<TableError>,
}

/// Combined outcome of one apply-then-push cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    /// Result of the apply half.
    pub apply: ApplyReport,
    /// Result of the push half.
    pub push: PushReport,
}

impl CycleReport {
    /// Returns true if either half reported an error.
    pub fn has_errors(&self) -> bool {
        !self.apply.errors.is_empty() || !self.push.errors.is_empty()
    }
}

/// Notification sink registered with the backend.
///
/// Kept apart from the entry state so delivery never waits on an apply.
struct Inbox {
    changes: Mutex<ChangeSet>,
    pending: AtomicBool,
    liveness: LivenessToken,
}

impl RemoteListener for Inbox {
    fn on_event(&self, event: RemoteEvent) {
        if !self.liveness.is_alive() {
            return;
        }
        let mut changes = self.changes.lock();
        match event {
            RemoteEvent::ChildAdded { key, raw } | RemoteEvent::ChildChanged { key, raw } => {
                changes.upsert(key, raw)
            }
            RemoteEvent::ChildRemoved { key } => changes.delete(key),
            RemoteEvent::Cancelled { message } => changes.record_read_error(message),
        }
        self.pending.store(true, Ordering::Release);
    }
}

struct TableState<T> {
    entries: HashMap<String, Entry<T>>,
    /// Keys deleted locally and not yet sent.
    local_deletes: HashSet<String>,
    /// Writes awaiting completion, with the revision that was sent.
    in_flight: HashMap<String, u64>,
    deletes_in_flight: HashSet<String>,
    /// Last revision handed to a local edit.
    revision: u64,
    stats: TableStats,
}

impl<T> TableState<T> {
    fn new() -> Self {
        Self {
            entries: HashMap::new(),
            local_deletes: HashSet::new(),
            in_flight: HashMap::new(),
            deletes_in_flight: HashSet::new(),
            revision: 0,
            stats: TableStats::default(),
        }
    }

    fn locally_modified(&self, key: &str) -> bool {
        self.entries.get(key).is_some_and(|e| e.is_dirty())
            || self.in_flight.contains_key(key)
            || self.local_deletes.contains(key)
            || self.deletes_in_flight.contains(key)
    }

    fn next_revision(&mut self) -> u64 {
        self.revision += 1;
        self.revision
    }

    fn record_failure(&mut self, err: &TableError) {
        self.stats.last_error = Some(err.to_string());
    }
}

struct Shared<T, C> {
    name: String,
    path: String,
    /// Apply lock: guards entries and every pending buffer.
    state: Mutex<TableState<T>>,
    /// Clear lock: held while a wipe is requested or being committed.
    clearing: Mutex<bool>,
    inbox: Arc<Inbox>,
    codec: C,
    policy: ConflictPolicy,
    max_in_flight: usize,
    liveness: LivenessToken,
}

impl<T, C> Shared<T, C> {
    fn finish_write(&self, key: &str, revision: u64, result: BackendResult<()>) {
        let mut state = self.state.lock();
        if state.in_flight.get(key) == Some(&revision) {
            state.in_flight.remove(key);
        }
        match result {
            Ok(()) => {
                state.stats.writes_confirmed += 1;
                if let Some(entry) = state.entries.get_mut(key) {
                    if entry.revision() == revision {
                        entry.clear_dirty();
                    }
                }
            }
            Err(e) => {
                let err = TableError::BackendWrite {
                    key: key.to_string(),
                    message: e.to_string(),
                };
                warn!(table = %self.name, key, error = %e, "write failed, will retry");
                state.stats.write_failures += 1;
                state.record_failure(&err);
            }
        }
    }

    fn finish_delete(&self, key: &str, result: BackendResult<()>) {
        let mut state = self.state.lock();
        state.deletes_in_flight.remove(key);
        match result {
            Ok(()) => state.stats.deletes_confirmed += 1,
            Err(e) => {
                let err = TableError::BackendWrite {
                    key: key.to_string(),
                    message: e.to_string(),
                };
                warn!(table = %self.name, key, error = %e, "delete failed, will retry");
                state.stats.write_failures += 1;
                state.record_failure(&err);
                if !state.entries.contains_key(key) {
                    state.local_deletes.insert(key.to_string());
                }
            }
        }
    }

    fn finish_clear(&self, result: BackendResult<()>) {
        let mut clearing = self.clearing.lock();
        *clearing = false;
        let mut state = self.state.lock();
        match result {
            Ok(()) => {
                let dropped = state.entries.len();
                state.entries.clear();
                state.local_deletes.clear();
                state.in_flight.clear();
                state.deletes_in_flight.clear();
                *self.inbox.changes.lock() = ChangeSet::new();
                self.inbox.pending.store(false, Ordering::Release);
                state.stats.clears += 1;
                info!(table = %self.name, dropped, "table cleared");
            }
            Err(e) => {
                warn!(table = %self.name, error = %e, "clear failed");
                let err = TableError::BackendWrite {
                    key: self.path.clone(),
                    message: e.to_string(),
                };
                state.record_failure(&err);
            }
        }
    }
}

/// A keyed collection of records mirrored from a backend path.
///
/// Remote notifications are buffered as they arrive and only become
/// visible when the owner calls [`apply_remote_changes`]. Local edits
/// mark entries dirty; [`push`] sends them and clears the flag once the
/// backend confirms.
///
/// The table subscribes on [`open`] and unsubscribes on [`close`] or
/// drop. Completions that arrive after close are ignored.
///
/// [`apply_remote_changes`]: RemoteTable::apply_remote_changes
/// [`push`]: RemoteTable::push
/// [`open`]: RemoteTable::open
/// [`close`]: RemoteTable::close
pub struct RemoteTable<T, C> {
    shared: Arc<Shared<T, C>>,
    ctx: SessionContext,
    subscription: Mutex<Option<SubscriptionId>>,
}

impl<T, C> RemoteTable<T, C>
where
    T: Send + 'static,
    C: RecordCodec<T> + 'static,
{
    /// Opens a table named `name` and subscribes to its backend path.
    ///
    /// Records already stored remotely are buffered as pending changes;
    /// call [`apply_remote_changes`](Self::apply_remote_changes) to
    /// materialize them.
    pub fn open(ctx: &SessionContext, name: &str, codec: C) -> Self {
        let config = ctx.config();
        let path = config.table_path(name);
        let liveness = LivenessToken::new();
        let inbox = Arc::new(Inbox {
            changes: Mutex::new(ChangeSet::new()),
            pending: AtomicBool::new(false),
            liveness: liveness.clone(),
        });
        let shared = Arc::new(Shared {
            name: name.to_string(),
            path,
            state: Mutex::new(TableState::new()),
            clearing: Mutex::new(false),
            inbox,
            codec,
            policy: config.conflict_policy,
            max_in_flight: config.max_in_flight.max(1),
            liveness,
        });

        let table = Self {
            shared,
            ctx: ctx.clone(),
            subscription: Mutex::new(None),
        };
        table.subscribe();
        info!(table = %table.shared.name, path = %table.shared.path, "table opened");
        table
    }

    fn backend(&self) -> &Arc<dyn RemoteBackend> {
        self.ctx.backend()
    }

    fn subscribe(&self) {
        let listener: Arc<dyn RemoteListener> = self.shared.inbox.clone();
        let id = self.backend().subscribe(&self.shared.path, listener);
        if let Some(old) = self.subscription.lock().replace(id) {
            self.backend().unsubscribe(old);
        }
    }

    fn ensure_open(&self) -> TableResult<()> {
        if self.shared.liveness.is_alive() {
            Ok(())
        } else {
            Err(TableError::Disposed(self.shared.name.clone()))
        }
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Backend path the table mirrors.
    pub fn path(&self) -> &str {
        &self.shared.path
    }

    /// Returns true until the table is closed.
    pub fn is_open(&self) -> bool {
        self.shared.liveness.is_alive()
    }

    /// Adds a new local record. The entry starts dirty.
    pub fn add(&self, key: impl Into<String>, value: T) -> TableResult<()> {
        self.ensure_open()?;
        let key = key.into();
        let mut state = self.shared.state.lock();
        if state.entries.contains_key(&key) {
            return Err(TableError::DuplicateKey(key));
        }
        let revision = state.next_revision();
        state.local_deletes.remove(&key);
        state
            .entries
            .insert(key, Entry::local(value).with_revision(revision));
        Ok(())
    }

    /// Edits a record in place and marks it dirty.
    pub fn update(&self, key: &str, f: impl FnOnce(&mut T)) -> TableResult<()> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        if !state.entries.contains_key(key) {
            return Err(TableError::KeyNotFound(key.to_string()));
        }
        let revision = state.next_revision();
        if let Some(entry) = state.entries.get_mut(key) {
            entry.edit(revision, f);
        }
        Ok(())
    }

    /// Deletes a record locally and queues the remote delete.
    pub fn remove(&self, key: &str) -> TableResult<T> {
        self.ensure_open()?;
        let mut state = self.shared.state.lock();
        let entry = state
            .entries
            .remove(key)
            .ok_or_else(|| TableError::KeyNotFound(key.to_string()))?;
        state.local_deletes.insert(key.to_string());
        Ok(entry.into_value())
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Returns true if the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.shared.state.lock().entries.contains_key(key)
    }

    /// All keys, in no particular order.
    pub fn keys(&self) -> Vec<String> {
        self.shared.state.lock().entries.keys().cloned().collect()
    }

    /// Keys with unconfirmed local edits.
    pub fn dirty_keys(&self) -> Vec<String> {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .filter(|(_, e)| e.is_dirty())
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Returns true if remote notifications are waiting to be applied.
    pub fn changes_pending(&self) -> bool {
        self.shared.inbox.pending.load(Ordering::Acquire)
    }

    /// Number of writes and deletes awaiting a completion signal.
    pub fn pending_writes(&self) -> usize {
        let state = self.shared.state.lock();
        state.in_flight.len() + state.deletes_in_flight.len()
    }

    /// Returns true while a remote wipe has been requested but not confirmed.
    pub fn is_clearing(&self) -> bool {
        *self.shared.clearing.lock()
    }

    /// Snapshot of the table counters.
    pub fn stats(&self) -> TableStats {
        self.shared.state.lock().stats.clone()
    }

    /// Merges the buffered change set into the table.
    ///
    /// Deletes are applied before upserts. Every upsert is decoded before
    /// anything is mutated; records that fail to decode are skipped and
    /// reported. A no-op when nothing is pending.
    pub fn apply_remote_changes(&self) -> TableResult<ApplyReport> {
        self.ensure_open()?;
        let mut report = ApplyReport::default();

        let resubscribe = {
            let mut state = self.shared.state.lock();
            let changes = {
                let mut inbox = self.shared.inbox.changes.lock();
                if !self.shared.inbox.pending.swap(false, Ordering::AcqRel) {
                    return Ok(report);
                }
                std::mem::take(&mut *inbox)
            };
            let (upserts, deletes, read_error) = changes.into_parts();

            let mut decoded = Vec::with_capacity(upserts.len());
            for (key, raw) in upserts {
                match self.shared.codec.decode(&raw) {
                    Ok(value) => decoded.push((key, value)),
                    Err(e) => {
                        let err = TableError::decoding(&key, e);
                        warn!(table = %self.shared.name, error = %err, "skipping undecodable record");
                        state.stats.records_rejected += 1;
                        report.errors.push(err);
                    }
                }
            }

            let policy = self.shared.policy;
            for key in deletes {
                let modified = state.locally_modified(&key);
                if !policy.accepts_remote(modified) {
                    report.skipped += 1;
                    continue;
                }
                if modified {
                    debug!(table = %self.shared.name, key, "remote delete replaced local changes");
                    report.overwritten += 1;
                }
                state.local_deletes.remove(&key);
                if state.entries.remove(&key).is_some() {
                    report.deleted += 1;
                }
            }

            for (key, value) in decoded {
                let modified = state.locally_modified(&key);
                if !policy.accepts_remote(modified) {
                    report.skipped += 1;
                    continue;
                }
                if modified {
                    debug!(table = %self.shared.name, key, "remote record replaced local changes");
                    report.overwritten += 1;
                }
                state.local_deletes.remove(&key);
                match state.entries.entry(key) {
                    MapEntry::Occupied(mut slot) => slot.get_mut().overwrite(value),
                    MapEntry::Vacant(slot) => {
                        slot.insert(Entry::remote(value));
                    }
                }
                report.upserted += 1;
            }

            state.stats.applies += 1;
            state.stats.records_applied += report.upserted as u64;
            state.stats.deletes_applied += report.deleted as u64;
            state.stats.local_overwrites += report.overwritten as u64;
            if report.overwritten > 0 {
                warn!(
                    table = %self.shared.name,
                    overwritten = report.overwritten,
                    "remote changes overwrote unconfirmed local edits"
                );
            }

            match read_error {
                Some(message) => {
                    warn!(table = %self.shared.name, %message, "subscription failed, resubscribing");
                    let err = TableError::BackendRead(message);
                    state.stats.read_errors += 1;
                    state.record_failure(&err);
                    report.errors.push(err);
                    true
                }
                None => false,
            }
        };

        if resubscribe {
            self.subscribe();
        }

        debug!(
            table = %self.shared.name,
            upserted = report.upserted,
            deleted = report.deleted,
            skipped = report.skipped,
            "applied remote changes"
        );
        Ok(report)
    }

    /// Drops buffered remote changes without applying them.
    pub fn discard_remote_changes(&self) {
        let mut inbox = self.shared.inbox.changes.lock();
        *inbox = ChangeSet::new();
        self.shared.inbox.pending.store(false, Ordering::Release);
    }

    /// Sends every dirty record and queued delete to the backend.
    ///
    /// At most `max_in_flight` writes and deletes are outstanding at once;
    /// deletes are sent first and the rest wait for a later push.
    ///
    /// Returns without waiting for the backend. A record's dirty flag is
    /// cleared only when its write is confirmed and it was not edited in
    /// the meantime; failed writes leave it dirty for the next push.
    pub fn push(&self) -> TableResult<PushReport> {
        self.ensure_open()?;
        let mut report = PushReport::default();

        let (writes, deletes) = {
            let mut state = self.shared.state.lock();
            let busy = state.in_flight.len() + state.deletes_in_flight.len();
            let mut budget = self.shared.max_in_flight.saturating_sub(busy);

            let queued: Vec<String> = state.local_deletes.iter().cloned().collect();
            let mut deletes = Vec::new();
            for key in queued {
                if budget == 0 {
                    report.deferred += 1;
                    continue;
                }
                state.local_deletes.remove(&key);
                state.deletes_in_flight.insert(key.clone());
                deletes.push(key);
                budget -= 1;
            }

            let candidates: Vec<(String, u64)> = state
                .entries
                .iter()
                .filter(|(k, e)| e.is_dirty() && !state.in_flight.contains_key(*k))
                .map(|(k, e)| (k.clone(), e.revision()))
                .collect();

            let mut writes = Vec::new();
            for (key, revision) in candidates {
                if budget == 0 {
                    report.deferred += 1;
                    continue;
                }
                let encoded = state
                    .entries
                    .get(&key)
                    .map(|e| self.shared.codec.encode(e.value()));
                match encoded {
                    Some(Ok(bytes)) => {
                        state.in_flight.insert(key.clone(), revision);
                        writes.push((key, revision, bytes));
                        budget -= 1;
                    }
                    Some(Err(e)) => {
                        let err = TableError::encoding(&key, e);
                        warn!(table = %self.shared.name, error = %err, "cannot encode record");
                        report.errors.push(err);
                    }
                    None => {}
                }
            }
            state.stats.writes_sent += writes.len() as u64;
            (writes, deletes)
        };

        report.writes_sent = writes.len();
        report.deletes_sent = deletes.len();

        // Completions may run inline, so the state lock must be released here.
        for key in deletes {
            let weak = Arc::downgrade(&self.shared);
            let liveness = self.shared.liveness.clone();
            let target = child_path(&self.shared.path, &key);
            self.backend().remove(
                &target,
                Box::new(move |result| {
                    if let Some(shared) = live(&weak, &liveness) {
                        shared.finish_delete(&key, result);
                    }
                }),
            );
        }

        for (key, revision, bytes) in writes {
            let weak = Arc::downgrade(&self.shared);
            let liveness = self.shared.liveness.clone();
            let target_key = key.clone();
            self.backend().write(
                &self.shared.path,
                &target_key,
                bytes,
                Box::new(move |result| {
                    if let Some(shared) = live(&weak, &liveness) {
                        shared.finish_write(&key, revision, result);
                    }
                }),
            );
        }

        if report.writes_sent + report.deletes_sent > 0 {
            debug!(
                table = %self.shared.name,
                writes = report.writes_sent,
                deletes = report.deletes_sent,
                deferred = report.deferred,
                "pushed local changes"
            );
        }
        Ok(report)
    }

    /// Requests a remote wipe of the table path.
    ///
    /// Local entries are emptied once the backend confirms. A second call
    /// while a wipe is outstanding does nothing.
    pub fn clear(&self) -> TableResult<()> {
        self.ensure_open()?;
        {
            let mut clearing = self.shared.clearing.lock();
            if *clearing {
                return Ok(());
            }
            *clearing = true;
        }

        let weak = Arc::downgrade(&self.shared);
        let liveness = self.shared.liveness.clone();
        self.backend().remove(
            &self.shared.path,
            Box::new(move |result| {
                if let Some(shared) = live(&weak, &liveness) {
                    shared.finish_clear(result);
                }
            }),
        );
        Ok(())
    }

    /// Returns a key that no record of this table uses and that the
    /// session has never issued before.
    pub fn unique_key(&self) -> String {
        loop {
            let key = self.ctx.keys().next_key();
            if !self.shared.state.lock().entries.contains_key(&key) {
                return key;
            }
        }
    }

    /// Applies remote changes, then pushes local ones.
    pub fn poll_cycle(&self) -> TableResult<CycleReport> {
        let apply = self.apply_remote_changes()?;
        let push = self.push()?;
        Ok(CycleReport { apply, push })
    }

    /// Unsubscribes and disables the table.
    ///
    /// Entries stay readable. Mutating calls return
    /// [`TableError::Disposed`].
    pub fn close(&self) {
        if !self.shared.liveness.kill() {
            return;
        }
        if let Some(id) = self.subscription.lock().take() {
            self.backend().unsubscribe(id);
        }
        self.discard_remote_changes();
        info!(table = %self.shared.name, "table closed");
    }
}

impl<T, C> RemoteTable<T, C>
where
    T: Clone + Send + 'static,
    C: RecordCodec<T> + 'static,
{
    /// Returns a copy of the entry stored under `key`.
    pub fn get(&self, key: &str) -> Option<Entry<T>> {
        self.shared.state.lock().entries.get(key).cloned()
    }

    /// Returns a copy of the value stored under `key`.
    pub fn value(&self, key: &str) -> Option<T> {
        self.shared
            .state
            .lock()
            .entries
            .get(key)
            .map(|e| e.value().clone())
    }

    /// Copies every value out of the table.
    pub fn snapshot(&self) -> HashMap<String, T> {
        self.shared
            .state
            .lock()
            .entries
            .iter()
            .map(|(k, e)| (k.clone(), e.value().clone()))
            .collect()
    }
}

impl<T, C> Drop for RemoteTable<T, C> {
    fn drop(&mut self) {
        if self.shared.liveness.kill() {
            if let Some(id) = self.subscription.lock().take() {
                self.ctx.backend().unsubscribe(id);
            }
        }
    }
}

fn live<T, C>(weak: &Weak<Shared<T, C>>, liveness: &LivenessToken) -> Option<Arc<Shared<T, C>>> {
    if !liveness.is_alive() {
        return None;
    }
    weak.upgrade()
}
