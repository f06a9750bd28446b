//! Per-map leaderboard.

use crate::config::LeaderboardConfig;
use crate::error::{LeaderboardError, LeaderboardResult};
use crate::paths::LevelMap;
use crate::record::{by_time, TimeRecord};
use crate::replay::{Download, ReplayStore};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tablesync_core::{CycleReport, JsonCodec, Pollable, RemoteTable, SessionContext, TableError};
use tracing::{debug, info, warn};

/// Table of time records keyed by push ID.
pub type RecordTable = RemoteTable<TimeRecord, JsonCodec<TimeRecord>>;

/// Result of one [`Leaderboard::poll`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollReport {
    /// Cycle on the ranks table.
    pub ranks: CycleReport,
    /// Cycle on the shared-replays table.
    pub shared: CycleReport,
}

impl PollReport {
    /// Returns true if either table reported an error.
    pub fn has_errors(&self) -> bool {
        self.ranks.has_errors() || self.shared.has_errors()
    }
}

struct Tables {
    map: LevelMap,
    ranks: Arc<RecordTable>,
    shared: Arc<RecordTable>,
    uploads_pending: AtomicUsize,
    upload_failures: AtomicU64,
}

impl Tables {
    fn insert(&self, key: &str, record: TimeRecord) -> Result<(), TableError> {
        if record.has_shared_replay() {
            self.shared.add(key, record.clone())?;
        }
        self.ranks.add(key, record)
    }

    fn finish_upload(&self, key: &str, record: TimeRecord) {
        if let Err(e) = self.insert(key, record) {
            warn!(map = %self.map.map_id, key, error = %e, "dropping time record");
        }
        self.uploads_pending.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Top times and shared replays for one map.
///
/// Wraps two remote tables under the map's base path: every submitted
/// time goes to the ranks table, and times whose replay is shared also
/// go to the shared-replays table under the same key.
pub struct Leaderboard {
    tables: Arc<Tables>,
    store: Arc<dyn ReplayStore>,
    config: LeaderboardConfig,
}

impl Leaderboard {
    /// Opens the rank and shared-replay tables of `map`.
    pub fn open(
        ctx: &SessionContext,
        map: LevelMap,
        store: Arc<dyn ReplayStore>,
        config: LeaderboardConfig,
    ) -> Self {
        let ranks = RemoteTable::open(ctx, map.rank_path().trim_end_matches('/'), JsonCodec::flat());
        let shared = RemoteTable::open(
            ctx,
            map.shared_replay_path().trim_end_matches('/'),
            JsonCodec::flat(),
        );
        info!(map = %map.map_id, base = %map.base_path(), "leaderboard opened");
        Self {
            tables: Arc::new(Tables {
                map,
                ranks: Arc::new(ranks),
                shared: Arc::new(shared),
                uploads_pending: AtomicUsize::new(0),
                upload_failures: AtomicU64::new(0),
            }),
            store,
            config,
        }
    }

    /// The map this leaderboard belongs to.
    pub fn map(&self) -> &LevelMap {
        &self.tables.map
    }

    /// Leaderboard configuration.
    pub fn config(&self) -> &LeaderboardConfig {
        &self.config
    }

    /// The ranks table.
    pub fn ranks(&self) -> &Arc<RecordTable> {
        &self.tables.ranks
    }

    /// The shared-replays table.
    pub fn shared_replays(&self) -> &Arc<RecordTable> {
        &self.tables.shared
    }

    /// Both tables, for handing to a [`TableDriver`](tablesync_core::TableDriver).
    pub fn pollables(&self) -> Vec<Arc<dyn Pollable>> {
        vec![
            Arc::clone(&self.tables.ranks) as Arc<dyn Pollable>,
            Arc::clone(&self.tables.shared) as Arc<dyn Pollable>,
        ]
    }

    fn ensure_open(&self) -> LeaderboardResult<()> {
        if self.tables.ranks.is_open() && self.tables.shared.is_open() {
            Ok(())
        } else {
            Err(LeaderboardError::Closed(self.tables.map.map_id.clone()))
        }
    }

    /// Submits a finished run and returns its record key.
    ///
    /// Without a replay the record is added right away. With one, the
    /// replay is uploaded first and the record is added once the upload
    /// completes; if the upload fails the time is still recorded, without
    /// a replay and unshared. Records reach the backend on the next
    /// [`poll`](Self::poll).
    pub fn submit(
        &self,
        name: &str,
        time_ms: u64,
        replay: Option<Vec<u8>>,
        share: bool,
    ) -> LeaderboardResult<String> {
        self.ensure_open()?;
        let key = self.tables.ranks.unique_key();
        let record = TimeRecord::new(name, time_ms);

        let Some(data) = replay else {
            self.tables.insert(&key, record)?;
            debug!(map = %self.tables.map.map_id, key = %key, time_ms, "time recorded");
            return Ok(key);
        };

        let path = self.tables.map.replay_path(&key);
        self.tables.uploads_pending.fetch_add(1, Ordering::AcqRel);
        let tables = Arc::downgrade(&self.tables);
        let record_key = key.clone();
        let replay_path = path.clone();
        debug!(map = %self.tables.map.map_id, key = %key, bytes = data.len(), "uploading replay");

        self.store.upload(
            &path,
            data,
            Box::new(move |result| {
                let Some(tables) = tables.upgrade() else {
                    debug!(key = %record_key, "replay upload finished after leaderboard dropped");
                    return;
                };
                let record = match result {
                    Ok(()) => record.with_replay(replay_path, share),
                    Err(e) => {
                        tables.upload_failures.fetch_add(1, Ordering::Relaxed);
                        warn!(key = %record_key, error = %e, "replay upload failed, keeping time only");
                        record
                    }
                };
                tables.finish_upload(&record_key, record);
            }),
        );
        Ok(key)
    }

    /// Submits a run using the configured sharing default.
    pub fn submit_default(
        &self,
        name: &str,
        time_ms: u64,
        replay: Option<Vec<u8>>,
    ) -> LeaderboardResult<String> {
        self.submit(name, time_ms, replay, self.config.share_replays)
    }

    /// The fastest records, at most `max_rank_records`.
    pub fn top_ranks(&self) -> Vec<(String, TimeRecord)> {
        let mut rows: Vec<_> = self.tables.ranks.snapshot().into_iter().collect();
        rows.sort_by(by_time);
        rows.truncate(self.config.max_rank_records);
        rows
    }

    /// Replay path of the fastest shared record, if any.
    pub fn best_shared_replay_path(&self) -> Option<String> {
        self.tables
            .shared
            .snapshot()
            .into_iter()
            .filter(|(_, record)| record.has_shared_replay())
            .min_by(by_time)
            .and_then(|(_, record)| record.replay_path)
    }

    /// Downloads the replay stored at `path`.
    pub fn fetch_replay(&self, path: &str, done: Download) {
        self.store.download(path, done);
    }

    /// Applies remote changes and pushes local ones on both tables.
    pub fn poll(&self) -> LeaderboardResult<PollReport> {
        self.ensure_open()?;
        Ok(PollReport {
            ranks: self.tables.ranks.poll_cycle()?,
            shared: self.tables.shared.poll_cycle()?,
        })
    }

    /// Uploads that have not completed yet.
    pub fn pending_uploads(&self) -> usize {
        self.tables.uploads_pending.load(Ordering::Acquire)
    }

    /// Uploads that failed so far.
    pub fn upload_failures(&self) -> u64 {
        self.tables.upload_failures.load(Ordering::Relaxed)
    }

    /// Returns true once every submission is confirmed by the backend
    /// and no remote change is waiting to be applied.
    pub fn is_settled(&self) -> bool {
        self.pending_uploads() == 0
            && [&self.tables.ranks, &self.tables.shared].iter().all(|t| {
                t.dirty_keys().is_empty() && t.pending_writes() == 0 && !t.changes_pending()
            })
    }

    /// Closes both tables.
    pub fn close(&self) {
        self.tables.ranks.close();
        self.tables.shared.close();
        info!(map = %self.tables.map.map_id, "leaderboard closed");
    }
}
