//! Backend and storage paths for a level map.
//!
//! Every map owns one base path. Published maps use the path they were
//! saved under; maps that were never published live under
//! `OfflineMaps/{map_id}/`. The same base is shared by the database
//! (rank and shared-replay tables) and by replay storage.

const LEADERBOARD_ROOT: &str = "Leaderboard/Map/";
const REPLAY_ROOT: &str = "Replay/";
const RANKS_SUFFIX: &str = "Top/Ranks/";
const SHARED_REPLAYS_SUFFIX: &str = "Top/SharedReplays/";

/// A playable level.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LevelMap {
    /// Map identifier.
    pub map_id: String,
    /// Database path the map was published under, if any.
    pub database_path: Option<String>,
}

impl LevelMap {
    /// A map that was never published.
    pub fn offline(map_id: impl Into<String>) -> Self {
        Self {
            map_id: map_id.into(),
            database_path: None,
        }
    }

    /// A map published under `database_path`.
    pub fn published(map_id: impl Into<String>, database_path: impl Into<String>) -> Self {
        Self {
            map_id: map_id.into(),
            database_path: Some(database_path.into()),
        }
    }

    /// Base path shared by the database and replay storage.
    ///
    /// Always ends in `/`. An empty database path counts as unpublished.
    pub fn base_path(&self) -> String {
        match self.database_path.as_deref() {
            Some(path) if !path.is_empty() => format!("{path}/"),
            _ => format!("OfflineMaps/{}/", self.map_id),
        }
    }

    /// Path of the top-ranks table.
    pub fn rank_path(&self) -> String {
        format!("{LEADERBOARD_ROOT}{}{RANKS_SUFFIX}", self.base_path())
    }

    /// Path of the shared-replays table.
    pub fn shared_replay_path(&self) -> String {
        format!("{LEADERBOARD_ROOT}{}{SHARED_REPLAYS_SUFFIX}", self.base_path())
    }

    /// Storage path of the replay uploaded with record `record_key`.
    pub fn replay_path(&self, record_key: &str) -> String {
        format!("{REPLAY_ROOT}{}{record_key}", self.base_path())
    }
}
