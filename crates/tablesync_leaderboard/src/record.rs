//! Time records stored in the rank tables.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One finished run on a map.
///
/// Stored as a flat JSON object: `score` (milliseconds), `name`,
/// `replayPath` and `isShared`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecord {
    /// Completion time in milliseconds.
    #[serde(rename = "score")]
    pub time_ms: u64,
    /// Player display name.
    pub name: String,
    /// Storage path of the uploaded replay.
    #[serde(
        rename = "replayPath",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub replay_path: Option<String>,
    /// Whether the player agreed to share the replay.
    #[serde(rename = "isShared", default)]
    pub is_shared: bool,
}

impl TimeRecord {
    /// A record without a replay.
    pub fn new(name: impl Into<String>, time_ms: u64) -> Self {
        Self {
            time_ms,
            name: name.into(),
            replay_path: None,
            is_shared: false,
        }
    }

    /// Attaches a replay path.
    pub fn with_replay(mut self, path: impl Into<String>, shared: bool) -> Self {
        self.replay_path = Some(path.into());
        self.is_shared = shared;
        self
    }

    /// Returns true if the record points at a replay others may watch.
    pub fn has_shared_replay(&self) -> bool {
        self.is_shared && self.replay_path.is_some()
    }
}

/// Orders `(key, record)` pairs fastest first, ties broken by key.
///
/// Keys are time-ordered, so ties go to the earlier submission.
pub(crate) fn by_time(a: &(String, TimeRecord), b: &(String, TimeRecord)) -> Ordering {
    a.1.time_ms.cmp(&b.1.time_ms).then_with(|| a.0.cmp(&b.0))
}
