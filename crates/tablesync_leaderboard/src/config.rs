//! Leaderboard configuration.

/// Default number of records returned by `top_ranks`.
pub const DEFAULT_MAX_RANK_RECORDS: usize = 5;

/// Configuration for a [`Leaderboard`](crate::Leaderboard).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardConfig {
    /// Number of records `top_ranks` returns.
    pub max_rank_records: usize,
    /// Default for `submit_default`: whether replays are shared.
    pub share_replays: bool,
}

impl LeaderboardConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many records `top_ranks` returns.
    pub fn with_max_rank_records(mut self, max: usize) -> Self {
        self.max_rank_records = max;
        self
    }

    /// Sets whether replays are shared by default.
    pub fn with_share_replays(mut self, share: bool) -> Self {
        self.share_replays = share;
        self
    }
}

impl Default for LeaderboardConfig {
    fn default() -> Self {
        Self {
            max_rank_records: DEFAULT_MAX_RANK_RECORDS,
            share_replays: false,
        }
    }
}
