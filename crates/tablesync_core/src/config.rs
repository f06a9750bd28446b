//! Configuration for remote tables and the polling driver.

use rand::Rng;
use std::time::Duration;

/// How a remote upsert or delete treats a key with unpushed local edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Remote values overwrite local edits and the entry becomes clean.
    #[default]
    RemoteWins,
    /// Dirty or in-flight entries ignore remote changes until pushed.
    LocalWins,
}

impl ConflictPolicy {
    /// Returns true if a remote change may replace an entry in this state.
    pub fn accepts_remote(&self, locally_modified: bool) -> bool {
        match self {
            ConflictPolicy::RemoteWins => true,
            ConflictPolicy::LocalWins => !locally_modified,
        }
    }
}

/// Configuration shared by every table opened from a session.
#[derive(Debug, Clone)]
pub struct TableConfig {
    /// Path prefix prepended to every table name.
    pub root: String,
    /// Conflict policy applied during merges.
    pub conflict_policy: ConflictPolicy,
    /// Maximum number of writes a single table keeps in flight.
    pub max_in_flight: usize,
}

impl TableConfig {
    /// Creates a configuration with defaults.
    pub fn new() -> Self {
        Self {
            root: String::new(),
            conflict_policy: ConflictPolicy::RemoteWins,
            max_in_flight: 64,
        }
    }

    /// Sets the root path prefix.
    pub fn with_root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    /// Sets the conflict policy.
    pub fn with_conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Sets the in-flight write cap.
    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    /// Resolves the full backend path for a table name.
    pub fn table_path(&self, name: &str) -> String {
        if self.root.is_empty() {
            name.to_string()
        } else if self.root.ends_with('/') {
            format!("{}{}", self.root, name)
        } else {
            format!("{}/{}", self.root, name)
        }
    }
}

impl Default for TableConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for the periodic polling driver.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Interval between poll cycles.
    pub poll_interval: Duration,
    /// Pause inserted after cycles that reported failures.
    pub backoff: BackoffConfig,
}

impl DriverConfig {
    /// Creates a driver configuration with the given poll interval.
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            backoff: BackoffConfig::default(),
        }
    }

    /// Sets the backoff schedule.
    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(100))
    }
}

/// Exponential pause schedule for a driver whose cycles keep failing.
///
/// The driver never gives up on a table; the pause grows from `base` by
/// `factor` per consecutive failing cycle until it reaches `ceiling`.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Pause after the first failing cycle.
    pub base: Duration,
    /// Longest pause.
    pub ceiling: Duration,
    /// Growth per additional failing cycle.
    pub factor: f64,
    /// Draw each pause uniformly from the upper half of its range.
    pub jitter: bool,
}

impl BackoffConfig {
    /// Creates a doubling schedule between `base` and `ceiling`, with jitter.
    pub fn new(base: Duration, ceiling: Duration) -> Self {
        Self {
            base,
            ceiling: ceiling.max(base),
            factor: 2.0,
            jitter: true,
        }
    }

    /// A schedule that never pauses.
    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Sets the growth factor. Values below 1 are treated as 1.
    pub fn with_factor(mut self, factor: f64) -> Self {
        self.factor = factor.max(1.0);
        self
    }

    /// Enables or disables jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Pause before the next cycle after `failures` consecutive failing cycles.
    pub fn delay_after(&self, failures: u32) -> Duration {
        if failures == 0 || self.base.is_zero() {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(failures - 1).unwrap_or(i32::MAX);
        let full = (self.base.as_secs_f64() * self.factor.powi(exponent))
            .min(self.ceiling.as_secs_f64());

        if self.jitter {
            let half = full / 2.0;
            Duration::from_secs_f64(half + rand::thread_rng().gen_range(0.0..=half))
        } else {
            Duration::from_secs_f64(full)
        }
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self::new(Duration::from_millis(100), Duration::from_secs(30))
    }
}
