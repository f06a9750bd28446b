//! Periodic polling driver.
//!
//! Tables never poll themselves. An application either calls
//! [`RemoteTable::poll_cycle`] from its own frame loop or hands its tables
//! to a [`TableDriver`], which runs apply-then-push on a tokio interval and
//! backs off while the backend keeps failing.

use crate::codec::RecordCodec;
use crate::config::DriverConfig;
use crate::error::{TableError, TableResult};
use crate::table::{CycleReport, RemoteTable};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Something the driver can poll.
pub trait Pollable: Send + Sync {
    /// Name used in logs.
    fn label(&self) -> &str;

    /// Runs one apply-then-push cycle.
    fn poll_cycle(&self) -> TableResult<CycleReport>;

    /// Running count of backend failures observed so far.
    fn failures(&self) -> u64;
}

impl<T, C> Pollable for RemoteTable<T, C>
where
    T: Send + 'static,
    C: RecordCodec<T> + 'static,
{
    fn label(&self) -> &str {
        self.name()
    }

    fn poll_cycle(&self) -> TableResult<CycleReport> {
        RemoteTable::poll_cycle(self)
    }

    fn failures(&self) -> u64 {
        let stats = self.stats();
        stats.write_failures + stats.read_errors
    }
}

/// Totals reported when a driver stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriverSummary {
    /// Cycles run.
    pub cycles: u64,
    /// Cycles that observed at least one failure.
    pub failed_cycles: u64,
}

/// Polls a set of tables on a fixed interval.
pub struct TableDriver {
    config: DriverConfig,
    tables: Vec<Arc<dyn Pollable>>,
    seen_failures: Vec<u64>,
}

impl TableDriver {
    /// Creates a driver with no tables.
    pub fn new(config: DriverConfig) -> Self {
        Self {
            config,
            tables: Vec::new(),
            seen_failures: Vec::new(),
        }
    }

    /// Adds a table.
    pub fn with_table(mut self, table: Arc<dyn Pollable>) -> Self {
        self.seen_failures.push(table.failures());
        self.tables.push(table);
        self
    }

    /// Number of tables still being polled.
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// Polls every table once.
    ///
    /// Closed tables are dropped from the driver. Returns true if any
    /// table reported a new failure since the previous cycle.
    pub fn run_cycle(&mut self) -> bool {
        let mut failed = false;
        let mut index = 0;
        while index < self.tables.len() {
            let table = &self.tables[index];
            match table.poll_cycle() {
                Ok(report) => {
                    failed |= report.has_errors();
                }
                Err(TableError::Disposed(name)) => {
                    info!(table = %name, "table closed, no longer polled");
                    self.tables.remove(index);
                    self.seen_failures.remove(index);
                    continue;
                }
                Err(e) => {
                    warn!(table = %table.label(), error = %e, "poll cycle failed");
                    failed = true;
                }
            }

            let failures = table.failures();
            if failures > self.seen_failures[index] {
                failed = true;
            }
            self.seen_failures[index] = failures;
            index += 1;
        }
        failed
    }

    /// Spawns the polling loop on the current tokio runtime.
    ///
    /// The loop stops when [`DriverHandle::shutdown`] is called or the
    /// handle is dropped.
    pub fn spawn(mut self) -> DriverHandle {
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let cycles = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&cycles);

        let join = tokio::spawn(async move {
            let mut summary = DriverSummary::default();
            let mut interval = tokio::time::interval(self.config.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut consecutive_failures = 0u32;

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = interval.tick() => {}
                }
                if self.tables.is_empty() {
                    break;
                }

                let failed = self.run_cycle();
                summary.cycles += 1;
                counter.store(summary.cycles, Ordering::Release);

                if !failed {
                    consecutive_failures = 0;
                    continue;
                }

                summary.failed_cycles += 1;
                consecutive_failures = consecutive_failures.saturating_add(1);
                let delay = self.config.backoff.delay_after(consecutive_failures);
                debug!(?delay, consecutive_failures, "backing off after failed cycle");
                if !delay.is_zero() {
                    tokio::select! {
                        _ = &mut stop_rx => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
            summary
        });

        DriverHandle {
            stop: Some(stop_tx),
            join,
            cycles,
        }
    }
}

/// Handle to a spawned driver.
pub struct DriverHandle {
    stop: Option<oneshot::Sender<()>>,
    join: JoinHandle<DriverSummary>,
    cycles: Arc<AtomicU64>,
}

impl DriverHandle {
    /// Cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.cycles.load(Ordering::Acquire)
    }

    /// Returns true once the polling loop has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Stops the loop and waits for it to exit.
    pub async fn shutdown(mut self) -> DriverSummary {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        match (&mut self.join).await {
            Ok(summary) => summary,
            Err(e) => {
                warn!(error = %e, "driver task ended abnormally");
                DriverSummary::default()
            }
        }
    }
}
