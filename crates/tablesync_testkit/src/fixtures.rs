//! Session fixtures and table helpers.

use crate::flaky::FlakyBackend;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tablesync_core::{
    JsonCodec, MemoryBackend, RecordCodec, RemoteBackend, RemoteTable, SessionContext, TableConfig,
};

/// A JSON-encoded table used throughout the tests.
pub type JsonTable<T> = RemoteTable<T, JsonCodec<T>>;

/// A session over a fresh in-memory backend.
pub struct TestSession {
    /// The in-memory store every request ends up in.
    pub memory: Arc<MemoryBackend>,
    /// Fault injector, when the session was built with one.
    pub flaky: Option<Arc<FlakyBackend>>,
    /// Context handed to tables.
    pub ctx: SessionContext,
}

impl TestSession {
    /// A session whose backend completes requests immediately.
    pub fn memory() -> Self {
        Self::over(Arc::new(MemoryBackend::new()))
    }

    /// A session whose backend parks requests until completed.
    pub fn deferred() -> Self {
        Self::over(Arc::new(MemoryBackend::deferred()))
    }

    /// A session on an existing in-memory backend.
    pub fn over(memory: Arc<MemoryBackend>) -> Self {
        let ctx = SessionContext::new(memory.clone());
        Self {
            memory,
            flaky: None,
            ctx,
        }
    }

    /// A session that fails writes with probability `fail_rate`.
    pub fn flaky(fail_rate: f64, seed: u64) -> Self {
        let memory = Arc::new(MemoryBackend::new());
        let flaky = Arc::new(FlakyBackend::new(memory.clone(), fail_rate, seed));
        let backend: Arc<dyn RemoteBackend> = flaky.clone();
        Self {
            memory,
            flaky: Some(flaky),
            ctx: SessionContext::new(backend),
        }
    }

    /// Applies `config` to tables opened from now on.
    pub fn with_config(mut self, config: TableConfig) -> Self {
        self.ctx = self.ctx.reconfigured(config);
        self
    }

    /// Opens a JSON table.
    pub fn json_table<T>(&self, name: &str) -> JsonTable<T>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        RemoteTable::open(&self.ctx, name, JsonCodec::new())
    }

    /// Another session on the same backend, with its own key generator.
    pub fn peer(&self) -> Self {
        Self::over(self.memory.clone())
    }
}

/// Polls `table` until it has nothing left to send or apply.
///
/// Panics after `max_cycles` cycles.
pub fn settle<T, C>(table: &RemoteTable<T, C>, max_cycles: usize)
where
    T: Send + 'static,
    C: RecordCodec<T> + 'static,
{
    for _ in 0..max_cycles {
        table.poll_cycle().expect("poll cycle failed");
        if table.dirty_keys().is_empty() && table.pending_writes() == 0 && !table.changes_pending()
        {
            return;
        }
    }
    panic!("table '{}' did not settle in {max_cycles} cycles", table.name());
}
