//! Session context shared by every table.

use crate::backend::RemoteBackend;
use crate::config::TableConfig;
use crate::keys::PushIdGenerator;
use std::fmt;
use std::sync::Arc;

/// Everything a table needs from its surroundings.
///
/// One context is created per session and handed to each table on open.
/// Cloning is cheap; clones share the backend and the key generator, so
/// keys are unique across every table of the session.
#[derive(Clone)]
pub struct SessionContext {
    backend: Arc<dyn RemoteBackend>,
    keys: Arc<PushIdGenerator>,
    config: TableConfig,
}

impl SessionContext {
    /// Creates a context over a backend with default configuration.
    pub fn new(backend: Arc<dyn RemoteBackend>) -> Self {
        Self::with_config(backend, TableConfig::default())
    }

    /// Creates a context with explicit configuration.
    pub fn with_config(backend: Arc<dyn RemoteBackend>, config: TableConfig) -> Self {
        Self {
            backend,
            keys: Arc::new(PushIdGenerator::new()),
            config,
        }
    }

    /// Returns a copy of this context using a different configuration.
    ///
    /// The backend and key generator stay shared.
    pub fn reconfigured(&self, config: TableConfig) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            keys: Arc::clone(&self.keys),
            config,
        }
    }

    /// The backend.
    pub fn backend(&self) -> &Arc<dyn RemoteBackend> {
        &self.backend
    }

    /// The session key generator.
    pub fn keys(&self) -> &PushIdGenerator {
        &self.keys
    }

    /// The table configuration.
    pub fn config(&self) -> &TableConfig {
        &self.config
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConflictPolicy;
    use crate::memory::MemoryBackend;

    #[test]
    fn clones_share_the_key_generator() {
        let ctx = SessionContext::new(Arc::new(MemoryBackend::new()));
        let other = ctx.reconfigured(TableConfig::new().with_conflict_policy(ConflictPolicy::LocalWins));

        assert!(Arc::ptr_eq(&ctx.keys, &other.keys));
        assert_eq!(other.config().conflict_policy, ConflictPolicy::LocalWins);
        assert_eq!(ctx.config().conflict_policy, ConflictPolicy::RemoteWins);
        assert_ne!(ctx.keys().next_key(), other.keys().next_key());
    }
}
