//! Liveness tracking for tables with outstanding callbacks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag telling late callbacks whether their table is still open.
///
/// Every completion a table hands to the backend carries a clone. Once
/// the table is closed the token is dead and callbacks must not touch
/// table state.
#[derive(Debug, Clone)]
pub struct LivenessToken(Arc<AtomicBool>);

impl LivenessToken {
    /// Creates a live token.
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    /// Returns true while the owner is open.
    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Marks the owner as closed. Returns true if it was alive before.
    pub fn kill(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl Default for LivenessToken {
    fn default() -> Self {
        Self::new()
    }
}
