//! # TableSync Testkit
//!
//! Test utilities for TableSync.
//!
//! This crate provides:
//! - Session fixtures over the in-memory backend
//! - `FlakyBackend`, a seeded fault-injecting backend wrapper
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tablesync_testkit::prelude::*;
//!
//! #[test]
//! fn pushes_survive_failures() {
//!     let session = TestSession::flaky(0.5, 7);
//!     let table = session.json_table::<i64>("scores");
//!     table.add("a", 1).unwrap();
//!     settle(&table, 100);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod flaky;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::flaky::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use flaky::*;
pub use generators::*;
