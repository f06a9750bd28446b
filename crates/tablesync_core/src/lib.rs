//! # TableSync Core
//!
//! Keyed remote-table synchronization engine.
//!
//! This crate provides:
//! - `RemoteTable`, a keyed collection mirrored from a backend path
//! - Coalescing of remote notifications into a single `ChangeSet`
//! - Dirty tracking with at-least-once push
//! - Pluggable record codecs (JSON, CBOR)
//! - A backend abstraction and an in-memory backend
//! - Session-unique, time-ordered record keys
//! - A tokio polling driver
//!
//! ## Architecture
//!
//! ```text
//! backend ──events──▶ inbox (ChangeSet) ──apply──▶ entries ◀── add/update/remove
//!    ▲                                                │
//!    └──────────────── write / remove ◀──── push ─────┘
//! ```
//!
//! ## Key Invariants
//!
//! - Remote changes become visible only on `apply_remote_changes`
//! - Within a change set the latest notification for a key wins
//! - Deletes are merged before upserts
//! - A dirty flag clears only after the backend confirms the write
//! - Completions arriving after close never touch table state

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod change_set;
mod codec;
mod config;
mod context;
mod driver;
mod entry;
mod error;
mod keys;
mod lifecycle;
mod memory;
mod table;

pub use backend::{child_path, Completion, RemoteBackend, RemoteEvent, RemoteListener, SubscriptionId};
pub use change_set::ChangeSet;
pub use codec::{CborCodec, JsonCodec, RecordCodec};
pub use config::{BackoffConfig, ConflictPolicy, DriverConfig, TableConfig};
pub use context::SessionContext;
pub use driver::{DriverHandle, DriverSummary, Pollable, TableDriver};
pub use entry::Entry;
pub use error::{BackendError, BackendResult, TableError, TableResult};
pub use keys::{PushIdGenerator, KEY_LEN};
pub use lifecycle::LivenessToken;
pub use memory::MemoryBackend;
pub use table::{ApplyReport, CycleReport, PushReport, RemoteTable, TableStats};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
