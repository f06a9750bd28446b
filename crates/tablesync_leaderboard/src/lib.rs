//! # TableSync Leaderboard
//!
//! Per-map time leaderboards built on remote tables.
//!
//! This crate provides:
//! - `LevelMap` and the database and storage paths derived from it
//! - `TimeRecord`, the flat record stored per finished run
//! - `Leaderboard`, which keeps the top-ranks and shared-replays tables
//! - `ReplayStore` and an in-memory implementation
//!
//! ## Layout
//!
//! ```text
//! Leaderboard/Map/{base}Top/Ranks/{key}          every submitted time
//! Leaderboard/Map/{base}Top/SharedReplays/{key}  times with a shared replay
//! Replay/{base}{key}                              replay blob
//! ```
//!
//! `{base}` is the map's database path, or `OfflineMaps/{map_id}/` for
//! maps that were never published.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod board;
mod config;
mod error;
mod paths;
mod record;
mod replay;

pub use board::{Leaderboard, PollReport, RecordTable};
pub use config::{LeaderboardConfig, DEFAULT_MAX_RANK_RECORDS};
pub use error::{LeaderboardError, LeaderboardResult};
pub use paths::LevelMap;
pub use record::TimeRecord;
pub use replay::{Download, MemoryReplayStore, ReplayStore};
