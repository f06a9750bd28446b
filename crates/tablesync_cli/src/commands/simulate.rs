//! Simulate command implementation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::sync::Arc;
use tablesync_core::{MemoryBackend, SessionContext};
use tablesync_leaderboard::{
    Leaderboard, LeaderboardConfig, LeaderboardError, LevelMap, MemoryReplayStore,
};
use tablesync_testkit::FlakyBackend;
use thiserror::Error;
use tracing::{debug, info};

const MIN_TIME_MS: u64 = 10_000;
const MAX_TIME_MS: u64 = 120_000;
const REPLAY_BYTES: usize = 32;

/// Parameters of a simulation run.
#[derive(Debug, Clone)]
pub struct SimulateOptions {
    /// Number of players.
    pub players: usize,
    /// Number of maps.
    pub maps: usize,
    /// Runs per player and map.
    pub runs: usize,
    /// Probability that a backend write fails.
    pub fail_rate: f64,
    /// Seed for times and failures.
    pub seed: u64,
    /// Poll cycles before giving up.
    pub max_cycles: usize,
}

/// Simulation errors.
#[derive(Error, Debug)]
pub enum SimulateError {
    /// An option is out of range.
    #[error("invalid option: {0}")]
    InvalidOption(String),

    /// Writes were still unconfirmed when the cycle limit was hit.
    #[error("sessions did not settle within {0} poll cycles")]
    Unsettled(usize),

    /// A leaderboard operation failed.
    #[error(transparent)]
    Leaderboard(#[from] LeaderboardError),
}

/// One row of a map's top ranks.
#[derive(Debug, Serialize)]
pub struct RankRow {
    /// 1-based rank.
    pub rank: usize,
    /// Record key.
    pub key: String,
    /// Player name.
    pub name: String,
    /// Time in milliseconds.
    pub time_ms: u64,
    /// Whether a replay was uploaded.
    pub has_replay: bool,
}

/// Final state of one map, as seen by a fresh session.
#[derive(Debug, Serialize)]
pub struct MapResult {
    /// Map identifier.
    pub map_id: String,
    /// Path of the ranks table.
    pub rank_path: String,
    /// Records stored in the ranks table.
    pub records: usize,
    /// Records stored in the shared-replays table.
    pub shared_replays: usize,
    /// Replay path of the fastest shared run.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub best_replay: Option<String>,
    /// Fastest runs.
    pub top: Vec<RankRow>,
}

/// Simulation result.
#[derive(Debug, Serialize)]
pub struct SimulateResult {
    /// Poll cycles until every session settled.
    pub cycles: usize,
    /// Runs submitted.
    pub submissions: usize,
    /// Write requests that reached the backend.
    pub backend_writes: u64,
    /// Write requests failed by fault injection.
    pub injected_failures: u64,
    /// Replay uploads that failed.
    pub upload_failures: u64,
    /// Per-map results.
    pub maps: Vec<MapResult>,
}

fn level_maps(count: usize) -> Vec<LevelMap> {
    (0..count)
        .map(|m| {
            let id = format!("map{m}");
            if m % 2 == 0 {
                LevelMap::offline(id)
            } else {
                let path = format!("Maps/sim/{id}");
                LevelMap::published(id, path)
            }
        })
        .collect()
}

fn validate(options: &SimulateOptions) -> Result<(), SimulateError> {
    if options.players == 0 || options.maps == 0 {
        return Err(SimulateError::InvalidOption(
            "players and maps must be at least 1".into(),
        ));
    }
    if !(0.0..1.0).contains(&options.fail_rate) {
        return Err(SimulateError::InvalidOption(format!(
            "fail rate {} is outside [0, 1)",
            options.fail_rate
        )));
    }
    Ok(())
}

/// Runs a simulation and returns what a fresh session observes afterwards.
pub fn simulate(options: &SimulateOptions) -> Result<SimulateResult, SimulateError> {
    validate(options)?;

    let memory = Arc::new(MemoryBackend::new());
    let flaky = Arc::new(FlakyBackend::new(
        memory.clone(),
        options.fail_rate,
        options.seed,
    ));
    let store = Arc::new(MemoryReplayStore::new());
    let maps = level_maps(options.maps);
    let mut rng = StdRng::seed_from_u64(options.seed.wrapping_add(1));

    let mut boards = Vec::with_capacity(options.players * maps.len());
    for player in 0..options.players {
        let ctx = SessionContext::new(flaky.clone());
        for map in &maps {
            let board = Leaderboard::open(
                &ctx,
                map.clone(),
                store.clone(),
                LeaderboardConfig::default(),
            );
            boards.push((format!("player{player}"), board));
        }
    }

    let mut submissions = 0;
    for (player, board) in &boards {
        for _ in 0..options.runs {
            let time_ms = rng.gen_range(MIN_TIME_MS..MAX_TIME_MS);
            let replay = rng
                .gen_bool(0.5)
                .then(|| (0..REPLAY_BYTES).map(|_| rng.gen::<u8>()).collect::<Vec<u8>>());
            let share = rng.gen_bool(0.5);
            board.submit(player, time_ms, replay, share)?;
            submissions += 1;
        }
    }
    info!(
        players = options.players,
        maps = options.maps,
        submissions,
        "runs submitted"
    );

    let mut cycles = 0;
    loop {
        if cycles >= options.max_cycles {
            return Err(SimulateError::Unsettled(cycles));
        }
        for (_, board) in &boards {
            board.poll()?;
        }
        cycles += 1;
        if boards.iter().all(|(_, board)| board.is_settled()) {
            break;
        }
        debug!(cycles, "sessions not settled yet");
    }
    info!(cycles, injected = flaky.injected_failures(), "sessions settled");

    let upload_failures: u64 = boards.iter().map(|(_, b)| b.upload_failures()).sum();
    for (_, board) in &boards {
        board.close();
    }

    let observer = SessionContext::new(memory.clone());
    let mut results = Vec::with_capacity(maps.len());
    for map in &maps {
        let board = Leaderboard::open(
            &observer,
            map.clone(),
            store.clone(),
            LeaderboardConfig::default(),
        );
        board.poll()?;
        let top = board
            .top_ranks()
            .into_iter()
            .enumerate()
            .map(|(i, (key, record))| RankRow {
                rank: i + 1,
                key,
                name: record.name,
                time_ms: record.time_ms,
                has_replay: record.replay_path.is_some(),
            })
            .collect();
        results.push(MapResult {
            map_id: map.map_id.clone(),
            rank_path: map.rank_path(),
            records: board.ranks().len(),
            shared_replays: board.shared_replays().len(),
            best_replay: board.best_shared_replay_path(),
            top,
        });
        board.close();
    }

    Ok(SimulateResult {
        cycles,
        submissions,
        backend_writes: memory.write_count(),
        injected_failures: flaky.injected_failures(),
        upload_failures,
        maps: results,
    })
}

fn print_text(options: &SimulateOptions, result: &SimulateResult) {
    println!(
        "Simulated {} players on {} maps: {} runs settled in {} cycles",
        options.players, options.maps, result.submissions, result.cycles
    );
    println!(
        "Backend writes: {}, injected failures: {}, failed uploads: {}",
        result.backend_writes, result.injected_failures, result.upload_failures
    );
    for map in &result.maps {
        println!();
        println!(
            "Map {} ({} records, {} shared replays)",
            map.map_id, map.records, map.shared_replays
        );
        println!("  {}", map.rank_path);
        for row in &map.top {
            let marker = if row.has_replay { " [replay]" } else { "" };
            println!(
                "  {:>2}. {:<10} {:>8.3}s{}",
                row.rank,
                row.name,
                row.time_ms as f64 / 1000.0,
                marker
            );
        }
        if let Some(path) = &map.best_replay {
            println!("  best shared replay: {path}");
        }
    }
}

/// Runs the simulate command.
pub fn run(options: &SimulateOptions, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let result = simulate(options)?;
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_text(options, &result);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(fail_rate: f64, seed: u64) -> SimulateOptions {
        SimulateOptions {
            players: 3,
            maps: 2,
            runs: 2,
            fail_rate,
            seed,
            max_cycles: 500,
        }
    }

    #[test]
    fn every_run_reaches_the_backend() {
        let result = simulate(&options(0.5, 11)).unwrap();
        assert_eq!(result.submissions, 12);
        for map in &result.maps {
            assert_eq!(map.records, 6);
            assert!(map.top.len() <= 5);
            assert!(map.top.windows(2).all(|w| w[0].time_ms <= w[1].time_ms));
        }
        assert!(result.injected_failures > 0);
    }

    #[test]
    fn same_seed_same_standings() {
        let first = simulate(&options(0.2, 5)).unwrap();
        let second = simulate(&options(0.2, 5)).unwrap();
        let times = |r: &SimulateResult| -> Vec<Vec<u64>> {
            r.maps
                .iter()
                .map(|m| m.top.iter().map(|row| row.time_ms).collect())
                .collect()
        };
        assert_eq!(times(&first), times(&second));
    }

    #[test]
    fn published_and_offline_maps() {
        let result = simulate(&options(0.0, 1)).unwrap();
        assert_eq!(
            result.maps[0].rank_path,
            "Leaderboard/Map/OfflineMaps/map0/Top/Ranks/"
        );
        assert_eq!(
            result.maps[1].rank_path,
            "Leaderboard/Map/Maps/sim/map1/Top/Ranks/"
        );
        assert_eq!(result.injected_failures, 0);
    }

    #[test]
    fn rejects_bad_options() {
        assert!(matches!(
            simulate(&options(1.0, 1)),
            Err(SimulateError::InvalidOption(_))
        ));
        let mut opts = options(0.0, 1);
        opts.players = 0;
        assert!(matches!(
            simulate(&opts),
            Err(SimulateError::InvalidOption(_))
        ));
    }
}
