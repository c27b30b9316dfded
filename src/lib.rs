//! Plinko Engine - simulation and scoring core for a plinko reward overlay
//!
//! Core modules:
//! - `sim`: Deterministic board generation, physics and sensor detection
//! - `scoring`: Maps bucket hits to ledger deltas, once per ball
//! - `ledger`: Account store with optimistic transactions and rankings
//! - `queue`: FIFO drop queue with a steady spawn cadence
//! - `admin`: Out-of-band balance commands
//! - `events`: Inbound event parsing and source subscriptions
//! - `engine`: Wires the pieces into a tick loop
//! - `persistence`: Versioned ledger snapshots on disk
//! - `settings`: Static configuration

pub mod admin;
pub mod engine;
pub mod error;
pub mod events;
pub mod leaderboard;
pub mod ledger;
pub mod persistence;
pub mod queue;
pub mod scoring;
pub mod settings;
pub mod sim;

pub use engine::{Engine, Ingestor};
pub use error::{ConfigError, EventError, LedgerError, PersistenceError};
pub use leaderboard::{Leaderboard, LeaderboardEntry, RankBy};
pub use ledger::{Account, Ledger, MemoryStore, NewAccountPolicy};
pub use settings::Settings;

/// Engine configuration constants
///
/// Defaults mirror the original browser overlay (600x600 board, 10 peg rows
/// on a 40px grid).
pub mod consts {
    /// Fixed simulation timestep (120 Hz)
    pub const SIM_DT: f32 = 1.0 / 120.0;
    /// Maximum substeps per frame to prevent spiral of death
    pub const MAX_SUBSTEPS: u32 = 8;

    /// Board dimensions
    pub const BOARD_WIDTH: f32 = 600.0;
    pub const BOARD_HEIGHT: f32 = 600.0;
    pub const BUCKET_HEIGHT: f32 = 40.0;

    /// Peg lattice defaults
    pub const PEG_ROWS: u32 = 10;
    pub const PEG_SPACING: f32 = 40.0;
    pub const PEG_TOP_ROW_Y: f32 = 100.0;
    pub const PEG_RADIUS: f32 = 4.0;
    pub const PEG_RESTITUTION: f32 = 0.3;

    /// Symmetric 17-slot payout table
    pub const DEFAULT_BUCKET_VALUES: [i64; 17] =
        [100, 50, 25, 15, 10, 5, 1, -1, -2, -1, 1, 5, 10, 15, 25, 50, 100];

    /// Ball defaults
    pub const BALL_RADIUS: f32 = 8.0;
    pub const BALL_RESTITUTION: f32 = 0.5;
    pub const BALL_FRICTION: f32 = 0.01;
    pub const BALL_AIR_FRICTION: f32 = 0.01;
    /// Speed cap (px/s); at 120 Hz a ball moves at most 5px per step
    pub const BALL_MAX_SPEED: f32 = 600.0;

    /// Downward acceleration (px/s²)
    pub const GRAVITY: f32 = 900.0;

    /// Spawn point and randomisation
    pub const SPAWN_Y: f32 = 20.0;
    pub const SPAWN_JITTER: f32 = 5.0;
    pub const NUDGE_SPEED: f32 = 20.0;

    /// Resting detection
    pub const REST_SPEED: f32 = 5.0;
    pub const REST_TICKS: u32 = 30;

    /// Escape guard
    pub const ESCAPE_MARGIN: f32 = 50.0;
    /// 30 seconds at 120 Hz
    pub const MAX_BALL_TICKS: u32 = 30 * 120;

    /// Milliseconds between consecutive spawns from the drop queue
    pub const SPAWN_INTERVAL_MS: u64 = 350;

    /// Optimistic transaction attempts before giving up
    pub const LEDGER_MAX_RETRIES: u32 = 16;
    /// Entries published on the leaderboard
    pub const LEADERBOARD_SIZE: usize = 10;
}

/// Normalize a participant name into its account key
///
/// Returns `None` for names that are empty after trimming.
#[inline]
pub fn normalize_owner(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_owner() {
        assert_eq!(normalize_owner("  Alice "), Some("alice".to_string()));
        assert_eq!(normalize_owner("BOB"), Some("bob".to_string()));
        assert_eq!(normalize_owner("   "), None);
        assert_eq!(normalize_owner(""), None);
    }
}
