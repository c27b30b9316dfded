//! Engine settings
//!
//! Static configuration, read once at startup from a JSON file. Every
//! field has a default, so a partial file (or none at all) is fine.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::ConfigError;
use crate::leaderboard::RankBy;
use crate::ledger::NewAccountPolicy;
use crate::sim::{BoardConfig, PhysicsConfig};

/// Drop queue pacing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Milliseconds between consecutive spawns
    pub spawn_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            spawn_interval_ms: SPAWN_INTERVAL_MS,
        }
    }
}

impl QueueConfig {
    pub fn spawn_interval(&self) -> Duration {
        Duration::from_millis(self.spawn_interval_ms)
    }
}

/// Ledger behaviour and storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub new_accounts: NewAccountPolicy,
    /// Optimistic transaction attempts before a mutation is reported failed
    pub max_retries: u32,
    /// Rows published on the leaderboard
    pub leaderboard_size: usize,
    /// Field the published leaderboard is ranked by
    pub rank_by: RankBy,
    /// Where to persist ledger snapshots (`None` keeps the ledger in memory)
    pub snapshot_path: Option<PathBuf>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            new_accounts: NewAccountPolicy::default(),
            max_retries: LEDGER_MAX_RETRIES,
            leaderboard_size: LEADERBOARD_SIZE,
            rank_by: RankBy::default(),
            snapshot_path: Some(PathBuf::from("plinko-ledger.json")),
        }
    }
}

/// All engine settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub board: BoardConfig,
    pub physics: PhysicsConfig,
    pub queue: QueueConfig,
    pub ledger: LedgerConfig,
}

impl Settings {
    /// Parse settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load settings from a JSON file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::info!("No settings at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        let settings = Self::from_json(&json)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Check every section; called once before anything is built
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.board.validate()?;
        self.physics.validate()?;
        if self.ledger.max_retries == 0 {
            return Err(ConfigError::InvalidLedger(
                "max_retries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.board.bucket_values.len(), 17);
        assert_eq!(settings.queue.spawn_interval(), Duration::from_millis(350));
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let settings = Settings::from_json(
            r#"{
                "board": { "rows": 8, "bucket_values": [5, 1, 5] },
                "ledger": { "new_accounts": { "policy": "require_existing" }, "rank_by": "wins" }
            }"#,
        )
        .unwrap();
        assert_eq!(settings.board.rows, 8);
        assert_eq!(settings.board.bucket_values, vec![5, 1, 5]);
        assert_eq!(settings.board.width, BOARD_WIDTH);
        assert_eq!(settings.ledger.new_accounts, NewAccountPolicy::RequireExisting);
        assert_eq!(settings.ledger.rank_by, RankBy::Wins);
        assert_eq!(settings.ledger.leaderboard_size, LEADERBOARD_SIZE);
        assert_eq!(settings.physics, PhysicsConfig::default());
    }

    #[test]
    fn test_baseline_policy_json() {
        let settings = Settings::from_json(
            r#"{ "ledger": { "new_accounts": { "policy": "baseline", "starting_balance": 100 } } }"#,
        )
        .unwrap();
        assert_eq!(
            settings.ledger.new_accounts,
            NewAccountPolicy::Baseline {
                starting_balance: 100
            }
        );
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let settings = Settings::from_json(r#"{ "board": { "bucket_values": [] } }"#).unwrap();
        assert!(matches!(settings.validate(), Err(ConfigError::InvalidBoard(_))));
        assert!(matches!(Settings::from_json("{ nope"), Err(ConfigError::Json(_))));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let path = std::env::temp_dir().join("plinko-engine-no-such-settings.json");
        assert_eq!(Settings::load(&path).unwrap(), Settings::default());
    }
}
