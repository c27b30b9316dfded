//! Ledger snapshot persistence
//!
//! Features:
//! - Versioned JSON envelope
//! - Atomic replace (write tmp, then rename over the old file)
//! - Unknown format versions are rejected rather than guessed at

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::PersistenceError;
use crate::ledger::Account;

/// Envelope format this build reads and writes
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Every account in the ledger at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub format_version: u32,
    pub accounts: Vec<Account>,
}

impl LedgerSnapshot {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            accounts,
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a snapshot, replacing any previous one atomically
pub fn save_snapshot(path: &Path, snapshot: &LedgerSnapshot) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_vec_pretty(snapshot)?;
    let tmp = tmp_path(path);
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    log::info!(
        "Ledger snapshot saved ({} accounts) to {}",
        snapshot.accounts.len(),
        path.display()
    );
    Ok(())
}

/// Load a snapshot; `Ok(None)` if none has been written yet
pub fn load_snapshot(path: &Path) -> Result<Option<LedgerSnapshot>, PersistenceError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::info!("No ledger snapshot at {}, starting fresh", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let snapshot: LedgerSnapshot = serde_json::from_slice(&bytes)?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(PersistenceError::UnsupportedVersion {
            found: snapshot.format_version,
            expected: SNAPSHOT_FORMAT_VERSION,
        });
    }

    log::info!(
        "Loaded ledger snapshot ({} accounts) from {}",
        snapshot.accounts.len(),
        path.display()
    );
    Ok(Some(snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("plinko-engine-{name}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_save_then_load() {
        let dir = scratch_dir("save-load");
        let path = dir.join("ledger.json");
        let snapshot = LedgerSnapshot::new(vec![Account {
            name: "alice".into(),
            balance: 12,
            wins: 30,
            created_seq: 0,
        }]);

        save_snapshot(&path, &snapshot).unwrap();
        assert!(!tmp_path(&path).exists());
        assert_eq!(load_snapshot(&path).unwrap(), Some(snapshot));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = scratch_dir("missing");
        assert_eq!(load_snapshot(&dir.join("nope.json")).unwrap(), None);
    }

    #[test]
    fn test_rejects_unknown_version() {
        let dir = scratch_dir("version");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ledger.json");
        fs::write(&path, r#"{"format_version": 99, "accounts": []}"#).unwrap();
        assert!(matches!(
            load_snapshot(&path),
            Err(PersistenceError::UnsupportedVersion { found: 99, .. })
        ));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_rejects_garbage() {
        let dir = scratch_dir("garbage");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ledger.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(load_snapshot(&path), Err(PersistenceError::Serialization(_))));
        let _ = fs::remove_dir_all(&dir);
    }
}
