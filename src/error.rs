//! Error types for the engine.
//!
//! Each subsystem has its own enum. Callers at the edges (the binary, the
//! ingestion loop) decide whether an error is fatal or just logged.

use std::path::PathBuf;

/// Errors raised while loading or validating static configuration.
///
/// These are fatal at startup: an engine is never built from a config that
/// failed validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration JSON.
    #[error("failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The board description cannot produce a usable layout.
    #[error("invalid board config: {0}")]
    InvalidBoard(String),

    /// A physics parameter is out of range.
    #[error("invalid physics config: {0}")]
    InvalidPhysics(String),

    /// A ledger setting is out of range.
    #[error("invalid ledger config: {0}")]
    InvalidLedger(String),
}

/// Errors raised while reading or writing ledger snapshots.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// Snapshot file could not be read or written.
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot contents are not valid JSON for the envelope.
    #[error("snapshot serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Snapshot was written by an incompatible format version.
    #[error("unsupported snapshot format version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version found in the file.
        found: u32,
        /// Version this build understands.
        expected: u32,
    },
}

/// Errors raised by ledger transactions.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Every optimistic attempt lost to a concurrent writer.
    #[error("ledger update for {owner:?} gave up after {attempts} conflicting attempts")]
    RetriesExhausted {
        /// Normalized account key.
        owner: String,
        /// Number of read-compute-write cycles tried.
        attempts: u32,
    },
}

/// Errors raised by the event ingestion layer.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A second subscription was attempted for a stream that already has one.
    #[error("stream {0:?} already has a subscriber")]
    DuplicateSubscription(crate::events::Stream),

    /// A source was pumped before its stream was subscribed.
    #[error("stream {0:?} has no subscriber")]
    NotSubscribed(crate::events::Stream),
}
