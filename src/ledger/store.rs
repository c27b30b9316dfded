//! Versioned account storage
//!
//! A `LedgerStore` exposes exactly what an optimistic transaction needs:
//! read a row together with its version, and write a row only if the
//! version is still the one that was read. Anything that can do a
//! compare-and-set (a SQL row with a version column, a KV store with CAS)
//! can sit behind this trait; `MemoryStore` is the in-process one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::Account;
use crate::error::LedgerError;
use crate::normalize_owner;
use crate::persistence::LedgerSnapshot;

/// A row plus the version it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

/// Result of a conditional write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    /// The write landed; this is the stored row
    Committed(Account),
    /// Someone else wrote first; re-read and retry
    Conflict,
}

/// Compare-and-set account storage
pub trait LedgerStore: Send + Sync {
    /// Current row for `key`, if any
    fn read(&self, key: &str) -> Result<Option<Versioned<Account>>, LedgerError>;

    /// Store `account` under `key` only if the row is still at `expected`
    ///
    /// `expected == None` means the row must not exist yet. On insert the
    /// store assigns `created_seq`.
    fn write_if(
        &self,
        key: &str,
        expected: Option<u64>,
        account: Account,
    ) -> Result<WriteOutcome, LedgerError>;

    /// Every account, in no particular order
    fn accounts(&self) -> Result<Vec<Account>, LedgerError>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn read(&self, key: &str) -> Result<Option<Versioned<Account>>, LedgerError> {
        (**self).read(key)
    }

    fn write_if(
        &self,
        key: &str,
        expected: Option<u64>,
        account: Account,
    ) -> Result<WriteOutcome, LedgerError> {
        (**self).write_if(key, expected, account)
    }

    fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        (**self).accounts()
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    rows: HashMap<String, Versioned<Account>>,
    next_seq: u64,
}

/// In-process store; each call holds the lock only for its own read or write
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoreInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with existing accounts
    ///
    /// Names are normalized into keys; rows with blank names are skipped.
    /// Creation order follows each account's `created_seq`.
    pub fn with_accounts(accounts: impl IntoIterator<Item = Account>) -> Self {
        let mut inner = StoreInner::default();
        for mut account in accounts {
            let Some(key) = normalize_owner(&account.name) else {
                log::warn!("Skipping restored account with blank name");
                continue;
            };
            account.name = key.clone();
            inner.next_seq = inner.next_seq.max(account.created_seq.saturating_add(1));
            inner.rows.insert(
                key,
                Versioned {
                    version: 1,
                    value: account,
                },
            );
        }
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// Restore from a snapshot loaded off disk
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> Self {
        Self::with_accounts(snapshot.accounts)
    }

    /// Export every account, ordered by creation
    pub fn snapshot(&self) -> LedgerSnapshot {
        let mut accounts: Vec<_> = self.lock().rows.values().map(|v| v.value.clone()).collect();
        accounts.sort_by_key(|a| a.created_seq);
        LedgerSnapshot::new(accounts)
    }

    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().rows.is_empty()
    }

    // Writers never leave a row half-updated, so a poisoned lock is still usable
    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl LedgerStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Versioned<Account>>, LedgerError> {
        Ok(self.lock().rows.get(key).cloned())
    }

    fn write_if(
        &self,
        key: &str,
        expected: Option<u64>,
        mut account: Account,
    ) -> Result<WriteOutcome, LedgerError> {
        let mut inner = self.lock();
        let current = inner.rows.get(key).map(|row| (row.version, row.value.created_seq));

        let version = match (current, expected) {
            (None, None) => {
                account.created_seq = inner.next_seq;
                inner.next_seq = inner.next_seq.saturating_add(1);
                1
            }
            (Some((version, created_seq)), Some(seen)) if version == seen => {
                account.created_seq = created_seq;
                version + 1
            }
            _ => return Ok(WriteOutcome::Conflict),
        };

        inner.rows.insert(
            key.to_string(),
            Versioned {
                version,
                value: account.clone(),
            },
        );
        Ok(WriteOutcome::Committed(account))
    }

    fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.lock().rows.values().map(|v| v.value.clone()).collect())
    }
}
