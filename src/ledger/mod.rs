//! Participant ledger
//!
//! Balances and win counters keyed by normalized participant name. Every
//! mutation is an optimistic transaction against a `LedgerStore`: read the
//! row and its version, compute the new row, write it only if the version
//! is unchanged, and retry on conflict. Concurrent deltas are never lost.

pub mod store;

use serde::{Deserialize, Serialize};

use crate::consts::LEDGER_MAX_RETRIES;
use crate::error::LedgerError;
use crate::leaderboard::{Leaderboard, RankBy};
use crate::normalize_owner;

pub use store::{LedgerStore, MemoryStore, Versioned, WriteOutcome};

/// A participant's account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Normalized participant name (also the store key)
    pub name: String,
    /// Point balance, never negative
    pub balance: i64,
    /// Sum of every positive scoring delta
    pub wins: i64,
    /// Store-assigned creation order, used to break ranking ties
    #[serde(default)]
    pub created_seq: u64,
}

impl Account {
    pub fn new(name: impl Into<String>, balance: i64) -> Self {
        Self {
            name: name.into(),
            balance: balance.max(0),
            wins: 0,
            created_seq: 0,
        }
    }

    /// Apply a gameplay delta: clamp the balance at zero, count positive wins
    pub fn with_delta(mut self, delta: i64) -> Self {
        self.balance = self.balance.saturating_add(delta).max(0);
        if delta > 0 {
            self.wins = self.wins.saturating_add(delta);
        }
        self
    }
}

/// What to do when a delta arrives for a name with no account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum NewAccountPolicy {
    /// Create the account with `starting_balance`, then apply the delta
    Baseline { starting_balance: i64 },
    /// Ignore the delta; accounts must be provisioned elsewhere
    RequireExisting,
}

impl Default for NewAccountPolicy {
    fn default() -> Self {
        NewAccountPolicy::Baseline {
            starting_balance: 0,
        }
    }
}

impl NewAccountPolicy {
    /// Balance a freshly created account starts from
    pub fn starting_balance(&self) -> i64 {
        match self {
            NewAccountPolicy::Baseline { starting_balance } => *starting_balance,
            NewAccountPolicy::RequireExisting => 0,
        }
    }
}

/// Ledger over a compare-and-set store
#[derive(Debug)]
pub struct Ledger<S> {
    store: S,
    policy: NewAccountPolicy,
    max_retries: u32,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: S, policy: NewAccountPolicy) -> Self {
        Self {
            store,
            policy,
            max_retries: LEDGER_MAX_RETRIES,
        }
    }

    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn policy(&self) -> NewAccountPolicy {
        self.policy
    }

    /// Apply a scoring delta to `owner`
    ///
    /// Returns the stored account, or `None` when the name is blank or the
    /// policy refuses to create a missing account.
    pub fn apply_delta(&self, owner: &str, delta: i64) -> Result<Option<Account>, LedgerError> {
        let Some(key) = normalize_owner(owner) else {
            return Ok(None);
        };
        let policy = self.policy;

        let result = self.transact(&key, |current| match (current, policy) {
            (Some(account), _) => Some(account.clone().with_delta(delta)),
            (None, NewAccountPolicy::Baseline { starting_balance }) => {
                Some(Account::new(key.clone(), starting_balance).with_delta(delta))
            }
            (None, NewAccountPolicy::RequireExisting) => None,
        })?;

        if result.is_none() {
            log::info!("No account for {key:?}; delta {delta} ignored");
        }
        Ok(result)
    }

    /// Current account for `owner`
    pub fn account(&self, owner: &str) -> Result<Option<Account>, LedgerError> {
        let Some(key) = normalize_owner(owner) else {
            return Ok(None);
        };
        Ok(self.store.read(&key)?.map(|row| row.value))
    }

    /// Ranked snapshot, recomputed from the store on every call
    pub fn top_n(&self, n: usize, by: RankBy) -> Result<Leaderboard, LedgerError> {
        let accounts = self.store.accounts()?;
        Ok(Leaderboard::rank(&accounts, n, by))
    }

    /// Optimistic read-compute-write on one account
    ///
    /// `update` sees the current row (or `None`) and returns the row to
    /// write, or `None` to abort without writing. It may run more than once.
    pub fn transact<F>(&self, key: &str, mut update: F) -> Result<Option<Account>, LedgerError>
    where
        F: FnMut(Option<&Account>) -> Option<Account>,
    {
        for attempt in 1..=self.max_retries {
            let current = self.store.read(key)?;
            let Some(next) = update(current.as_ref().map(|row| &row.value)) else {
                return Ok(None);
            };

            match self.store.write_if(key, current.map(|row| row.version), next)? {
                WriteOutcome::Committed(account) => return Ok(Some(account)),
                WriteOutcome::Conflict => {
                    log::debug!("Ledger conflict on {key:?} (attempt {attempt}), retrying");
                }
            }
        }

        log::error!(
            "Ledger update on {key:?} abandoned after {} attempts",
            self.max_retries
        );
        Err(LedgerError::RetriesExhausted {
            owner: key.to_string(),
            attempts: self.max_retries,
        })
    }
}
