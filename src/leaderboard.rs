//! Ranked leaderboard read model
//!
//! Built from ledger accounts on demand and published to presentation
//! consumers as `[{ name, value }]`.

use serde::{Deserialize, Serialize};

use crate::ledger::Account;

/// Which account field to rank by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankBy {
    #[default]
    Balance,
    Wins,
}

impl RankBy {
    fn value_of(&self, account: &Account) -> i64 {
        match self {
            RankBy::Balance => account.balance,
            RankBy::Wins => account.wins,
        }
    }
}

/// A single leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub name: String,
    pub value: i64,
}

/// Ranked snapshot, highest first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Leaderboard {
    pub by: RankBy,
    pub entries: Vec<LeaderboardEntry>,
}

impl Leaderboard {
    /// Rank `accounts` by `by`, descending, keeping the top `n`
    ///
    /// Ties go to the account created first.
    pub fn rank(accounts: &[Account], n: usize, by: RankBy) -> Self {
        let mut ranked: Vec<&Account> = accounts.iter().collect();
        ranked.sort_by(|a, b| {
            by.value_of(b)
                .cmp(&by.value_of(a))
                .then(a.created_seq.cmp(&b.created_seq))
        });

        let entries = ranked
            .into_iter()
            .take(n)
            .map(|account| LeaderboardEntry {
                name: account.name.clone(),
                value: by.value_of(account),
            })
            .collect();

        Self { by, entries }
    }

    /// Check if the leaderboard is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the top entry (if any)
    pub fn leader(&self) -> Option<&LeaderboardEntry> {
        self.entries.first()
    }
}
