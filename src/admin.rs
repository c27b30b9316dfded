//! Out-of-band balance commands
//!
//! Admin commands bypass the board and go straight to the ledger through
//! the same optimistic transaction gameplay uses.
//!
//! Policy:
//! - `Set` overwrites the balance (clamped at zero); wins are untouched
//! - `Add` is clamped at zero exactly like a gameplay delta, but never
//!   counts toward wins
//! - `Gift` is informational: the producer has already moved the points,
//!   so the ledger is not touched and a `GiftNotice` is returned for display
//!
//! `Set` and `Add` create missing accounts regardless of the new-account
//! policy; the admin surface is how accounts get provisioned.

use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ledger::{Account, Ledger, LedgerStore};
use crate::normalize_owner;

/// A parsed admin instruction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdminCommand {
    Set { target: String, amount: i64 },
    Add { target: String, amount: i64 },
    Gift { from: String, to: String, amount: i64 },
}

impl AdminCommand {
    /// Account this command is about
    pub fn target(&self) -> &str {
        match self {
            AdminCommand::Set { target, .. } | AdminCommand::Add { target, .. } => target,
            AdminCommand::Gift { to, .. } => to,
        }
    }
}

/// Presentation-only record of a gift between participants
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftNotice {
    pub from: String,
    pub to: String,
    pub amount: i64,
}

/// What an admin command did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    /// The account after the mutation
    Applied(Account),
    /// Gift passed through for display; no ledger change
    Gift(GiftNotice),
    /// Blank target; nothing done
    Skipped,
}

impl<S: LedgerStore> Ledger<S> {
    /// Apply one admin command
    pub fn apply_admin(&self, command: &AdminCommand) -> Result<AdminOutcome, LedgerError> {
        let (from, to, amount) = match command {
            AdminCommand::Gift { from, to, amount } => (from, to, *amount),
            AdminCommand::Set { .. } | AdminCommand::Add { .. } => {
                return self.apply_balance_command(command);
            }
        };

        log::info!("Gift of {amount} from {from:?} to {to:?} (already settled upstream)");
        Ok(AdminOutcome::Gift(GiftNotice {
            from: from.clone(),
            to: to.clone(),
            amount,
        }))
    }

    fn apply_balance_command(&self, command: &AdminCommand) -> Result<AdminOutcome, LedgerError> {
        let Some(key) = normalize_owner(command.target()) else {
            log::warn!("Admin command with blank target ignored: {command:?}");
            return Ok(AdminOutcome::Skipped);
        };
        let starting = self.policy().starting_balance();

        let account = self.transact(&key, |current| {
            let mut account = current
                .cloned()
                .unwrap_or_else(|| Account::new(key.clone(), starting));
            account.balance = match command {
                AdminCommand::Set { amount, .. } => (*amount).max(0),
                AdminCommand::Add { amount, .. } => account.balance.saturating_add(*amount).max(0),
                AdminCommand::Gift { .. } => account.balance,
            };
            Some(account)
        })?;

        match account {
            Some(account) => {
                log::info!("Admin {command:?} -> {key:?} balance {}", account.balance);
                Ok(AdminOutcome::Applied(account))
            }
            None => Ok(AdminOutcome::Skipped),
        }
    }
}
