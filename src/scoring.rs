//! Scoring dispatch
//!
//! Turns world events into ledger deltas. The world removes a ball in the
//! same step it reports the bucket hit, so each ball reaches the dispatcher
//! at most once and nothing here needs to de-duplicate.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::LedgerError;
use crate::ledger::{Account, Ledger, LedgerStore};
use crate::sim::{BoardLayout, BucketId, WorldEvent};

/// Presentation record for one scored ball
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreOutcome {
    pub owner: String,
    pub delta: i64,
    pub bucket_label: String,
}

/// Result of dispatching one world event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Delta applied to `account`
    Scored {
        outcome: ScoreOutcome,
        account: Account,
    },
    /// Owner has no account and the ledger refused to create one
    Declined { owner: String },
    /// Ball had no owner
    Unowned,
    /// Ball left through the escape guard
    Escaped,
    /// Bucket id not on this board
    UnknownBucket(BucketId),
}

/// Applies bucket hits to the ledger and announces them
#[derive(Debug)]
pub struct ScoringDispatcher {
    outcomes: broadcast::Sender<ScoreOutcome>,
    scored: u64,
    escaped: u64,
}

impl ScoringDispatcher {
    pub fn new(outcomes: broadcast::Sender<ScoreOutcome>) -> Self {
        Self {
            outcomes,
            scored: 0,
            escaped: 0,
        }
    }

    /// New receiver for score outcomes
    pub fn subscribe(&self) -> broadcast::Receiver<ScoreOutcome> {
        self.outcomes.subscribe()
    }

    pub fn scored(&self) -> u64 {
        self.scored
    }

    pub fn escaped(&self) -> u64 {
        self.escaped
    }

    /// Handle one world event
    ///
    /// The outcome broadcast is fire-and-forget: having no listeners is not
    /// an error and never undoes the ledger write.
    pub fn dispatch<S: LedgerStore>(
        &mut self,
        board: &BoardLayout,
        ledger: &Ledger<S>,
        event: &WorldEvent,
    ) -> Result<Dispatch, LedgerError> {
        let (ball, bucket_id) = match event {
            WorldEvent::BallReachedBucket { ball, bucket } => (ball, *bucket),
            WorldEvent::BallEscaped { ball } => {
                self.escaped += 1;
                log::debug!("Ball {} for {:?} escaped; not scored", ball.id.0, ball.owner);
                return Ok(Dispatch::Escaped);
            }
        };

        if ball.owner.trim().is_empty() {
            log::debug!("Ball {} has no owner; not scored", ball.id.0);
            return Ok(Dispatch::Unowned);
        }

        // Buckets come from the same board the world was built on
        let Some(bucket) = board.bucket(bucket_id) else {
            log::error!("Ball {} hit unknown bucket {:?}", ball.id.0, bucket_id);
            return Ok(Dispatch::UnknownBucket(bucket_id));
        };

        let Some(account) = ledger.apply_delta(&ball.owner, bucket.value)? else {
            log::info!("{} landed in {} without an account; not scored", ball.owner, bucket.label);
            return Ok(Dispatch::Declined {
                owner: ball.owner.clone(),
            });
        };
        self.scored += 1;

        let outcome = ScoreOutcome {
            owner: ball.owner.clone(),
            delta: bucket.value,
            bucket_label: bucket.label.clone(),
        };
        log::info!(
            "{} landed in {} ({:+})",
            outcome.owner,
            outcome.bucket_label,
            outcome.delta
        );
        if self.outcomes.send(outcome.clone()).is_err() {
            log::debug!("No score outcome listeners");
        }

        Ok(Dispatch::Scored { outcome, account })
    }
}
