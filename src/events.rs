//! Inbound event streams
//!
//! The realtime transport is abstract: anything that can hand over
//! deliveries and accept acknowledgements implements `EventSource`. Payloads
//! are untyped JSON from outside and are parsed here; anything malformed is
//! dropped with a warning and never reaches the queue or the ledger.

use std::collections::{BTreeSet, VecDeque};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::admin::AdminCommand;
use crate::error::EventError;
use crate::normalize_owner;

/// Which inbound stream a source feeds
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    Drops,
    Admin,
}

/// One item handed over by a source, acknowledged by id
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub id: u64,
    pub payload: Value,
}

/// A realtime source of deliveries with explicit acknowledgement
///
/// Acknowledged deliveries must never be redelivered.
pub trait EventSource {
    fn stream(&self) -> Stream;

    /// Next pending delivery, if one is ready
    fn poll_delivery(&mut self) -> Option<Delivery>;

    /// Tell the upstream the delivery was consumed
    fn acknowledge(&mut self, id: u64);
}

/// Registry enforcing one subscription per stream per process
#[derive(Debug, Default)]
pub struct Subscriptions {
    active: BTreeSet<Stream>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, stream: Stream) -> Result<(), EventError> {
        if !self.active.insert(stream) {
            return Err(EventError::DuplicateSubscription(stream));
        }
        log::info!("Subscribed to {stream:?} stream");
        Ok(())
    }

    pub fn is_subscribed(&self, stream: Stream) -> bool {
        self.active.contains(&stream)
    }

    pub fn count(&self) -> usize {
        self.active.len()
    }
}

#[derive(Debug, Deserialize)]
struct DropPayload {
    username: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AdjustKind {
    Set,
    Add,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AdminPayload {
    Gift {
        username: String,
        #[serde(rename = "giftedBy")]
        gifted_by: String,
        amount: f64,
    },
    Adjust {
        username: String,
        #[serde(rename = "type")]
        kind: AdjustKind,
        amount: f64,
    },
}

/// Whole-point amount from a JSON number
///
/// Fractions are rounded; non-finite or out-of-range values are malformed.
fn whole_points(amount: f64) -> Option<i64> {
    let rounded = amount.round();
    if rounded.is_finite() && rounded.abs() < i64::MAX as f64 {
        Some(rounded as i64)
    } else {
        None
    }
}

/// Participant name from a drop payload `{ "username": ... }`
pub fn parse_drop(payload: &Value) -> Option<String> {
    let parsed = DropPayload::deserialize(payload).ok()?;
    let name = parsed.username.trim();
    if normalize_owner(name).is_none() {
        return None;
    }
    Some(name.to_string())
}

/// Admin command from `{ username, type, amount }` or `{ username, giftedBy, amount }`
pub fn parse_admin(payload: &Value) -> Option<AdminCommand> {
    let parsed = AdminPayload::deserialize(payload).ok()?;
    let command = match parsed {
        AdminPayload::Gift {
            username,
            gifted_by,
            amount,
        } => AdminCommand::Gift {
            from: normalize_owner(&gifted_by)?,
            to: normalize_owner(&username)?,
            amount: whole_points(amount)?,
        },
        AdminPayload::Adjust {
            username,
            kind,
            amount,
        } => {
            let target = normalize_owner(&username)?;
            let amount = whole_points(amount)?;
            match kind {
                AdjustKind::Set => AdminCommand::Set { target, amount },
                AdjustKind::Add => AdminCommand::Add { target, amount },
            }
        }
    };
    Some(command)
}

/// In-memory source, used by tests and the stdin driver
#[derive(Debug)]
pub struct MemorySource {
    stream: Stream,
    pending: VecDeque<Delivery>,
    acked: u64,
    last_acked: Option<u64>,
    next_id: u64,
}

impl MemorySource {
    pub fn new(stream: Stream) -> Self {
        Self {
            stream,
            pending: VecDeque::new(),
            acked: 0,
            last_acked: None,
            next_id: 1,
        }
    }

    /// Queue a payload for delivery; returns its delivery id
    pub fn push(&mut self, payload: Value) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.pending.push_back(Delivery { id, payload });
        id
    }

    /// Deliveries acknowledged so far
    pub fn acked_count(&self) -> u64 {
        self.acked
    }

    pub fn last_acked(&self) -> Option<u64> {
        self.last_acked
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

impl EventSource for MemorySource {
    fn stream(&self) -> Stream {
        self.stream
    }

    fn poll_delivery(&mut self) -> Option<Delivery> {
        self.pending.pop_front()
    }

    fn acknowledge(&mut self, id: u64) {
        self.acked += 1;
        self.last_acked = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_drop() {
        assert_eq!(parse_drop(&json!({ "username": "Alice" })), Some("Alice".into()));
        assert_eq!(parse_drop(&json!({ "username": "  bob  " })), Some("bob".into()));
        assert_eq!(parse_drop(&json!({ "username": "" })), None);
        assert_eq!(parse_drop(&json!({ "user": "alice" })), None);
        assert_eq!(parse_drop(&json!({ "username": 42 })), None);
        assert_eq!(parse_drop(&json!("alice")), None);
    }

    #[test]
    fn test_parse_admin_set_and_add() {
        assert_eq!(
            parse_admin(&json!({ "username": "Alice", "type": "set", "amount": 100 })),
            Some(AdminCommand::Set {
                target: "alice".into(),
                amount: 100
            })
        );
        assert_eq!(
            parse_admin(&json!({ "username": "bob", "type": "add", "amount": -7.4 })),
            Some(AdminCommand::Add {
                target: "bob".into(),
                amount: -7
            })
        );
    }

    #[test]
    fn test_parse_admin_gift() {
        assert_eq!(
            parse_admin(&json!({ "username": "Erin", "giftedBy": "Frank", "amount": 25 })),
            Some(AdminCommand::Gift {
                from: "frank".into(),
                to: "erin".into(),
                amount: 25
            })
        );
    }

    #[test]
    fn test_parse_admin_malformed() {
        assert_eq!(parse_admin(&json!({ "username": "a", "type": "set" })), None);
        assert_eq!(parse_admin(&json!({ "type": "add", "amount": 5 })), None);
        assert_eq!(
            parse_admin(&json!({ "username": "a", "type": "multiply", "amount": 5 })),
            None
        );
        assert_eq!(
            parse_admin(&json!({ "username": "", "type": "add", "amount": 5 })),
            None
        );
        assert_eq!(
            parse_admin(&json!({ "username": "a", "type": "add", "amount": "5" })),
            None
        );
    }

    #[test]
    fn test_single_subscription_per_stream() {
        let mut subs = Subscriptions::new();
        subs.subscribe(Stream::Drops).unwrap();
        subs.subscribe(Stream::Admin).unwrap();
        assert!(matches!(
            subs.subscribe(Stream::Drops),
            Err(EventError::DuplicateSubscription(Stream::Drops))
        ));
        assert_eq!(subs.count(), 2);
    }

    #[test]
    fn test_memory_source_delivers_in_order() {
        let mut source = MemorySource::new(Stream::Drops);
        let a = source.push(json!({ "username": "a" }));
        let b = source.push(json!({ "username": "b" }));
        assert_eq!(source.poll_delivery().unwrap().id, a);
        source.acknowledge(a);
        assert_eq!(source.poll_delivery().unwrap().id, b);
        assert!(source.poll_delivery().is_none());
        assert_eq!(source.acked_count(), 1);
        assert_eq!(source.last_acked(), Some(a));
    }

    #[test]
    fn test_memory_source_keeps_no_ack_history() {
        let mut source = MemorySource::new(Stream::Admin);
        let mut last = 0;
        for _ in 0..10_000 {
            last = source.push(json!({}));
            let delivery = source.poll_delivery().unwrap();
            source.acknowledge(delivery.id);
        }
        assert_eq!(source.pending(), 0);
        assert_eq!(source.acked_count(), 10_000);
        assert_eq!(source.last_acked(), Some(last));
    }
}
