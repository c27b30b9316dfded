//! Drop request queue
//!
//! Bursts of drop requests are turned into a steady spawn cadence: one
//! drain loop pops the head, hands it to the spawner, sleeps for the
//! inter-spawn interval, and repeats until it finds the queue empty.
//!
//! Only one drain loop may run at a time. The right to run it is a
//! `DrainPermit`, handed out by `enqueue` to whichever caller flips the
//! draining flag. The flag and the queue share one lock, so a request that
//! arrives while a loop is running is always picked up by that loop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One participant's request for a ball
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropRequest {
    pub participant: String,
    /// Arrival order, starting at 0
    pub seq: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<DropRequest>,
    draining: bool,
    next_seq: u64,
}

/// FIFO of pending drops, cheap to clone and share between tasks
#[derive(Debug, Clone)]
pub struct DropQueue {
    state: Arc<Mutex<QueueState>>,
    interval: Duration,
}

/// Result of enqueueing a request
#[derive(Debug)]
pub struct Enqueued {
    pub seq: u64,
    /// Present when no drain loop is running; the caller must run it
    pub permit: Option<DrainPermit>,
}

impl DropQueue {
    pub fn new(interval: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Append a request at the tail
    pub fn enqueue(&self, participant: impl Into<String>) -> Enqueued {
        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        let request = DropRequest {
            participant: participant.into(),
            seq,
        };
        log::info!("Queued drop #{seq} for {:?}", request.participant);
        state.pending.push_back(request);

        let permit = if state.draining {
            None
        } else {
            state.draining = true;
            Some(DrainPermit {
                queue: self.clone(),
                released: false,
            })
        };

        Enqueued { seq, permit }
    }

    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    pub fn is_draining(&self) -> bool {
        self.lock().draining
    }

    /// Pop the head, or release the draining flag if there is none
    fn pop_or_release(&self) -> Option<DropRequest> {
        let mut state = self.lock();
        let next = state.pending.pop_front();
        if next.is_none() {
            state.draining = false;
        }
        next
    }

    // The state is a plain queue and a flag; it is never left half-written
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Exclusive right to run the drain loop
///
/// Dropping an unfinished permit (including cancelling `run`) releases the
/// draining flag so the next arrival can start a fresh loop.
#[derive(Debug)]
pub struct DrainPermit {
    queue: DropQueue,
    released: bool,
}

impl DrainPermit {
    /// Serve requests in arrival order until the queue is empty
    ///
    /// `spawn` is called once per request, then the loop waits the
    /// queue's interval before taking the next one. Returns how many
    /// requests this loop served.
    pub async fn run<F>(mut self, mut spawn: F) -> usize
    where
        F: FnMut(DropRequest),
    {
        let mut served = 0;
        while let Some(request) = self.queue.pop_or_release() {
            log::debug!("Draining drop #{} for {:?}", request.seq, request.participant);
            spawn(request);
            served += 1;
            tokio::time::sleep(self.queue.interval).await;
        }
        self.released = true;
        served
    }
}

impl Drop for DrainPermit {
    fn drop(&mut self) {
        if !self.released {
            self.queue.lock().draining = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    const INTERVAL: Duration = Duration::from_millis(350);

    #[tokio::test(start_paused = true)]
    async fn test_fifo_with_steady_cadence() {
        let queue = DropQueue::new(INTERVAL);
        let first = queue.enqueue("A");
        assert!(queue.enqueue("B").permit.is_none());
        assert!(queue.enqueue("C").permit.is_none());
        let permit = first.permit.expect("first enqueue starts the drain");

        let mut spawned = Vec::new();
        let served = permit
            .run(|request| spawned.push((request.participant, Instant::now())))
            .await;

        assert_eq!(served, 3);
        let names: Vec<_> = spawned.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["A", "B", "C"]);
        for pair in spawned.windows(2) {
            assert!(pair[1].1 > pair[0].1);
            assert!(pair[1].1 - pair[0].1 >= INTERVAL);
        }
        assert!(!queue.is_draining());
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_arrival_during_drain_extends_same_loop() {
        let queue = DropQueue::new(INTERVAL);
        let permit = queue.enqueue("A").permit.unwrap();
        queue.enqueue("B");

        let spawned = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&spawned);
        let drain = tokio::spawn(permit.run(move |request| {
            sink.lock().unwrap().push(request.participant);
        }));

        // Mid-drain arrival joins the running loop
        tokio::time::sleep(INTERVAL / 2).await;
        assert!(queue.is_draining());
        assert!(queue.enqueue("C").permit.is_none());

        let served = drain.await.unwrap();
        assert_eq!(served, 3);
        assert_eq!(*spawned.lock().unwrap(), ["A", "B", "C"]);
        assert!(!queue.is_draining());
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_loop_after_queue_empties() {
        let queue = DropQueue::new(INTERVAL);
        let permit = queue.enqueue("A").permit.unwrap();
        assert_eq!(permit.run(|_| {}).await, 1);

        let again = queue.enqueue("B");
        assert_eq!(again.seq, 1);
        assert!(again.permit.is_some());
    }

    #[test]
    fn test_dropped_permit_releases_flag() {
        let queue = DropQueue::new(INTERVAL);
        let permit = queue.enqueue("A").permit.unwrap();
        assert!(queue.is_draining());
        drop(permit);
        assert!(!queue.is_draining());
        // The stranded request is picked up by the next loop
        let next = queue.enqueue("B");
        assert!(next.permit.is_some());
        assert_eq!(queue.len(), 2);
    }
}
