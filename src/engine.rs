//! Engine wiring
//!
//! `Engine` is the tick side: it owns the world, applies spawn requests at
//! tick boundaries, steps the simulation and dispatches scoring.
//! `Ingestor` is the inbound side: it pulls deliveries off event sources,
//! feeds the drop queue, applies admin commands and starts drain loops.
//! The two halves share the ledger and talk through a spawn channel, so
//! producers never touch the world mid-step.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use crate::admin::{AdminOutcome, GiftNotice};
use crate::error::{ConfigError, EventError};
use crate::events::{EventSource, Stream, Subscriptions, parse_admin, parse_drop};
use crate::leaderboard::{Leaderboard, RankBy};
use crate::ledger::{Ledger, LedgerStore};
use crate::queue::{DrainPermit, DropQueue, DropRequest};
use crate::scoring::{Dispatch, ScoreOutcome, ScoringDispatcher};
use crate::settings::Settings;
use crate::sim::{SpawnRequest, TickInput, World, generate_board, tick};

/// Capacity of the outcome and gift broadcast channels
const BROADCAST_CAPACITY: usize = 256;

/// Republishes the ranked snapshot after ledger mutations
#[derive(Debug, Clone)]
pub struct LeaderboardPublisher {
    tx: Arc<watch::Sender<Leaderboard>>,
    size: usize,
    by: RankBy,
}

impl LeaderboardPublisher {
    fn new(size: usize, by: RankBy) -> Self {
        let (tx, _) = watch::channel(Leaderboard::default());
        Self {
            tx: Arc::new(tx),
            size,
            by,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Leaderboard> {
        self.tx.subscribe()
    }

    /// Recompute from the ledger and publish
    pub fn publish<S: LedgerStore>(&self, ledger: &Ledger<S>) {
        match ledger.top_n(self.size, self.by) {
            Ok(board) => {
                self.tx.send_replace(board);
            }
            Err(e) => log::warn!("Leaderboard refresh failed: {e}"),
        }
    }
}

/// What one engine tick did
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// Spawn requests applied at the start of this tick
    pub spawned: Vec<SpawnRequest>,
    /// Balls that scored this tick
    pub outcomes: Vec<ScoreOutcome>,
    /// Balls removed by the escape guard this tick
    pub escaped: usize,
    /// Scores dropped because the ledger write failed
    pub failed: usize,
    /// Whether any ledger row changed
    pub ledger_changed: bool,
}

/// Tick side: world, scoring and spawn intake
pub struct Engine<S> {
    world: World,
    ledger: Arc<Ledger<S>>,
    dispatcher: ScoringDispatcher,
    spawns: mpsc::UnboundedReceiver<SpawnRequest>,
    publisher: LeaderboardPublisher,
}

impl<S: LedgerStore + 'static> Engine<S> {
    /// Validate settings and build both halves around a shared ledger
    pub fn build(
        settings: &Settings,
        ledger: Arc<Ledger<S>>,
    ) -> Result<(Engine<S>, Ingestor<S>), ConfigError> {
        settings.validate()?;
        let board = generate_board(&settings.board)?;
        let world = World::new(board, settings.physics.clone());

        let (spawn_tx, spawn_rx) = mpsc::unbounded_channel();
        let (outcome_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (gift_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let publisher =
            LeaderboardPublisher::new(settings.ledger.leaderboard_size, settings.ledger.rank_by);
        publisher.publish(&ledger);

        log::info!(
            "Engine ready: {} pegs, {} buckets, spawn every {}ms",
            world.board.pegs.len(),
            world.board.buckets.len(),
            settings.queue.spawn_interval_ms
        );

        let engine = Engine {
            world,
            ledger: Arc::clone(&ledger),
            dispatcher: ScoringDispatcher::new(outcome_tx),
            spawns: spawn_rx,
            publisher: publisher.clone(),
        };
        let ingestor = Ingestor {
            queue: DropQueue::new(settings.queue.spawn_interval()),
            ledger,
            spawn_tx,
            subscriptions: Subscriptions::new(),
            publisher,
            gifts: gift_tx,
        };
        Ok((engine, ingestor))
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn ledger(&self) -> &Arc<Ledger<S>> {
        &self.ledger
    }

    pub fn outcomes(&self) -> broadcast::Receiver<ScoreOutcome> {
        self.dispatcher.subscribe()
    }

    pub fn leaderboard(&self) -> watch::Receiver<Leaderboard> {
        self.publisher.subscribe()
    }

    /// Run one fixed step
    ///
    /// A failed ledger write drops that one score (it is logged); the tick
    /// itself always completes.
    pub fn tick(&mut self, dt: f32) -> TickReport {
        let mut report = TickReport::default();
        let mut input = TickInput::default();
        while let Ok(request) = self.spawns.try_recv() {
            input.spawns.push(request);
        }

        let events = tick(&mut self.world, &input, dt);
        report.spawned = input.spawns;

        for event in &events {
            match self.dispatcher.dispatch(&self.world.board, &self.ledger, event) {
                Ok(Dispatch::Scored { outcome, .. }) => {
                    report.ledger_changed = true;
                    report.outcomes.push(outcome);
                }
                Ok(Dispatch::Escaped) => report.escaped += 1,
                Ok(Dispatch::Declined { .. } | Dispatch::Unowned | Dispatch::UnknownBucket(_)) => {}
                Err(e) => {
                    let ball = event.ball();
                    log::error!("Score for ball {} ({:?}) dropped: {e}", ball.id.0, ball.owner);
                    report.failed += 1;
                }
            }
        }

        if report.ledger_changed {
            self.publisher.publish(&self.ledger);
        }
        report
    }

    /// Live balls
    pub fn balls_in_flight(&self) -> usize {
        self.world.ball_count()
    }
}

/// What one pump of a source did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub drops: usize,
    pub admin_applied: usize,
    pub gifts: usize,
    pub malformed: usize,
    pub failed: usize,
    pub ledger_changed: bool,
}

/// Inbound side: sources, drop queue and admin commands
pub struct Ingestor<S> {
    queue: DropQueue,
    ledger: Arc<Ledger<S>>,
    spawn_tx: mpsc::UnboundedSender<SpawnRequest>,
    subscriptions: Subscriptions,
    publisher: LeaderboardPublisher,
    gifts: broadcast::Sender<GiftNotice>,
}

impl<S: LedgerStore + 'static> Ingestor<S> {
    /// Register a source's stream; each stream may be subscribed once
    pub fn subscribe(&mut self, source: &dyn EventSource) -> Result<(), EventError> {
        self.subscriptions.subscribe(source.stream())
    }

    pub fn queue(&self) -> &DropQueue {
        &self.queue
    }

    pub fn gifts(&self) -> broadcast::Receiver<GiftNotice> {
        self.gifts.subscribe()
    }

    /// Drain every ready delivery from `source`
    ///
    /// Each delivery is acknowledged as soon as it has been handled locally
    /// (queued, applied, or discarded as malformed), before any ball is
    /// spawned for it. Must be called inside a tokio runtime.
    pub fn pump(&mut self, source: &mut dyn EventSource) -> Result<IngestReport, EventError> {
        let stream = source.stream();
        if !self.subscriptions.is_subscribed(stream) {
            return Err(EventError::NotSubscribed(stream));
        }

        let mut report = IngestReport::default();
        while let Some(delivery) = source.poll_delivery() {
            match stream {
                Stream::Drops => {
                    let Some(name) = parse_drop(&delivery.payload) else {
                        log::warn!("Malformed drop event dropped: {}", delivery.payload);
                        source.acknowledge(delivery.id);
                        report.malformed += 1;
                        continue;
                    };
                    let enqueued = self.queue.enqueue(name);
                    source.acknowledge(delivery.id);
                    report.drops += 1;
                    if let Some(permit) = enqueued.permit {
                        self.start_drain(permit);
                    }
                }
                Stream::Admin => {
                    let command = parse_admin(&delivery.payload);
                    source.acknowledge(delivery.id);
                    let Some(command) = command else {
                        log::warn!("Malformed admin event dropped: {}", delivery.payload);
                        report.malformed += 1;
                        continue;
                    };
                    match self.ledger.apply_admin(&command) {
                        Ok(AdminOutcome::Applied(_)) => {
                            report.admin_applied += 1;
                            report.ledger_changed = true;
                        }
                        Ok(AdminOutcome::Gift(notice)) => {
                            report.gifts += 1;
                            if self.gifts.send(notice).is_err() {
                                log::debug!("No gift listeners");
                            }
                        }
                        Ok(AdminOutcome::Skipped) => {}
                        Err(e) => {
                            log::error!("Admin command {command:?} dropped: {e}");
                            report.failed += 1;
                        }
                    }
                }
            }
        }

        if report.ledger_changed {
            self.publisher.publish(&self.ledger);
        }
        Ok(report)
    }

    /// Run a drain loop on the runtime, forwarding requests to the engine
    fn start_drain(&self, permit: DrainPermit) {
        let spawn_tx = self.spawn_tx.clone();
        tokio::spawn(permit.run(move |request: DropRequest| {
            let spawn = SpawnRequest {
                owner: request.participant,
                seq: request.seq,
            };
            if spawn_tx.send(spawn).is_err() {
                log::warn!("Engine stopped; drop #{} discarded", request.seq);
            }
        }));
    }
}
