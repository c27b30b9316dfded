//! Plinko engine - headless driver
//!
//! Reads inbound events as JSON lines on stdin, one per line:
//! `{"stream": "drops", "payload": {"username": "alice"}}`. Score outcomes
//! are written to stdout as JSON lines; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{Instant, MissedTickBehavior};

use plinko_engine::consts::{MAX_SUBSTEPS, SIM_DT};
use plinko_engine::events::{MemorySource, Stream};
use plinko_engine::ledger::MemoryStore;
use plinko_engine::persistence::{load_snapshot, save_snapshot};
use plinko_engine::{Engine, Ledger, Settings};

/// One stdin line
#[derive(Debug, Deserialize)]
struct InboundLine {
    stream: Stream,
    payload: Value,
}

fn settings_path() -> PathBuf {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PLINKO_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("plinko.json"))
}

/// Minimum time between ledger saves while events keep arriving
const SAVE_INTERVAL: Duration = Duration::from_secs(1);

/// Write a snapshot on the blocking pool
async fn save(store: &MemoryStore, path: Option<&PathBuf>) {
    let Some(path) = path.cloned() else {
        return;
    };
    let snapshot = store.snapshot();
    let target = path.display().to_string();
    match tokio::task::spawn_blocking(move || save_snapshot(&path, &snapshot)).await {
        Ok(Ok(())) => log::debug!("Ledger saved to {target}"),
        Ok(Err(e)) => log::error!("Failed to save ledger to {target}: {e}"),
        Err(e) => log::error!("Ledger save task failed: {e}"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Plinko engine starting...");

    let settings = Settings::load(&settings_path())?;
    settings.validate()?;
    let snapshot_path = settings.ledger.snapshot_path.clone();

    let store = match snapshot_path.as_deref() {
        Some(path) => match load_snapshot(path)? {
            Some(snapshot) => {
                log::info!(
                    "Restored {} accounts from {}",
                    snapshot.accounts.len(),
                    path.display()
                );
                MemoryStore::from_snapshot(snapshot)
            }
            None => MemoryStore::new(),
        },
        None => MemoryStore::new(),
    };
    let ledger = Arc::new(
        Ledger::new(store, settings.ledger.new_accounts)
            .with_max_retries(settings.ledger.max_retries),
    );

    let (mut engine, mut ingestor) = Engine::build(&settings, Arc::clone(&ledger))?;
    let mut drops = MemorySource::new(Stream::Drops);
    let mut admin = MemorySource::new(Stream::Admin);
    ingestor.subscribe(&drops)?;
    ingestor.subscribe(&admin)?;

    // Outcomes and gifts go to stdout for whatever presents them
    let mut outcomes = engine.outcomes();
    let mut gifts = ingestor.gifts();
    tokio::spawn(async move {
        loop {
            let line = tokio::select! {
                outcome = outcomes.recv() => match outcome {
                    Ok(outcome) => serde_json::to_string(&outcome),
                    Err(RecvError::Lagged(n)) => {
                        log::warn!("Output lagged; {n} outcomes skipped");
                        continue;
                    }
                    Err(_) => break,
                },
                gift = gifts.recv() => match gift {
                    Ok(gift) => serde_json::to_string(&gift),
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                },
            };
            match line {
                Ok(line) => println!("{line}"),
                Err(e) => log::warn!("Failed to encode output: {e}"),
            }
        }
    });

    let mut leaderboard = engine.leaderboard();
    tokio::spawn(async move {
        while leaderboard.changed().await.is_ok() {
            let board = leaderboard.borrow_and_update().clone();
            if let Some(leader) = board.leader() {
                log::info!("Leader: {} ({})", leader.name, leader.value);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut interval = tokio::time::interval(Duration::from_secs_f32(SIM_DT));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last = Instant::now();
    let mut accumulator = 0.0_f32;

    let mut save_timer = tokio::time::interval(SAVE_INTERVAL);
    save_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut unsaved = false;

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    log::info!("Plinko engine running!");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = Instant::now();
                accumulator += now.duration_since(last).as_secs_f32();
                last = now;

                let mut substeps = 0;
                while accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
                    unsaved |= engine.tick(SIM_DT).ledger_changed;
                    accumulator -= SIM_DT;
                    substeps += 1;
                }
                // Don't spiral after a stall
                if substeps == MAX_SUBSTEPS {
                    accumulator = 0.0;
                }
            }
            _ = save_timer.tick(), if unsaved => {
                save(ledger.store(), snapshot_path.as_ref()).await;
                unsaved = false;
            }
            line = lines.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        log::info!("Input closed; balls in flight will still settle");
                        stdin_open = false;
                        continue;
                    }
                    Err(e) => {
                        log::error!("Failed to read input: {e}");
                        stdin_open = false;
                        continue;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                let inbound: InboundLine = match serde_json::from_str(&line) {
                    Ok(inbound) => inbound,
                    Err(e) => {
                        log::warn!("Ignoring input line: {e}");
                        continue;
                    }
                };
                let source: &mut MemorySource = match inbound.stream {
                    Stream::Drops => &mut drops,
                    Stream::Admin => &mut admin,
                };
                source.push(inbound.payload);
                unsaved |= ingestor.pump(source)?.ledger_changed;
            }
            signal = &mut shutdown => {
                if let Err(e) = signal {
                    log::error!("Failed to listen for Ctrl-C: {e}");
                }
                log::info!("Shutting down");
                break;
            }
        }
    }

    save(ledger.store(), snapshot_path.as_ref()).await;
    log::info!("{} balls still in flight at shutdown", engine.balls_in_flight());
    Ok(())
}
