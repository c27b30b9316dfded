//! World state and core simulation types
//!
//! The `World` owns everything a running board needs: the static layout,
//! physics parameters, live balls and the seeded RNG used for spawn jitter.
//! There is no global state; tests build as many worlds as they like.

use glam::Vec2;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::board::{BoardLayout, BucketId};
use crate::consts::*;
use crate::error::ConfigError;

/// Ball physical parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BallParams {
    pub radius: f32,
    /// Bounciness (0 = dead stop, 1 = perfectly elastic)
    pub restitution: f32,
    /// Fraction of tangential speed lost per contact
    pub friction: f32,
    /// Fraction of speed lost per 1/60 s of flight
    pub air_friction: f32,
}

impl Default for BallParams {
    fn default() -> Self {
        Self {
            radius: BALL_RADIUS,
            restitution: BALL_RESTITUTION,
            friction: BALL_FRICTION,
            air_friction: BALL_AIR_FRICTION,
        }
    }
}

/// Physics tuning, loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    /// Downward acceleration, px/s²
    pub gravity: f32,
    pub ball: BallParams,
    /// Spawn x; `None` means the board center
    pub spawn_x: Option<f32>,
    pub spawn_y: f32,
    /// Max horizontal spawn offset either side of `spawn_x`
    pub spawn_jitter: f32,
    /// Max horizontal velocity kick, px/s (on spawn and when resting)
    pub nudge_speed: f32,
    /// Speed cap, px/s (keeps per-step travel below peg size)
    pub max_speed: f32,
    /// A ball slower than this while touching something counts as resting
    pub rest_speed: f32,
    /// Ticks a ball may rest before it is nudged
    pub rest_ticks: u32,
    /// Distance outside the board before the escape guard fires
    pub escape_margin: f32,
    /// Hard lifetime cap in ticks
    pub max_ball_ticks: u32,
    /// RNG seed for spawn jitter and nudges
    pub seed: u64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            ball: BallParams::default(),
            spawn_x: None,
            spawn_y: SPAWN_Y,
            spawn_jitter: SPAWN_JITTER,
            nudge_speed: NUDGE_SPEED,
            max_speed: BALL_MAX_SPEED,
            rest_speed: REST_SPEED,
            rest_ticks: REST_TICKS,
            escape_margin: ESCAPE_MARGIN,
            max_ball_ticks: MAX_BALL_TICKS,
            seed: 0x5EED,
        }
    }
}

impl PhysicsConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidPhysics(msg));

        if !(self.gravity > 0.0) {
            return invalid(format!("gravity must be positive, got {}", self.gravity));
        }
        if !(self.ball.radius > 0.0) {
            return invalid(format!("ball radius must be positive, got {}", self.ball.radius));
        }
        for (name, value) in [
            ("restitution", self.ball.restitution),
            ("friction", self.ball.friction),
            ("air_friction", self.ball.air_friction),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return invalid(format!("ball {name} {value} outside 0..=1"));
            }
        }
        if !(self.max_speed > 0.0) {
            return invalid("max_speed must be positive".into());
        }
        if self.spawn_jitter < 0.0 || self.nudge_speed < 0.0 {
            return invalid("spawn_jitter and nudge_speed must not be negative".into());
        }
        if self.max_ball_ticks == 0 {
            return invalid("max_ball_ticks must be at least 1".into());
        }
        Ok(())
    }
}

/// Identifier of a live ball, unique within a world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BallId(pub u32);

/// A ball entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ball {
    pub id: BallId,
    /// Participant this ball scores for
    pub owner: String,
    pub pos: Vec2,
    pub vel: Vec2,
    pub radius: f32,
    pub restitution: f32,
    pub friction: f32,
    pub air_friction: f32,
    /// Ticks since spawn
    pub age_ticks: u32,
    /// Consecutive ticks spent resting
    pub resting_ticks: u32,
}

impl Ball {
    pub fn new(id: BallId, owner: impl Into<String>, pos: Vec2, params: &BallParams) -> Self {
        Self {
            id,
            owner: owner.into(),
            pos,
            vel: Vec2::ZERO,
            radius: params.radius,
            restitution: params.restitution,
            friction: params.friction,
            air_friction: params.air_friction,
            age_ticks: 0,
            resting_ticks: 0,
        }
    }
}

/// A request to insert a ball at the next tick boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnRequest {
    pub owner: String,
    /// Arrival sequence number from the drop queue
    pub seq: u64,
}

/// Why a ball left the world
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WorldEvent {
    /// First bucket overlap; the ball has already been removed
    BallReachedBucket { ball: Ball, bucket: BucketId },
    /// Escape guard removal; never scored
    BallEscaped { ball: Ball },
}

impl WorldEvent {
    pub fn ball(&self) -> &Ball {
        match self {
            WorldEvent::BallReachedBucket { ball, .. } | WorldEvent::BallEscaped { ball } => ball,
        }
    }
}

/// A running board
#[derive(Debug, Clone)]
pub struct World {
    pub board: BoardLayout,
    pub physics: PhysicsConfig,
    /// Live balls (sorted by id)
    pub balls: Vec<Ball>,
    /// Simulation tick counter
    pub time_ticks: u64,
    rng: Pcg32,
    next_id: u32,
}

impl World {
    pub fn new(board: BoardLayout, physics: PhysicsConfig) -> Self {
        let rng = Pcg32::seed_from_u64(physics.seed);
        Self {
            board,
            physics,
            balls: Vec::new(),
            time_ticks: 0,
            rng,
            next_id: 1,
        }
    }

    /// Allocate a new ball ID
    fn next_ball_id(&mut self) -> BallId {
        let id = BallId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Insert a ball for `owner` at the drop point with random jitter
    ///
    /// Only call this between ticks; `tick` does so for queued requests.
    pub fn spawn_ball(&mut self, owner: impl Into<String>) -> BallId {
        let id = self.next_ball_id();
        let center = self.physics.spawn_x.unwrap_or(self.board.width / 2.0);
        let jitter = self.physics.spawn_jitter;
        let x = center + self.random_symmetric(jitter);
        let pos = Vec2::new(x, self.physics.spawn_y);

        let mut ball = Ball::new(id, owner, pos, &self.physics.ball);
        ball.vel.x = self.random_symmetric(self.physics.nudge_speed);

        log::debug!("Spawned ball {} for {:?} at x={:.1}", id.0, ball.owner, x);
        self.balls.push(ball);
        id
    }

    /// Remove a ball, returning it if it was still live
    pub fn remove_ball(&mut self, id: BallId) -> Option<Ball> {
        let idx = self.balls.iter().position(|b| b.id == id)?;
        Some(self.balls.remove(idx))
    }

    pub fn ball(&self, id: BallId) -> Option<&Ball> {
        self.balls.iter().find(|b| b.id == id)
    }

    pub fn ball_count(&self) -> usize {
        self.balls.len()
    }

    /// Uniform sample in [-limit, limit]
    pub(crate) fn random_symmetric(&mut self, limit: f32) -> f32 {
        if limit > 0.0 {
            self.rng.random_range(-limit..=limit)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::board::{BoardConfig, generate_board};

    fn world(seed: u64) -> World {
        let board = generate_board(&BoardConfig::default()).unwrap();
        World::new(
            board,
            PhysicsConfig {
                seed,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_spawn_near_center_with_jitter() {
        let mut world = world(7);
        for i in 0..50 {
            world.spawn_ball(format!("p{i}"));
        }
        for ball in &world.balls {
            assert!((ball.pos.x - 300.0).abs() <= SPAWN_JITTER);
            assert_eq!(ball.pos.y, SPAWN_Y);
            assert!(ball.vel.x.abs() <= NUDGE_SPEED);
        }
        // Not every ball on the same column
        let first = world.balls[0].pos.x;
        assert!(world.balls.iter().any(|b| b.pos.x != first));
    }

    #[test]
    fn test_ball_ids_unique_and_increasing() {
        let mut world = world(1);
        let a = world.spawn_ball("a");
        let b = world.spawn_ball("b");
        assert!(b > a);
        assert_eq!(world.ball(a).unwrap().owner, "a");
    }

    #[test]
    fn test_remove_ball_once() {
        let mut world = world(1);
        let id = world.spawn_ball("alice");
        assert!(world.remove_ball(id).is_some());
        assert!(world.remove_ball(id).is_none());
        assert_eq!(world.ball_count(), 0);
    }

    #[test]
    fn test_independent_worlds() {
        let mut a = world(42);
        let mut b = world(42);
        a.spawn_ball("x");
        assert_eq!(a.ball_count(), 1);
        assert_eq!(b.ball_count(), 0);
        b.spawn_ball("x");
        // Same seed, same jitter
        assert_eq!(a.balls[0].pos, b.balls[0].pos);
    }

    #[test]
    fn test_physics_validation() {
        assert!(PhysicsConfig::default().validate().is_ok());
        let bad = PhysicsConfig {
            gravity: -1.0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let bad_ball = PhysicsConfig {
            ball: BallParams {
                restitution: 1.5,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(bad_ball.validate().is_err());
    }
}
