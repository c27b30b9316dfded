//! Fixed timestep simulation tick
//!
//! Advances the world by one step: apply queued spawns, integrate, resolve
//! static and ball-ball contacts, then check sensors and the escape guard.
//! A ball that reaches a bucket or escapes is removed in the same step its
//! event is emitted, so it can never trigger a second event.

use glam::Vec2;

use super::board::{BoardLayout, BucketId};
use super::collision::{
    ball_circle_collision, ball_segment_collision, ball_zone_overlap, bounce_velocity,
};
use super::state::{Ball, SpawnRequest, World, WorldEvent};

/// Input for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Balls to insert before integrating, in order
    pub spawns: Vec<SpawnRequest>,
}

/// Advance the world by one fixed timestep, returning terminal ball events
pub fn tick(world: &mut World, input: &TickInput, dt: f32) -> Vec<WorldEvent> {
    // Insertion only happens here, never mid-integration
    for request in &input.spawns {
        world.spawn_ball(request.owner.clone());
    }

    world.time_ticks += 1;

    let gravity = Vec2::new(0.0, world.physics.gravity);
    let max_speed = world.physics.max_speed;

    for ball in &mut world.balls {
        ball.age_ticks += 1;
        ball.vel += gravity * dt;
        // Air friction is specified per 1/60 s
        ball.vel *= (1.0 - ball.air_friction).powf(dt * 60.0);
        ball.vel = ball.vel.clamp_length_max(max_speed);
        ball.pos += ball.vel * dt;
    }

    let mut in_contact = vec![false; world.balls.len()];
    for (ball, touching) in world.balls.iter_mut().zip(in_contact.iter_mut()) {
        *touching = resolve_static_contacts(ball, &world.board);
    }
    resolve_ball_contacts(&mut world.balls, &mut in_contact);
    nudge_resting_balls(world, &in_contact);

    collect_terminal_events(world)
}

/// Push a ball out of pegs and walls; returns whether anything was touched
fn resolve_static_contacts(ball: &mut Ball, board: &BoardLayout) -> bool {
    let mut touched = false;

    for peg in &board.pegs {
        let hit = ball_circle_collision(ball.pos, ball.radius, peg.pos, peg.radius);
        if hit.hit {
            ball.pos += hit.normal * hit.penetration;
            let restitution = ball.restitution.max(peg.restitution);
            ball.vel = bounce_velocity(ball.vel, hit.normal, restitution, ball.friction);
            touched = true;
        }
    }

    for wall in &board.walls {
        let hit = ball_segment_collision(ball.pos, ball.radius, &wall.segment);
        if hit.hit {
            ball.pos += hit.normal * hit.penetration;
            ball.vel = bounce_velocity(ball.vel, hit.normal, ball.restitution, ball.friction);
            touched = true;
        }
    }

    touched
}

/// Separate overlapping balls and exchange their normal velocities
fn resolve_ball_contacts(balls: &mut [Ball], in_contact: &mut [bool]) {
    for i in 0..balls.len() {
        let (head, tail) = balls.split_at_mut(i + 1);
        let a = &mut head[i];
        for (offset, b) in tail.iter_mut().enumerate() {
            let hit = ball_circle_collision(a.pos, a.radius, b.pos, b.radius);
            if !hit.hit {
                continue;
            }
            let n = hit.normal;
            let half = hit.penetration / 2.0;
            a.pos += n * half;
            b.pos -= n * half;

            // Equal masses: swap the approaching normal components
            let closing = (a.vel - b.vel).dot(n);
            if closing < 0.0 {
                let restitution = a.restitution.min(b.restitution);
                let impulse = -(1.0 + restitution) * closing / 2.0;
                a.vel += n * impulse;
                b.vel -= n * impulse;
            }

            in_contact[i] = true;
            in_contact[i + 1 + offset] = true;
        }
    }
}

/// Kick balls that have sat still on something for too long
fn nudge_resting_balls(world: &mut World, in_contact: &[bool]) {
    let rest_speed = world.physics.rest_speed;
    let rest_ticks = world.physics.rest_ticks;
    let nudge = world.physics.nudge_speed;

    for idx in 0..world.balls.len() {
        let ball = &mut world.balls[idx];
        if in_contact[idx] && ball.vel.length() < rest_speed {
            ball.resting_ticks += 1;
        } else {
            ball.resting_ticks = 0;
            continue;
        }

        if ball.resting_ticks >= rest_ticks {
            ball.resting_ticks = 0;
            let kick = world.random_symmetric(nudge);
            // Never a zero kick, or an exactly balanced ball stays put
            let kick = if kick.abs() < nudge * 0.25 {
                nudge.copysign(kick)
            } else {
                kick
            };
            log::debug!("Nudging resting ball {}", world.balls[idx].id.0);
            world.balls[idx].vel.x += kick;
        }
    }
}

/// Remove every ball that hit a sensor or tripped the escape guard
fn collect_terminal_events(world: &mut World) -> Vec<WorldEvent> {
    let mut events = Vec::new();
    let margin = world.physics.escape_margin;
    let max_ticks = world.physics.max_ball_ticks;
    let (width, height) = (world.board.width, world.board.height);

    let mut idx = 0;
    while idx < world.balls.len() {
        let ball = &world.balls[idx];

        if let Some(bucket) = sensed_bucket(world, ball) {
            let ball = world.balls.remove(idx);
            events.push(WorldEvent::BallReachedBucket { ball, bucket });
            continue;
        }

        let below = ball.pos.y - ball.radius > height + margin;
        let outside = ball.pos.x < -margin || ball.pos.x > width + margin;
        let expired = ball.age_ticks > max_ticks;
        if below || outside || expired {
            let ball = world.balls.remove(idx);
            log::warn!(
                "Ball {} for {:?} escaped the sensors at ({:.1}, {:.1}) after {} ticks",
                ball.id.0,
                ball.owner,
                ball.pos.x,
                ball.pos.y,
                ball.age_ticks
            );
            events.push(WorldEvent::BallEscaped { ball });
            continue;
        }

        idx += 1;
    }

    events
}

/// The one bucket a ball scores in this step, if any
///
/// A ball straddling a boundary overlaps two zones; the zone whose center is
/// nearest the ball's center wins.
fn sensed_bucket(world: &World, ball: &Ball) -> Option<BucketId> {
    if ball.pos.y + ball.radius <= world.board.sensor_top() {
        return None;
    }
    world
        .board
        .buckets
        .iter()
        .filter(|bucket| ball_zone_overlap(ball.pos, ball.radius, bucket))
        .min_by(|a, b| {
            let da = (a.center_x() - ball.pos.x).abs();
            let db = (b.center_x() - ball.pos.x).abs();
            da.total_cmp(&db)
        })
        .map(|bucket| bucket.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::SIM_DT;
    use crate::sim::board::{BoardConfig, generate_board};
    use crate::sim::state::PhysicsConfig;

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

    fn spawn(owner: &str, seq: u64) -> SpawnRequest {
        SpawnRequest {
            owner: owner.into(),
            seq,
        }
    }

    /// Run until the world is empty or `max` ticks pass
    fn run_until_empty(world: &mut World, max: u32) -> Vec<WorldEvent> {
        let mut events = Vec::new();
        for _ in 0..max {
            events.extend(tick(world, &TickInput::default(), SIM_DT));
            if world.balls.is_empty() {
                break;
            }
        }
        events
    }

    #[test]
    fn test_spawns_applied_at_tick_boundary() {
        let mut world = world(1);
        let input = TickInput {
            spawns: vec![spawn("a", 0), spawn("b", 1)],
        };
        let events = tick(&mut world, &input, SIM_DT);
        assert!(events.is_empty());
        assert_eq!(world.ball_count(), 2);
        assert_eq!(world.balls[0].owner, "a");
        assert_eq!(world.balls[1].owner, "b");
        assert_eq!(world.time_ticks, 1);
    }

    #[test]
    fn test_gravity_pulls_ball_down() {
        let mut world = world(1);
        world.spawn_ball("alice");
        let y0 = world.balls[0].pos.y;
        for _ in 0..10 {
            tick(&mut world, &TickInput::default(), SIM_DT);
        }
        assert!(world.balls[0].pos.y > y0);
        assert!(world.balls[0].vel.y > 0.0);
    }

    #[test]
    fn test_every_ball_removed_exactly_once() {
        let mut world = world(99);
        let input = TickInput {
            spawns: (0..12).map(|i| spawn(&format!("p{i}"), i)).collect(),
        };
        let mut events = tick(&mut world, &input, SIM_DT);
        let max = world.physics.max_ball_ticks + 2;
        events.extend(run_until_empty(&mut world, max));

        assert!(world.balls.is_empty());
        assert_eq!(events.len(), 12);
        let mut ids: Vec<_> = events.iter().map(|e| e.ball().id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 12);
    }

    #[test]
    fn test_ball_dropped_into_sensor_scores_that_bucket() {
        let mut world = world(1);
        let id = world.spawn_ball("alice");
        // Place directly over bucket 8 (the -2 slot), just above the band
        let bucket = world.board.buckets[8].clone();
        {
            let ball = world.balls.iter_mut().find(|b| b.id == id).unwrap();
            ball.pos = Vec2::new(bucket.center_x(), bucket.min.y - ball.radius - 1.0);
            ball.vel = Vec2::new(0.0, 200.0);
        }
        let events = run_until_empty(&mut world, 60);
        assert_eq!(events.len(), 1);
        match &events[0] {
            WorldEvent::BallReachedBucket { ball, bucket: hit } => {
                assert_eq!(ball.owner, "alice");
                assert_eq!(*hit, bucket.id);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert!(world.ball(id).is_none());
    }

    #[test]
    fn test_straddling_ball_scores_one_bucket() {
        let mut world = world(1);
        world.spawn_ball("bob");
        let boundary = world.board.buckets[3].max.x;
        let top = world.board.sensor_top();
        world.balls[0].pos = Vec2::new(boundary + 1.0, top + 10.0);
        world.balls[0].vel = Vec2::ZERO;

        let events = tick(&mut world, &TickInput::default(), SIM_DT);
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            WorldEvent::BallReachedBucket { bucket: BucketId(4), .. }
        ));
        // Nothing left to trigger again
        assert!(tick(&mut world, &TickInput::default(), SIM_DT).is_empty());
    }

    #[test]
    fn test_escape_guard_below_board() {
        let mut world = world(1);
        world.spawn_ball("ghost");
        world.balls[0].pos = Vec2::new(300.0, 10_000.0);
        let events = tick(&mut world, &TickInput::default(), SIM_DT);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WorldEvent::BallEscaped { .. }));
        assert!(world.balls.is_empty());
    }

    #[test]
    fn test_escape_guard_lifetime() {
        let mut world = world(1);
        world.physics.max_ball_ticks = 5;
        // Far above the board so nothing else can end its life first
        world.spawn_ball("stuck");
        world.balls[0].pos = Vec2::new(300.0, -5_000.0);
        world.physics.escape_margin = 10_000.0;

        let mut events = Vec::new();
        for _ in 0..6 {
            events.extend(tick(&mut world, &TickInput::default(), SIM_DT));
        }
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], WorldEvent::BallEscaped { .. }));
    }

    #[test]
    fn test_ball_bounces_off_peg() {
        let mut world = world(1);
        world.spawn_ball("alice");
        let peg = world.board.pegs[0];
        world.balls[0].pos = peg.pos - Vec2::new(0.0, peg.radius + world.balls[0].radius - 1.0);
        world.balls[0].vel = Vec2::new(0.0, 100.0);

        tick(&mut world, &TickInput::default(), SIM_DT);
        let ball = &world.balls[0];
        assert!(ball.vel.y < 0.0, "ball should rebound, vel={:?}", ball.vel);
        assert!((ball.pos - peg.pos).length() >= peg.radius + ball.radius - 0.001);
    }

    #[test]
    fn test_walls_contain_ball() {
        let mut world = world(1);
        world.spawn_ball("alice");
        world.balls[0].pos = Vec2::new(10.0, 300.0);
        world.balls[0].vel = Vec2::new(-300.0, 0.0);
        for _ in 0..5 {
            tick(&mut world, &TickInput::default(), SIM_DT);
        }
        assert!(world.balls[0].pos.x >= world.balls[0].radius - 0.001);
    }

    #[test]
    fn test_ball_pair_separates() {
        let mut world = world(1);
        world.spawn_ball("a");
        world.spawn_ball("b");
        world.balls[0].pos = Vec2::new(300.0, 300.0);
        world.balls[1].pos = Vec2::new(304.0, 300.0);
        world.balls[0].vel = Vec2::ZERO;
        world.balls[1].vel = Vec2::ZERO;
        tick(&mut world, &TickInput::default(), SIM_DT);
        let gap = (world.balls[1].pos - world.balls[0].pos).length();
        assert!(gap > 4.0);
    }

    #[test]
    fn test_determinism() {
        // Two worlds with the same seed should produce identical results
        let mut w1 = world(2024);
        let mut w2 = world(2024);
        let input = TickInput {
            spawns: vec![spawn("a", 0), spawn("b", 1), spawn("c", 2)],
        };
        let mut e1 = tick(&mut w1, &input, SIM_DT);
        let mut e2 = tick(&mut w2, &input, SIM_DT);
        e1.extend(run_until_empty(&mut w1, 3000));
        e2.extend(run_until_empty(&mut w2, 3000));
        assert_eq!(e1, e2);
        assert_eq!(w1.time_ticks, w2.time_ticks);
    }
}
