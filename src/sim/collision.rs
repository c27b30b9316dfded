//! Collision detection and response
//!
//! Balls are circles. Static geometry is circles (pegs) and line segments
//! (walls). Bucket zones are axis-aligned rectangles that only report
//! overlap and never push back.

use glam::Vec2;

use super::board::{Bucket, Segment};

/// Result of a collision check
#[derive(Debug, Clone)]
pub struct CollisionResult {
    /// Whether a collision occurred
    pub hit: bool,
    /// Surface normal at contact, pointing toward the ball center
    pub normal: Vec2,
    /// Penetration depth (for position correction)
    pub penetration: f32,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            normal: Vec2::ZERO,
            penetration: 0.0,
        }
    }
}

/// Check collision between a ball and a static circle (peg)
pub fn ball_circle_collision(
    ball_pos: Vec2,
    ball_radius: f32,
    center: Vec2,
    radius: f32,
) -> CollisionResult {
    let offset = ball_pos - center;
    let dist = offset.length();
    let reach = ball_radius + radius;

    if dist >= reach {
        return CollisionResult::miss();
    }

    // Concentric: push straight up
    let normal = if dist > f32::EPSILON {
        offset / dist
    } else {
        Vec2::NEG_Y
    };

    CollisionResult {
        hit: true,
        normal,
        penetration: reach - dist,
    }
}

/// Check collision between a ball and a wall segment
pub fn ball_segment_collision(ball_pos: Vec2, ball_radius: f32, segment: &Segment) -> CollisionResult {
    let closest = segment.closest_point(ball_pos);
    let offset = ball_pos - closest;
    let dist = offset.length();

    if dist >= ball_radius {
        return CollisionResult::miss();
    }

    let normal = if dist > f32::EPSILON {
        offset / dist
    } else {
        // Center exactly on the line: use the segment's left-hand normal
        let dir = (segment.b - segment.a).normalize_or_zero();
        Vec2::new(-dir.y, dir.x)
    };

    CollisionResult {
        hit: true,
        normal,
        penetration: ball_radius - dist,
    }
}

/// Whether a ball overlaps a bucket's sensor rectangle
pub fn ball_zone_overlap(ball_pos: Vec2, ball_radius: f32, bucket: &Bucket) -> bool {
    let closest = ball_pos.clamp(bucket.min, bucket.max);
    (ball_pos - closest).length_squared() < ball_radius * ball_radius
}

/// Bounce velocity off a surface with restitution and surface friction
///
/// Only the inbound normal component is reflected (scaled by
/// `restitution`); the tangential component loses `friction` of its
/// magnitude. A ball already separating is left alone.
pub fn bounce_velocity(velocity: Vec2, normal: Vec2, restitution: f32, friction: f32) -> Vec2 {
    let vn = velocity.dot(normal);
    if vn >= 0.0 {
        return velocity;
    }
    let normal_part = normal * vn;
    let tangent_part = velocity - normal_part;
    tangent_part * (1.0 - friction) - normal_part * restitution
}
