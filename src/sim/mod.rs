//! Deterministic board simulation
//!
//! Board geometry, physics stepping and sensor detection live here:
//! - Fixed timestep only
//! - Seeded RNG only
//! - Stable iteration order (by ball ID)
//! - No ledger, queue or I/O dependencies

pub mod board;
pub mod collision;
pub mod state;
pub mod tick;

pub use board::{
    BoardConfig, BoardLayout, Bucket, BucketId, FunnelConfig, Peg, Segment, Wall, WallKind,
    generate_board,
};
pub use collision::{CollisionResult, ball_circle_collision, ball_segment_collision};
pub use state::{Ball, BallId, BallParams, PhysicsConfig, SpawnRequest, World, WorldEvent};
pub use tick::{TickInput, tick};
