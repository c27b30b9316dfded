//! Board layout generation
//!
//! Turns a small `BoardConfig` into the full static geometry: the peg
//! lattice, boundary and funnel walls, and the bucket sensor zones along the
//! bottom edge. Pure and deterministic; no RNG is involved.
//!
//! Coordinates are screen space: origin top-left, +y points down.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::error::ConfigError;

/// Angled walls near the top that steer balls toward the center
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunnelConfig {
    /// Y where each funnel wall leaves its boundary wall
    pub top_y: f32,
    /// Downward angle from horizontal, in degrees (0 < angle < 90)
    pub angle_deg: f32,
    /// Length of each funnel wall
    pub length: f32,
}

impl Default for FunnelConfig {
    fn default() -> Self {
        Self {
            top_y: 40.0,
            angle_deg: 30.0,
            length: 120.0,
        }
    }
}

/// Static board description, loaded once at startup
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    pub width: f32,
    pub height: f32,
    /// Number of peg rows
    pub rows: u32,
    /// Pegs in the first row; row `i` has `i + first_row_pegs` pegs
    pub first_row_pegs: u32,
    /// Y of the first peg row
    pub top_row_y: f32,
    pub spacing_x: f32,
    pub spacing_y: f32,
    pub peg_radius: f32,
    pub peg_restitution: f32,
    /// Height of the sensor band along the bottom edge
    pub bucket_height: f32,
    pub funnel: Option<FunnelConfig>,
    /// Point value per bucket, left to right
    pub bucket_values: Vec<i64>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            width: BOARD_WIDTH,
            height: BOARD_HEIGHT,
            rows: PEG_ROWS,
            first_row_pegs: 1,
            top_row_y: PEG_TOP_ROW_Y,
            spacing_x: PEG_SPACING,
            spacing_y: PEG_SPACING,
            peg_radius: PEG_RADIUS,
            peg_restitution: PEG_RESTITUTION,
            bucket_height: BUCKET_HEIGHT,
            funnel: Some(FunnelConfig::default()),
            bucket_values: DEFAULT_BUCKET_VALUES.to_vec(),
        }
    }
}

impl BoardConfig {
    /// Horizontal center of the board
    pub fn center_x(&self) -> f32 {
        self.width / 2.0
    }

    /// Y of the top of the bucket sensor band
    pub fn sensor_top(&self) -> f32 {
        self.height - self.bucket_height
    }

    /// Reject configs that cannot produce a sealed, playable board
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::InvalidBoard(msg));

        if !(self.width > 0.0 && self.height > 0.0) {
            return invalid(format!("board size must be positive, got {}x{}", self.width, self.height));
        }
        if self.bucket_values.is_empty() {
            return invalid("at least one bucket value is required".into());
        }
        if self.first_row_pegs == 0 {
            return invalid("first_row_pegs must be at least 1".into());
        }
        if !(self.spacing_x > 0.0 && self.spacing_y > 0.0 && self.peg_radius > 0.0) {
            return invalid("peg spacing and radius must be positive".into());
        }
        if !(self.bucket_height > 0.0 && self.bucket_height < self.height) {
            return invalid(format!("bucket_height {} must lie inside the board", self.bucket_height));
        }
        if !(0.0..=1.0).contains(&self.peg_restitution) {
            return invalid(format!("peg_restitution {} outside 0..=1", self.peg_restitution));
        }

        if self.rows > 0 {
            let widest = (self.rows - 1 + self.first_row_pegs) as f32;
            let half_span = (widest - 1.0) * self.spacing_x / 2.0 + self.peg_radius;
            if half_span > self.center_x() {
                return invalid(format!(
                    "widest peg row spans {:.1}px but the board is only {:.1}px wide",
                    half_span * 2.0,
                    self.width
                ));
            }
            let lowest = self.top_row_y + (self.rows - 1) as f32 * self.spacing_y;
            if lowest + self.peg_radius >= self.sensor_top() {
                return invalid(format!(
                    "lowest peg row at y={lowest:.1} reaches into the bucket band at y={:.1}",
                    self.sensor_top()
                ));
            }
        }

        if let Some(funnel) = &self.funnel {
            if !(funnel.angle_deg > 0.0 && funnel.angle_deg < 90.0) {
                return invalid(format!("funnel angle {} must be in (0, 90)", funnel.angle_deg));
            }
            let reach = funnel.length * funnel.angle_deg.to_radians().cos();
            if reach >= self.center_x() {
                return invalid("funnel walls would close the drop opening".into());
            }
        }

        Ok(())
    }
}

/// A static circular obstacle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peg {
    pub pos: Vec2,
    pub radius: f32,
    pub restitution: f32,
}

/// Straight line segment used for walls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub a: Vec2,
    pub b: Vec2,
}

impl Segment {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self { a, b }
    }

    /// Closest point on the segment to `p`
    pub fn closest_point(&self, p: Vec2) -> Vec2 {
        let ab = self.b - self.a;
        let len_sq = ab.length_squared();
        if len_sq <= f32::EPSILON {
            return self.a;
        }
        let t = ((p - self.a).dot(ab) / len_sq).clamp(0.0, 1.0);
        self.a + ab * t
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallKind {
    /// Full-height side wall
    Boundary,
    /// Angled wall near the top
    Funnel,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wall {
    pub kind: WallKind,
    pub segment: Segment,
}

/// Index of a bucket within its board (left to right)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketId(pub usize);

/// A scoring sensor zone along the bottom edge
///
/// The point value lives here as typed data; the label is presentation only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub id: BucketId,
    pub label: String,
    pub value: i64,
    /// Top-left corner of the zone
    pub min: Vec2,
    /// Bottom-right corner of the zone
    pub max: Vec2,
}

impl Bucket {
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn center_x(&self) -> f32 {
        (self.min.x + self.max.x) / 2.0
    }
}

/// Complete static geometry for one board
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardLayout {
    pub width: f32,
    pub height: f32,
    pub pegs: Vec<Peg>,
    pub walls: Vec<Wall>,
    pub buckets: Vec<Bucket>,
}

impl BoardLayout {
    pub fn bucket(&self, id: BucketId) -> Option<&Bucket> {
        self.buckets.get(id.0)
    }

    /// Y of the top of the sensor band
    pub fn sensor_top(&self) -> f32 {
        self.buckets.first().map_or(self.height, |b| b.min.y)
    }
}

/// Stable, board-unique label for a bucket
pub fn bucket_label(index: usize) -> String {
    format!("slot-{index:02}")
}

/// Generate the board geometry for a validated config
pub fn generate_board(config: &BoardConfig) -> Result<BoardLayout, ConfigError> {
    config.validate()?;

    let center_x = config.center_x();

    // Peg lattice: each row centered on the board
    let mut pegs = Vec::new();
    for row in 0..config.rows {
        let count = row + config.first_row_pegs;
        let y = config.top_row_y + row as f32 * config.spacing_y;
        let half = (count - 1) as f32 / 2.0;
        for j in 0..count {
            let x = center_x + (j as f32 - half) * config.spacing_x;
            pegs.push(Peg {
                pos: Vec2::new(x, y),
                radius: config.peg_radius,
                restitution: config.peg_restitution,
            });
        }
    }

    let mut walls = vec![
        Wall {
            kind: WallKind::Boundary,
            segment: Segment::new(Vec2::new(0.0, 0.0), Vec2::new(0.0, config.height)),
        },
        Wall {
            kind: WallKind::Boundary,
            segment: Segment::new(
                Vec2::new(config.width, 0.0),
                Vec2::new(config.width, config.height),
            ),
        },
    ];

    if let Some(funnel) = &config.funnel {
        let angle = funnel.angle_deg.to_radians();
        let dx = funnel.length * angle.cos();
        let dy = funnel.length * angle.sin();
        walls.push(Wall {
            kind: WallKind::Funnel,
            segment: Segment::new(
                Vec2::new(0.0, funnel.top_y),
                Vec2::new(dx, funnel.top_y + dy),
            ),
        });
        walls.push(Wall {
            kind: WallKind::Funnel,
            segment: Segment::new(
                Vec2::new(config.width, funnel.top_y),
                Vec2::new(config.width - dx, funnel.top_y + dy),
            ),
        });
    }

    // Buckets partition [0, width] exactly; the last edge is pinned to width
    let n = config.bucket_values.len();
    let zone_width = config.width / n as f32;
    let top = config.sensor_top();
    let buckets = config
        .bucket_values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let min_x = i as f32 * zone_width;
            let max_x = if i + 1 == n {
                config.width
            } else {
                (i + 1) as f32 * zone_width
            };
            Bucket {
                id: BucketId(i),
                label: bucket_label(i),
                value,
                min: Vec2::new(min_x, top),
                max: Vec2::new(max_x, config.height),
            }
        })
        .collect();

    log::debug!(
        "Generated board: {} pegs, {} walls, {} buckets",
        pegs.len(),
        walls.len(),
        n
    );

    Ok(BoardLayout {
        width: config.width,
        height: config.height,
        pegs,
        walls,
        buckets,
    })
}
