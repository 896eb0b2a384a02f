use serde::{Deserialize, Serialize};

use crate::error::{GridError, GridResult};

/// Point on the battle plane
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    #[inline]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Distance squared (no sqrt) - all comparisons in the index use this
    #[inline]
    pub fn distance_sq(&self, other: Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
}

/// Axis-aligned rectangle the grid is laid over
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bounds {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl Bounds {
    pub const fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self { min_x, min_y, max_x, max_y }
    }

    fn validate(&self) -> GridResult<()> {
        let finite = [self.min_x, self.min_y, self.max_x, self.max_y]
            .iter()
            .all(|v| v.is_finite());
        if !finite {
            return Err(GridError::NonFiniteBounds);
        }
        if !(self.max_x > self.min_x && self.max_y > self.min_y) {
            return Err(GridError::DegenerateBounds {
                min_x: self.min_x,
                min_y: self.min_y,
                max_x: self.max_x,
                max_y: self.max_y,
            });
        }
        Ok(())
    }
}

/// Uniform N x N partition of the plane.
///
/// Each axis has a boundary table of N + 1 values. The first and last entries
/// are -inf / +inf so positions outside `bounds` still land in an edge
/// quadrant.
#[derive(Debug, Clone)]
pub struct GridGeometry {
    dimension: u32,
    boundaries_x: Vec<f32>,
    boundaries_y: Vec<f32>,
}

impl GridGeometry {
    pub fn new(bounds: Bounds, dimension: u32) -> GridResult<Self> {
        if dimension == 0 {
            return Err(GridError::InvalidDimension(dimension));
        }
        bounds.validate()?;

        Ok(Self {
            dimension,
            boundaries_x: boundary_table(bounds.min_x, bounds.max_x, dimension),
            boundaries_y: boundary_table(bounds.min_y, bounds.max_y, dimension),
        })
    }

    #[inline]
    pub fn dimension(&self) -> u32 {
        self.dimension
    }

    #[inline]
    pub fn quadrant_count(&self) -> usize {
        let n = self.dimension as usize;
        n * n
    }

    pub fn boundaries_x(&self) -> &[f32] {
        &self.boundaries_x
    }

    pub fn boundaries_y(&self) -> &[f32] {
        &self.boundaries_y
    }

    /// Quadrant containing `position`
    #[inline]
    pub fn locate(&self, position: Position) -> (u32, u32) {
        (
            bracket(&self.boundaries_x, position.x),
            bracket(&self.boundaries_y, position.y),
        )
    }

    /// Row-major key: quadrants of one row are consecutive
    #[inline]
    pub fn linear(&self, x: u32, y: u32) -> usize {
        x as usize + y as usize * self.dimension as usize
    }

    /// Distance from `position` to the closest quadrant boundary of `(x, y)`
    /// that has another quadrant behind it.
    #[inline]
    pub fn min_distance_to_neighboring_quadrant(&self, position: Position, x: u32, y: u32) -> f32 {
        self.min_distance_outside_ring(position, x, y, 0)
    }

    /// Distance from `position` to the nearest point of any quadrant lying
    /// outside the square ring of radius `ring` around `(x, y)`.
    ///
    /// Sides of the square that sit on the grid edge are ignored. Returns
    /// +inf once the square covers the whole grid.
    pub fn min_distance_outside_ring(&self, position: Position, x: u32, y: u32, ring: u32) -> f32 {
        let last = self.dimension as i64 - 1;
        let ring = ring as i64;
        let mut best = f32::INFINITY;

        let lo_x = x as i64 - ring;
        if lo_x > 0 {
            best = best.min(position.x - self.boundaries_x[lo_x as usize]);
        }
        let hi_x = x as i64 + ring;
        if hi_x < last {
            best = best.min(self.boundaries_x[hi_x as usize + 1] - position.x);
        }
        let lo_y = y as i64 - ring;
        if lo_y > 0 {
            best = best.min(position.y - self.boundaries_y[lo_y as usize]);
        }
        let hi_y = y as i64 + ring;
        if hi_y < last {
            best = best.min(self.boundaries_y[hi_y as usize + 1] - position.y);
        }

        best.max(0.0)
    }
}

fn boundary_table(min: f32, max: f32, dimension: u32) -> Vec<f32> {
    let width = (max - min) / dimension as f32;
    let mut table = Vec::with_capacity(dimension as usize + 1);
    table.push(f32::NEG_INFINITY);
    for i in 1..dimension {
        table.push(min + width * i as f32);
    }
    table.push(f32::INFINITY);
    table
}

/// Linear scan; dimensions are small enough that this beats a binary search
#[inline]
fn bracket(table: &[f32], coord: f32) -> u32 {
    let mut i = 0;
    while i + 2 < table.len() && coord >= table[i + 1] {
        i += 1;
    }
    i as u32
}
