//! Map coordinates within a region.

use serde::{Deserialize, Serialize};

/// Cell position inside a region's map grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MapPosition {
    /// X cell
    pub x: i16,
    /// Y cell
    pub y: i16,
}

impl MapPosition {
    /// Creates a new map position.
    #[must_use]
    pub const fn new(x: i16, y: i16) -> Self {
        Self { x, y }
    }

    /// Grid distance to another position.
    ///
    /// Diagonal steps count as one cell, so the result is the larger of the
    /// two axis deltas.
    #[must_use]
    pub fn distance_to(self, other: MapPosition) -> u16 {
        let dx = (i32::from(self.x) - i32::from(other.x)).unsigned_abs();
        let dy = (i32::from(self.y) - i32::from(other.y)).unsigned_abs();
        dx.max(dy).min(u32::from(u16::MAX)) as u16
    }

    /// Checks whether `other` lies within `radius` cells.
    #[must_use]
    pub fn is_in_range(self, other: MapPosition, radius: u16) -> bool {
        self.distance_to(other) <= radius
    }

    /// Returns this position shifted by the given deltas, saturating at the grid bounds.
    #[must_use]
    pub fn offset(self, dx: i16, dy: i16) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}
