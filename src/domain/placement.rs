//! Placement configuration handed to pool factories.

use serde::{Deserialize, Serialize};

/// Where newly constructed instances should appear.
///
/// A pure configuration value: pools never interpret it, they only pass it
/// to their factory. Rotation is a unit quaternion in `[x, y, z, w]` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// World-space position.
    pub position: [f32; 3],
    /// Orientation quaternion.
    pub rotation: [f32; 4],
}

impl Placement {
    /// Origin with identity rotation.
    pub const ORIGIN: Self = Self {
        position: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
    };

    /// Creates a placement at `position` with identity rotation.
    #[must_use]
    pub const fn at(position: [f32; 3]) -> Self {
        Self {
            position,
            rotation: Self::ORIGIN.rotation,
        }
    }
}

impl Default for Placement {
    fn default() -> Self {
        Self::ORIGIN
    }
}
