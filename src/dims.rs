//! Running bounding dimensions of a device stack

use serde::{Deserialize, Serialize};

/// Largest lateral extent seen so far and cumulative stack height.
///
/// Builders return the value they produced instead of mutating a shared
/// accumulator, so `update` consumes and returns `Self`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceDims {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl DeviceDims {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Keep the larger of each lateral extent and add `new_z` to the height.
    #[must_use]
    pub fn update(self, new_x: f64, new_y: f64, new_z: f64) -> Self {
        Self {
            x: self.x.max(new_x),
            y: self.y.max(new_y),
            z: self.z + new_z,
        }
    }

    /// Fold a lateral footprint `[x, y]` into the running maximum.
    #[must_use]
    pub fn with_footprint(self, footprint: [f64; 2]) -> Self {
        self.update(footprint[0], footprint[1], 0.0)
    }

    pub fn max_component(&self) -> f64 {
        self.x.max(self.y).max(self.z)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_keeps_max_and_adds_height() {
        let dims = DeviceDims::new(0.3, 0.2, 0.5).update(0.1, 0.4, 0.25);
        assert_eq!(dims, DeviceDims::new(0.3, 0.4, 0.75));
    }

    #[test]
    fn test_update_is_monotonic() {
        let mut dims = DeviceDims::ZERO;
        for (x, y, z) in [(0.2, 0.1, 0.3), (0.05, 0.5, 0.0), (0.0, 0.0, 1.2)] {
            let next = dims.update(x, y, z);
            assert!(next.x >= dims.x);
            assert!(next.y >= dims.y);
            assert!((next.z - dims.z - z).abs() < 1e-12);
            dims = next;
        }
        assert!((dims.z - 1.5).abs() < 1e-12);
    }

    #[test]
    fn test_max_component() {
        assert_eq!(DeviceDims::new(1.0, 3.0, 2.0).max_component(), 3.0);
    }
}
