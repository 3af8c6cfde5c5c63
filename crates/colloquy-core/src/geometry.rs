//! Minimal world-space geometry used by the awareness check

use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in world space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// Create a box from its corners
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// An empty box that any `add` replaces
    pub fn empty() -> Self {
        Self {
            min: Vec3::splat(f32::INFINITY),
            max: Vec3::splat(f32::NEG_INFINITY),
        }
    }

    /// A box of half-extent `half` around `center`
    pub fn around(center: Vec3, half: f32) -> Self {
        Self {
            min: center - Vec3::splat(half),
            max: center + Vec3::splat(half),
        }
    }

    /// Check if nothing has been added yet
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    /// Grow to enclose another box
    pub fn add(&mut self, other: &Aabb) {
        if other.is_empty() {
            return;
        }
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// Center point
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }
}

impl Default for Aabb {
    fn default() -> Self {
        Self::empty()
    }
}

/// Project onto the ground plane and normalize, or `None` for a vertical/zero vector
pub fn flat_direction(v: Vec3) -> Option<Vec3> {
    Vec3::new(v.x, v.y, 0.0).try_normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_box() {
        let mut bounds = Aabb::empty();
        assert!(bounds.is_empty());

        bounds.add(&Aabb::around(Vec3::new(2.0, 0.0, 0.0), 1.0));
        bounds.add(&Aabb::around(Vec3::new(-2.0, 0.0, 0.0), 1.0));
        assert!(!bounds.is_empty());
        assert_eq!(bounds.center(), Vec3::ZERO);
        assert_eq!(bounds.max.x, 3.0);
    }

    #[test]
    fn test_flat_direction() {
        let dir = flat_direction(Vec3::new(3.0, 0.0, 5.0)).unwrap();
        assert_eq!(dir, Vec3::X);
        assert!(flat_direction(Vec3::Z).is_none());
    }
}
