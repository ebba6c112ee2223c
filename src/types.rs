//! Core geometric types for ALICE-CSG
//!
//! Axis-aligned bounds used by subdivision and the similarity transform
//! carried by `Shape::Transformed` and merged during lowering.
//!
//! Author: Moroya Sakamoto

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-Aligned Bounding Box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    /// Minimum corner
    pub min: Vec3,
    /// Maximum corner
    pub max: Vec3,
}

impl Aabb {
    /// Create a new AABB
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Aabb { min, max }
    }

    /// Create from center and half-extents
    pub fn from_center_extents(center: Vec3, half_extents: Vec3) -> Self {
        Aabb {
            min: center - half_extents,
            max: center + half_extents,
        }
    }

    /// Smallest box containing every point of the iterator.
    ///
    /// Returns `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        Some(iter.fold(Aabb::new(first, first), |acc, p| Aabb {
            min: acc.min.min(p),
            max: acc.max.max(p),
        }))
    }

    /// Get center point
    #[inline]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Edge lengths
    #[inline]
    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    /// Enclosed volume (zero for flat or inverted boxes)
    #[inline]
    pub fn volume(&self) -> f32 {
        let s = self.size().max(Vec3::ZERO);
        s.x * s.y * s.z
    }

    /// Check if point is inside
    #[inline]
    pub fn contains(&self, point: Vec3) -> bool {
        point.cmpge(self.min).all() && point.cmple(self.max).all()
    }

    /// True when every coordinate is finite and min <= max on every axis
    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min.cmple(self.max).all()
    }

    /// Union of two AABBs
    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    /// Overlap of two AABBs (may be inverted if they do not touch)
    pub fn intersection(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    /// Grow every face outward by `amount`
    pub fn expanded(&self, amount: f32) -> Aabb {
        Aabb {
            min: self.min - Vec3::splat(amount),
            max: self.max + Vec3::splat(amount),
        }
    }

    /// The eight corner points
    pub fn vertices(&self) -> [Vec3; 8] {
        let (a, b) = (self.min, self.max);
        [
            Vec3::new(a.x, a.y, a.z),
            Vec3::new(b.x, a.y, a.z),
            Vec3::new(a.x, b.y, a.z),
            Vec3::new(b.x, b.y, a.z),
            Vec3::new(a.x, a.y, b.z),
            Vec3::new(b.x, a.y, b.z),
            Vec3::new(a.x, b.y, b.z),
            Vec3::new(b.x, b.y, b.z),
        ]
    }
}

/// Similarity transform: rotation, uniform scale, then translation.
///
/// `apply(p) = rotation * (p * scale) + translation`. Uniform scaling keeps
/// distance fields exact up to a constant factor, which is what lets
/// `transformation_from` correct the distance with a single multiply.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Unit rotation quaternion
    pub rotation: Quat,
    /// Uniform scale factor (must be positive and finite)
    pub scale: f32,
    /// Translation applied last
    pub translation: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    /// Identity transform
    pub const IDENTITY: Transform = Transform {
        rotation: Quat::IDENTITY,
        scale: 1.0,
        translation: Vec3::ZERO,
    };

    /// Pure translation
    pub fn from_translation(translation: Vec3) -> Self {
        Transform {
            translation,
            ..Self::IDENTITY
        }
    }

    /// Pure rotation
    pub fn from_rotation(rotation: Quat) -> Self {
        Transform {
            rotation: rotation.normalize(),
            ..Self::IDENTITY
        }
    }

    /// Pure uniform scale
    pub fn from_scale(scale: f32) -> Self {
        Transform {
            scale,
            ..Self::IDENTITY
        }
    }

    /// Map a point
    #[inline(always)]
    pub fn apply(&self, point: Vec3) -> Vec3 {
        self.rotation * (point * self.scale) + self.translation
    }

    /// Inverse transform, `inverse().apply(apply(p)) == p`
    pub fn inverse(&self) -> Transform {
        let rotation = self.rotation.conjugate();
        let scale = 1.0 / self.scale;
        Transform {
            rotation,
            scale,
            translation: -(rotation * self.translation) * scale,
        }
    }

    /// Composition that applies `first`, then `self`
    pub fn after(&self, first: &Transform) -> Transform {
        Transform {
            rotation: (self.rotation * first.rotation).normalize(),
            scale: self.scale * first.scale,
            translation: self.rotation * (first.translation * self.scale) + self.translation,
        }
    }

    /// Conservative bounds of a transformed box
    pub fn apply_aabb(&self, aabb: &Aabb) -> Aabb {
        Aabb::from_points(aabb.vertices().into_iter().map(|v| self.apply(v))).unwrap_or(*aabb)
    }

    /// True when the transform has no effect
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// True when the transform maps distances to distances.
    ///
    /// A zero scale has no inverse and a negative one swaps inside and
    /// outside, so only positive finite scales qualify.
    pub fn is_valid(&self) -> bool {
        self.scale > 0.0
            && self.scale.is_finite()
            && self.rotation.is_finite()
            && self.rotation.length_squared() > 0.0
            && self.translation.is_finite()
    }
}
