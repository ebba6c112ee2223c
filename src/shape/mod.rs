//! Shape expression trees
//!
//! `Shape` is the user-facing description of a solid: primitives combined
//! with booleans, offsets and transforms. It is immutable and cheap to
//! clone (children are `Arc`-shared). [`Shape::compile`] lowers it into a
//! node DAG and produces a [`Program`](crate::compiled::Program).
//!
//! 2D shapes live in the XY plane and only become solids through
//! [`Shape::extrude`] or [`Shape::revolve`]. Mixing 2D and 3D operands in a
//! boolean is rejected with [`BuildError::DimensionMismatch`].
//!
//! Author: Moroya Sakamoto

mod lower;

use crate::compiled::BuildError;
use crate::types::{Aabb, Transform};
use glam::{Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A solid (or planar region) described as an expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Shape {
    // === 2D primitives ===
    /// Axis-aligned rectangle centred at the origin
    Rectangle {
        /// Half width and half height
        half_size: Vec2,
    },
    /// Circle centred at the origin
    Circle {
        /// Radius
        radius: f32,
    },
    /// Closed polygon
    Polygon {
        /// Vertices, either winding
        points: Vec<Vec2>,
    },

    // === 3D primitives ===
    /// Sphere centred at the origin
    Sphere {
        /// Radius
        radius: f32,
    },
    /// Axis-aligned box centred at the origin
    Box3d {
        /// Half extents
        half_extents: Vec3,
    },
    /// Cylinder along Z centred at the origin
    Cylinder {
        /// Radius
        radius: f32,
        /// Full height
        height: f32,
    },

    // === 2D → 3D ===
    /// 2D profile extruded along Z, centred on the XY plane
    Extrusion {
        /// 2D profile
        profile: Arc<Shape>,
        /// Full height
        height: f32,
    },
    /// 2D profile revolved around the Y axis (profile X becomes the radius)
    Revolution {
        /// 2D profile
        profile: Arc<Shape>,
    },

    // === Operations ===
    /// Union of two or more shapes
    Union {
        /// Operands
        shapes: Vec<Arc<Shape>>,
        /// Fillet radius (`<= 0` is sharp)
        radius: f32,
    },
    /// Intersection of two or more shapes
    Intersection {
        /// Operands
        shapes: Vec<Arc<Shape>>,
        /// Fillet radius (`<= 0` is sharp)
        radius: f32,
    },
    /// `base` with `tool` removed
    Subtraction {
        /// Shape to cut from
        base: Arc<Shape>,
        /// Shape removed
        tool: Arc<Shape>,
        /// Fillet radius (`<= 0` is sharp)
        radius: f32,
    },

    // === Modifiers ===
    /// Surface moved outward by `distance` (inward if negative)
    Offset {
        /// Child shape
        shape: Arc<Shape>,
        /// Offset distance
        distance: f32,
    },
    /// Hollow wall of `thickness` centred on the surface
    Shell {
        /// Child shape
        shape: Arc<Shape>,
        /// Wall thickness
        thickness: f32,
    },

    // === Transforms ===
    /// Child placed by a similarity transform
    Transformed {
        /// Child shape
        shape: Arc<Shape>,
        /// Placement of the child
        transform: Transform,
    },
}

impl Shape {
    // === Primitives ===

    /// Create a rectangle with the given width and height
    #[must_use]
    #[inline]
    pub fn rectangle(width: f32, height: f32) -> Self {
        Shape::Rectangle {
            half_size: Vec2::new(width * 0.5, height * 0.5),
        }
    }

    /// Create a circle with the given radius
    #[must_use]
    #[inline]
    pub fn circle(radius: f32) -> Self {
        Shape::Circle { radius }
    }

    /// Create a polygon from at least three finite vertices
    pub fn polygon(points: Vec<Vec2>) -> Result<Self, BuildError> {
        if points.len() < 3 {
            return Err(BuildError::InvalidShape(format!(
                "polygon needs at least 3 vertices, got {}",
                points.len()
            )));
        }
        if !points.iter().all(|p| p.is_finite()) {
            return Err(BuildError::InvalidShape(
                "polygon vertices must be finite".to_string(),
            ));
        }
        Ok(Shape::Polygon { points })
    }

    /// Create a sphere with the given radius
    #[must_use]
    #[inline]
    pub fn sphere(radius: f32) -> Self {
        Shape::Sphere { radius }
    }

    /// Create an axis-aligned box with the given dimensions
    #[must_use]
    #[inline]
    pub fn box3d(width: f32, height: f32, depth: f32) -> Self {
        Shape::Box3d {
            half_extents: Vec3::new(width * 0.5, height * 0.5, depth * 0.5),
        }
    }

    /// Create a cylinder along the Z axis
    #[must_use]
    #[inline]
    pub fn cylinder(radius: f32, height: f32) -> Self {
        Shape::Cylinder { radius, height }
    }

    // === Dimension ===

    /// 2 for planar shapes, 3 for solids
    pub fn dimension(&self) -> u8 {
        match self {
            Shape::Rectangle { .. } | Shape::Circle { .. } | Shape::Polygon { .. } => 2,
            Shape::Sphere { .. }
            | Shape::Box3d { .. }
            | Shape::Cylinder { .. }
            | Shape::Extrusion { .. }
            | Shape::Revolution { .. } => 3,
            Shape::Union { shapes, .. } | Shape::Intersection { shapes, .. } => {
                shapes.first().map_or(3, |s| s.dimension())
            }
            Shape::Subtraction { base, .. } => base.dimension(),
            Shape::Offset { shape, .. }
            | Shape::Shell { shape, .. }
            | Shape::Transformed { shape, .. } => shape.dimension(),
        }
    }

    fn require_same_dimension(&self, other: &Shape) -> Result<(), BuildError> {
        if self.dimension() == other.dimension() {
            Ok(())
        } else {
            Err(BuildError::DimensionMismatch {
                expected: self.dimension(),
                got: other.dimension(),
            })
        }
    }

    fn require_planar(&self) -> Result<(), BuildError> {
        match self.dimension() {
            2 => Ok(()),
            got => Err(BuildError::DimensionMismatch { expected: 2, got }),
        }
    }

    // === Operations ===

    /// Sharp union with another shape
    pub fn union(self, other: Shape) -> Result<Self, BuildError> {
        self.smooth_union(other, 0.0)
    }

    /// Union with a fillet of the given radius.
    ///
    /// Chained unions with the same radius collapse into one N-ary union.
    pub fn smooth_union(self, other: Shape, radius: f32) -> Result<Self, BuildError> {
        self.require_same_dimension(&other)?;
        Ok(match self {
            Shape::Union { mut shapes, radius: r } if r == radius => {
                shapes.push(Arc::new(other));
                Shape::Union { shapes, radius }
            }
            this => Shape::Union {
                shapes: vec![Arc::new(this), Arc::new(other)],
                radius,
            },
        })
    }

    /// Union of many shapes of the same dimension
    pub fn union_all(shapes: Vec<Shape>, radius: f32) -> Result<Self, BuildError> {
        Self::n_ary(shapes, radius, |shapes, radius| Shape::Union { shapes, radius })
    }

    /// Sharp intersection with another shape
    pub fn intersection(self, other: Shape) -> Result<Self, BuildError> {
        self.smooth_intersection(other, 0.0)
    }

    /// Intersection with a fillet of the given radius
    pub fn smooth_intersection(self, other: Shape, radius: f32) -> Result<Self, BuildError> {
        self.require_same_dimension(&other)?;
        Ok(match self {
            Shape::Intersection { mut shapes, radius: r } if r == radius => {
                shapes.push(Arc::new(other));
                Shape::Intersection { shapes, radius }
            }
            this => Shape::Intersection {
                shapes: vec![Arc::new(this), Arc::new(other)],
                radius,
            },
        })
    }

    /// Intersection of many shapes of the same dimension
    pub fn intersection_all(shapes: Vec<Shape>, radius: f32) -> Result<Self, BuildError> {
        Self::n_ary(shapes, radius, |shapes, radius| Shape::Intersection { shapes, radius })
    }

    fn n_ary(
        mut shapes: Vec<Shape>,
        radius: f32,
        build: fn(Vec<Arc<Shape>>, f32) -> Shape,
    ) -> Result<Self, BuildError> {
        let Some(first) = shapes.first() else {
            return Err(BuildError::InvalidShape(
                "boolean of zero shapes".to_string(),
            ));
        };
        for s in &shapes[1..] {
            first.require_same_dimension(s)?;
        }
        if shapes.len() == 1 {
            return Ok(shapes.remove(0));
        }
        Ok(build(shapes.into_iter().map(Arc::new).collect(), radius))
    }

    /// Subtract another shape from this one
    pub fn subtract(self, other: Shape) -> Result<Self, BuildError> {
        self.smooth_subtract(other, 0.0)
    }

    /// Subtraction with a fillet of the given radius
    pub fn smooth_subtract(self, other: Shape, radius: f32) -> Result<Self, BuildError> {
        self.require_same_dimension(&other)?;
        Ok(Shape::Subtraction {
            base: Arc::new(self),
            tool: Arc::new(other),
            radius,
        })
    }

    // === Modifiers ===

    /// Move the surface outward by `distance`
    #[must_use]
    #[inline]
    pub fn offset(self, distance: f32) -> Self {
        Shape::Offset {
            shape: Arc::new(self),
            distance,
        }
    }

    /// Hollow wall of `thickness` centred on the surface
    #[must_use]
    #[inline]
    pub fn shell(self, thickness: f32) -> Self {
        Shape::Shell {
            shape: Arc::new(self),
            thickness,
        }
    }

    /// Extrude a 2D shape along Z
    pub fn extrude(self, height: f32) -> Result<Self, BuildError> {
        self.require_planar()?;
        Ok(Shape::Extrusion {
            profile: Arc::new(self),
            height,
        })
    }

    /// Revolve a 2D shape around the Y axis
    pub fn revolve(self) -> Result<Self, BuildError> {
        self.require_planar()?;
        Ok(Shape::Revolution {
            profile: Arc::new(self),
        })
    }

    // === Transforms ===

    /// Place the shape with a transform.
    ///
    /// Nested transforms are kept as written here and merged at lowering,
    /// where a transform with a non-positive scale is rejected.
    #[must_use]
    #[inline]
    pub fn transform(self, transform: Transform) -> Self {
        Shape::Transformed {
            shape: Arc::new(self),
            transform,
        }
    }

    /// Translate by offset
    #[must_use]
    #[inline]
    pub fn translate(self, x: f32, y: f32, z: f32) -> Self {
        self.transform(Transform::from_translation(Vec3::new(x, y, z)))
    }

    /// Rotate by quaternion
    #[must_use]
    #[inline]
    pub fn rotate(self, rotation: Quat) -> Self {
        self.transform(Transform::from_rotation(rotation))
    }

    /// Rotate around an axis by an angle in degrees
    #[must_use]
    #[inline]
    pub fn rotate_axis(self, axis: Vec3, degrees: f32) -> Self {
        self.rotate(Quat::from_axis_angle(axis.normalize(), degrees.to_radians()))
    }

    /// Uniform scale by a positive, finite factor
    pub fn scale(self, factor: f32) -> Result<Self, BuildError> {
        if !(factor > 0.0 && factor.is_finite()) {
            return Err(BuildError::InvalidShape(format!(
                "scale factor must be positive and finite, got {}",
                factor
            )));
        }
        Ok(self.transform(Transform::from_scale(factor)))
    }

    // === Bounds ===

    /// Conservative bounding box (planar shapes are flat in Z)
    pub fn bounding_box(&self) -> Aabb {
        match self {
            Shape::Rectangle { half_size } => {
                Aabb::new(-half_size.extend(0.0), half_size.extend(0.0))
            }
            Shape::Circle { radius } => {
                let r = Vec3::new(*radius, *radius, 0.0);
                Aabb::new(-r, r)
            }
            Shape::Polygon { points } => {
                Aabb::from_points(points.iter().map(|p| p.extend(0.0)))
                    .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO))
            }
            Shape::Sphere { radius } => Aabb::from_center_extents(Vec3::ZERO, Vec3::splat(*radius)),
            Shape::Box3d { half_extents } => Aabb::from_center_extents(Vec3::ZERO, *half_extents),
            Shape::Cylinder { radius, height } => Aabb::from_center_extents(
                Vec3::ZERO,
                Vec3::new(*radius, *radius, height * 0.5),
            ),
            Shape::Extrusion { profile, height } => {
                let b = profile.bounding_box();
                Aabb::new(
                    b.min.truncate().extend(-height * 0.5),
                    b.max.truncate().extend(height * 0.5),
                )
            }
            Shape::Revolution { profile } => {
                let b = profile.bounding_box();
                let r = b.min.x.abs().max(b.max.x.abs());
                Aabb::new(Vec3::new(-r, b.min.y, -r), Vec3::new(r, b.max.y, r))
            }
            Shape::Union { shapes, radius } => {
                let b = shapes
                    .iter()
                    .map(|s| s.bounding_box())
                    .reduce(|a, b| a.union(&b))
                    .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO));
                // A fillet can only add material within `radius` of the operands
                b.expanded(radius.max(0.0))
            }
            Shape::Intersection { shapes, .. } => shapes
                .iter()
                .map(|s| s.bounding_box())
                .reduce(|a, b| a.intersection(&b))
                .unwrap_or(Aabb::new(Vec3::ZERO, Vec3::ZERO)),
            Shape::Subtraction { base, .. } => base.bounding_box(),
            Shape::Offset { shape, distance } => shape.bounding_box().expanded(distance.max(0.0)),
            Shape::Shell { shape, thickness } => shape.bounding_box().expanded(thickness * 0.5),
            Shape::Transformed { shape, transform } => {
                transform.apply_aabb(&shape.bounding_box())
            }
        }
    }
}
