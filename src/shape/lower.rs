//! Lowering: Shape → node DAG
//!
//! Each shape is lowered against the node that carries the current
//! evaluation point. Transforms wrap their child between a
//! `transformation_to` (point into the child frame) and a
//! `transformation_from` (value back into the parent frame). When the
//! incoming point node is already a `transformation_to`, or the child's
//! value is already a `transformation_from`, the two are folded into one
//! node using the builder-only [`NodeExtra`] payload.
//!
//! Author: Moroya Sakamoto

use super::Shape;
use crate::compiled::{
    self, BuildError, CompileConfig, CompileError, NodeCache, NodeExtra, NodeId, OpCode, Program,
};
use crate::types::Transform;
use glam::Quat;

/// Parameter for boolean fillets; all sharp radii share one encoding
#[inline]
fn fillet(radius: f32) -> f32 {
    if radius > 0.0 {
        radius
    } else {
        -1.0
    }
}

impl Shape {
    /// Lower into `cache`, returning the root node
    pub fn lower(&self, cache: &mut NodeCache) -> Result<NodeId, BuildError> {
        let point = cache.point();
        self.get_node(cache, point)
    }

    /// Lower and compile in a fresh build session
    pub fn compile(&self, config: &CompileConfig) -> Result<Program, CompileError> {
        let mut cache = NodeCache::new();
        let root = self.lower(&mut cache)?;
        compiled::compile(&mut cache, root, config)
    }

    fn get_node(&self, cache: &mut NodeCache, point: NodeId) -> Result<NodeId, BuildError> {
        match self {
            Shape::Rectangle { half_size } => {
                cache.make_node(OpCode::Rectangle, &[half_size.x, half_size.y], &[point], None)
            }
            Shape::Circle { radius } => cache.make_node(OpCode::Circle, &[*radius], &[point], None),
            Shape::Polygon { points } => {
                let params: Vec<f32> = points.iter().flat_map(|p| [p.x, p.y]).collect();
                cache.make_node(OpCode::Polygon2d, &params, &[point], None)
            }
            Shape::Sphere { radius } => cache.make_node(OpCode::Sphere, &[*radius], &[point], None),
            Shape::Box3d { half_extents } => cache.make_node(
                OpCode::Box3d,
                &half_extents.to_array(),
                &[point],
                None,
            ),
            Shape::Cylinder { radius, height } => {
                cache.make_node(OpCode::Cylinder, &[*radius, *height], &[point], None)
            }
            Shape::Extrusion { profile, height } => {
                let profile = profile.get_node(cache, point)?;
                cache.make_node(OpCode::Extrusion, &[*height], &[profile, point], None)
            }
            Shape::Revolution { profile } => {
                let folded = cache.make_node(OpCode::RevolutionTo, &[], &[point], None)?;
                let profile = profile.get_node(cache, folded)?;
                cache.make_node(OpCode::RevolutionFrom, &[], &[profile, point], None)
            }
            Shape::Union { shapes, radius } => {
                n_ary(cache, point, OpCode::Union, shapes, fillet(*radius))
            }
            Shape::Intersection { shapes, radius } => {
                n_ary(cache, point, OpCode::Intersection, shapes, fillet(*radius))
            }
            Shape::Subtraction { base, tool, radius } => {
                let base = base.get_node(cache, point)?;
                let tool = tool.get_node(cache, point)?;
                cache.make_node(OpCode::Subtraction, &[fillet(*radius)], &[base, tool], None)
            }
            Shape::Offset { shape, distance } => {
                let child = shape.get_node(cache, point)?;
                cache.make_node(OpCode::Offset, &[*distance], &[child], None)
            }
            Shape::Shell { shape, thickness } => {
                let child = shape.get_node(cache, point)?;
                cache.make_node(OpCode::Shell, &[thickness * 0.5], &[child], None)
            }
            Shape::Transformed { shape, transform } => {
                lower_transformed(cache, point, shape, transform)
            }
        }
    }
}

fn n_ary(
    cache: &mut NodeCache,
    point: NodeId,
    opcode: OpCode,
    shapes: &[std::sync::Arc<Shape>],
    param: f32,
) -> Result<NodeId, BuildError> {
    let nodes = shapes
        .iter()
        .map(|s| s.get_node(cache, point))
        .collect::<Result<Vec<_>, _>>()?;
    match nodes.as_slice() {
        [single] => Ok(*single),
        _ => cache.make_node(opcode, &[param], &nodes, None),
    }
}

fn lower_transformed(
    cache: &mut NodeCache,
    point: NodeId,
    shape: &Shape,
    transform: &Transform,
) -> Result<NodeId, BuildError> {
    if !transform.is_valid() {
        return Err(BuildError::InvalidShape(format!(
            "transform must have a positive finite scale and finite rotation and translation, got {:?}",
            transform
        )));
    }
    // Point side: world → child frame
    let mut to_child = transform.inverse();
    let mut point_source = point;
    if let Some(NodeExtra::PointTransform(previous)) = cache[point].extra() {
        if let Some(&source) = cache[point].dependencies().first() {
            to_child = to_child.after(previous);
            point_source = source;
        }
    }
    let local = if to_child.is_identity() {
        point_source
    } else {
        let q = to_child.rotation;
        let t = to_child.translation;
        cache.make_node(
            OpCode::TransformationTo,
            &[q.x, q.y, q.z, q.w, to_child.scale, t.x, t.y, t.z],
            &[point_source],
            Some(NodeExtra::PointTransform(to_child)),
        )?
    };

    let child = shape.get_node(cache, local)?;

    // Value side: child frame → world
    let mut rotation = transform.rotation;
    let mut scale = transform.scale;
    let mut value_source = child;
    if let Some(NodeExtra::ValueTransform {
        rotation: inner_rotation,
        scale: inner_scale,
    }) = cache[child].extra()
    {
        if let Some(&source) = cache[child].dependencies().first() {
            rotation = (rotation * *inner_rotation).normalize();
            scale *= inner_scale;
            value_source = source;
        }
    }
    if rotation == Quat::IDENTITY && scale == 1.0 {
        return Ok(value_source);
    }
    cache.make_node(
        OpCode::TransformationFrom,
        &[rotation.x, rotation.y, rotation.z, rotation.w, scale],
        &[value_source],
        Some(NodeExtra::ValueTransform { rotation, scale }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiled::Vm;
    use glam::Vec3;

    fn vm(shape: &Shape) -> Vm {
        Vm::load(&shape.compile(&CompileConfig::default()).unwrap()).unwrap()
    }

    #[test]
    fn test_shared_subexpressions_are_lowered_once() {
        let s = Shape::sphere(1.0);
        let shape = s.clone().union(s.clone().offset(0.5)).unwrap();
        let mut cache = NodeCache::new();
        shape.lower(&mut cache).unwrap();
        // point, sphere, offset, union
        assert_eq!(cache.len(), 4);
    }

    #[test]
    fn test_nested_transforms_merge() {
        let shape = Shape::sphere(1.0)
            .translate(1.0, 0.0, 0.0)
            .scale(2.0)
            .unwrap()
            .rotate_axis(Vec3::Z, 90.0);
        let mut cache = NodeCache::new();
        let root = shape.lower(&mut cache).unwrap();

        let program = crate::compiled::compile(&mut cache, root, &CompileConfig::default()).unwrap();
        let ops: Vec<OpCode> = program.decode().unwrap().iter().map(|i| i.opcode).collect();
        assert_eq!(
            ops,
            vec![
                OpCode::TransformationTo,
                OpCode::Sphere,
                OpCode::TransformationFrom,
                OpCode::Return
            ]
        );

        // Sphere of radius 2 centred at rotate_z(90)(2, 0, 0) = (0, 2, 0)
        let vm = Vm::load(&program).unwrap();
        assert!((vm.distance(Vec3::new(0.0, 2.0, 0.0)) + 2.0).abs() < 0.0001);
        assert!(vm.distance(Vec3::new(0.0, 4.0, 0.0)).abs() < 0.0001);
        let g = vm.eval(Vec3::new(0.0, 5.0, 0.0)).truncate();
        assert!((g - Vec3::Y).length() < 0.0001, "gradient {:?}", g);
    }

    #[test]
    fn test_identity_transform_is_free() {
        let shape = Shape::sphere(1.0).translate(0.0, 0.0, 0.0);
        let ops: Vec<OpCode> = shape
            .compile(&CompileConfig::default())
            .unwrap()
            .decode()
            .unwrap()
            .iter()
            .map(|i| i.opcode)
            .collect();
        assert_eq!(ops, vec![OpCode::Sphere, OpCode::Return]);
    }

    #[test]
    fn test_extrusion_and_revolution() {
        let slab = Shape::rectangle(2.0, 2.0).extrude(1.0).unwrap();
        let vm_slab = vm(&slab);
        assert!((vm_slab.distance(Vec3::new(0.0, 0.0, 1.0)) - 0.5).abs() < 0.0001);
        assert!((vm_slab.distance(Vec3::new(2.0, 0.0, 0.0)) - 1.0).abs() < 0.0001);

        let torus = Shape::circle(0.25).translate(1.0, 0.0, 0.0).revolve().unwrap();
        let vm_torus = vm(&torus);
        assert!((vm_torus.distance(Vec3::new(0.0, 0.0, 1.0)) + 0.25).abs() < 0.0001);
        assert!((vm_torus.distance(Vec3::ZERO) - 0.75).abs() < 0.0001);
    }

    #[test]
    fn test_polygon_extrusion() {
        let triangle = Shape::polygon(vec![
            glam::Vec2::new(0.0, 0.0),
            glam::Vec2::new(2.0, 0.0),
            glam::Vec2::new(0.0, 2.0),
        ])
        .unwrap()
        .extrude(1.0)
        .unwrap();
        let vm = vm(&triangle);
        assert!(vm.distance(Vec3::new(0.4, 0.4, 0.0)) < 0.0);
        assert!(vm.distance(Vec3::new(2.0, 2.0, 0.0)) > 0.0);
    }

    #[test]
    fn test_shell_and_subtraction() {
        let hollow = Shape::sphere(1.0).shell(0.2);
        let vm_hollow = vm(&hollow);
        assert!((vm_hollow.distance(Vec3::ZERO) - 0.9).abs() < 0.0001);
        assert!(vm_hollow.distance(Vec3::new(1.0, 0.0, 0.0)) < 0.0);

        let cut = Shape::box3d(2.0, 2.0, 2.0)
            .subtract(Shape::sphere(0.5))
            .unwrap();
        let vm_cut = vm(&cut);
        assert!(vm_cut.distance(Vec3::ZERO) > 0.0);
        assert!(vm_cut.distance(Vec3::new(0.8, 0.0, 0.0)) < 0.0);
    }
}
