//! Common test helpers for ALICE-CSG integration tests
//!
//! Author: Moroya Sakamoto

#![allow(dead_code)]

use alice_csg::compiled::{NodeCache, NodeId, Schedule};
use alice_csg::prelude::*;

// ============================================================================
// Standard test shapes
// ============================================================================

/// Box of edge 2 at origin
pub fn test_box() -> Shape {
    Shape::box3d(2.0, 2.0, 2.0)
}

/// Box with a sphere unioned in
pub fn test_box_union_sphere() -> Shape {
    test_box().union(Shape::sphere(0.5)).unwrap()
}

/// Mechanical-looking part exercising every operation family
pub fn test_part() -> Shape {
    let plate = Shape::box3d(3.0, 2.0, 0.5);
    let boss = Shape::cylinder(0.6, 1.5).translate(0.8, 0.0, 0.5);
    let hole = Shape::cylinder(0.25, 4.0).translate(-0.8, 0.0, 0.0);
    let rib = Shape::rectangle(0.2, 0.8)
        .extrude(2.0)
        .unwrap()
        .rotate_axis(Vec3::Y, 90.0)
        .translate(0.0, 0.6, 0.4);
    plate
        .smooth_union(boss, 0.1)
        .unwrap()
        .union(rib)
        .unwrap()
        .subtract(hole)
        .unwrap()
}

/// N spheres in a row, unioned with one N-ary union
pub fn sphere_row(n: usize) -> Shape {
    Shape::union_all(
        (0..n)
            .map(|i| Shape::sphere(0.4).translate(i as f32 * 0.5, 0.0, 0.0))
            .collect(),
        0.0,
    )
    .unwrap()
}

/// Lower `shape` into a fresh cache
pub fn lowered(shape: &Shape) -> (NodeCache, NodeId) {
    let mut cache = NodeCache::new();
    let root = shape.lower(&mut cache).unwrap();
    (cache, root)
}

// ============================================================================
// Standard test points
// ============================================================================

/// Regular grid of `n^3` points in `[-extent, extent]^3`
pub fn grid_points(n: usize, extent: f32) -> Vec<Vec3> {
    let step = 2.0 * extent / n as f32;
    let mut points = Vec::with_capacity(n * n * n);
    for k in 0..n {
        for j in 0..n {
            for i in 0..n {
                points.push(Vec3::new(
                    -extent + (i as f32 + 0.5) * step,
                    -extent + (j as f32 + 0.5) * step,
                    -extent + (k as f32 + 0.5) * step,
                ));
            }
        }
    }
    points
}

// ============================================================================
// Assertions
// ============================================================================

/// Replay a schedule and check every read sees the value it depends on.
///
/// Tracks which node last wrote each register. An input must hold one of
/// the reading node's dependencies (or, for folded N-ary nodes, a partial
/// result of the same node).
pub fn assert_schedule_reads_live_values(cache: &NodeCache, root: NodeId, schedule: &Schedule) {
    let mut holder: Vec<Option<NodeId>> = vec![None; schedule.registers_needed];
    for (step, entry) in schedule.order.iter().enumerate() {
        let deps = cache[entry.node].dependencies();
        for (slot, &register) in entry.inputs.iter().enumerate() {
            let held = holder[register]
                .unwrap_or_else(|| panic!("step {step}: register {register} read before written"));
            if deps.len() <= 2 {
                assert_eq!(
                    held, deps[slot],
                    "step {step}: register {register} was overwritten before its read"
                );
            } else {
                assert!(
                    held == entry.node || deps.contains(&held),
                    "step {step}: register {register} holds unrelated {held}"
                );
            }
        }
        holder[entry.register] = Some(entry.node);
    }
    assert_eq!(holder[schedule.result_register()], Some(root));
}

/// Two VMs agree on every point
pub fn assert_programs_agree(a: &Program, b: &Program, points: &[Vec3], tolerance: f32) {
    let vm_a = Vm::load(a).unwrap();
    let vm_b = Vm::load(b).unwrap();
    for &p in points {
        let (da, db) = (vm_a.distance(p), vm_b.distance(p));
        assert!(
            (da - db).abs() <= tolerance,
            "mismatch at {:?}: {} vs {}",
            p,
            da,
            db
        );
    }
}
