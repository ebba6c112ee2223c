//! Integration tests: adaptive subdivision
//!
//! Author: Moroya Sakamoto

mod common;

use alice_csg::prelude::*;
use alice_csg::subdivision::{level_sizes, subdivide_on, UniformBlock};
use common::*;
use glam::UVec3;

fn config(resolution: f32, lattice_size: u32) -> SubdivisionConfig {
    let mut config = SubdivisionConfig::with_resolution(resolution).with_lattice_size(lattice_size);
    config.record_uniform_cells = true;
    config
}

// ============================================================================
// Leaf block layout
// ============================================================================

#[test]
fn box_leaf_corners() {
    let shape = Shape::box3d(10.0, 10.0, 10.0);
    let result = subdivide_shape(&shape, &config(1.0, 4)).unwrap();

    let ticks = [-5.5f32, -2.5, 0.5, 3.5];
    let inner = |v: f32| v == -2.5 || v == 0.5;
    let mut expected = Vec::new();
    for &z in &ticks {
        for &y in &ticks {
            for &x in &ticks {
                if !(inner(x) && inner(y) && inner(z)) {
                    expected.push(Vec3::new(x, y, z));
                }
            }
        }
    }

    assert_eq!(result.leaf_blocks.len(), expected.len());
    for (block, corner) in result.leaf_blocks.iter().zip(&expected) {
        assert!(
            (block.corner - *corner).length() < 1e-5,
            "{:?} != {:?}",
            block.corner,
            corner
        );
        assert_eq!(block.lattice, UVec3::splat(4));
        assert_eq!(block.spacing, 1.0);
        assert!(block.overlap);
    }
    assert_eq!(result.stats.dispatches, 1);
    assert!(result.inside.volume > 0.0);
}

#[test]
fn neighbouring_leaf_blocks_share_edge_samples() {
    let shape = Shape::box3d(10.0, 10.0, 10.0);
    let result = subdivide_shape(&shape, &config(1.0, 4)).unwrap();
    let first = result.leaf_blocks[0];
    let last_sample = first.sample_position(UVec3::new(first.lattice.x - 1, 0, 0));
    assert!(result
        .leaf_blocks
        .iter()
        .any(|b| (b.corner - last_sample).length() < 1e-5));
}

// ============================================================================
// Coverage
// ============================================================================

fn assert_tiles_exactly(shape: &Shape, config: &SubdivisionConfig) {
    let bounds = shape.bounding_box();
    let result = subdivide_shape(shape, config).unwrap();
    let planar = result.dimension == 2;
    let coverage = result.coverage(&bounds, config.resolution);
    let regions: Vec<Aabb> = result
        .leaf_blocks
        .iter()
        .map(LeafBlock::extent)
        .chain(result.uniform_blocks.iter().map(UniformBlock::extent))
        .collect();

    // Areas for planar shapes
    let measure = |r: &Aabb| {
        let s = r.size().max(Vec3::ZERO);
        if planar {
            f64::from(s.x * s.y)
        } else {
            f64::from(r.volume())
        }
    };
    let total: f64 = regions.iter().map(measure).sum();
    let expected = measure(&coverage);
    assert!(
        (total - expected).abs() / expected < 1e-4,
        "regions cover {} of {}",
        total,
        expected
    );

    assert!(coverage.min.truncate().cmple(bounds.min.truncate()).all());
    assert!(coverage.max.truncate().cmpge(bounds.max.truncate()).all());
    if planar {
        assert_eq!(coverage.min.z, 0.0);
        assert_eq!(coverage.max.z, 0.0);
    } else {
        assert!(coverage.min.z <= bounds.min.z && coverage.max.z >= bounds.max.z);
    }

    // Every finest cell lies in exactly one region
    let res = config.resolution;
    let cells = (coverage.size() / res).round().as_uvec3().max(UVec3::ONE);
    for k in 0..cells.z {
        for j in 0..cells.y {
            for i in 0..cells.x {
                let mut centre = coverage.min + (UVec3::new(i, j, k).as_vec3() + 0.5) * res;
                if planar {
                    centre.z = coverage.min.z;
                }
                let hits = regions.iter().filter(|r| r.contains(centre)).count();
                assert_eq!(hits, 1, "cell centre {:?} covered {} times", centre, hits);
            }
        }
    }
}

#[test]
fn sphere_regions_tile_the_box() {
    assert_tiles_exactly(&Shape::sphere(1.0), &config(0.1, 4));
}

#[test]
fn part_regions_tile_the_box() {
    assert_tiles_exactly(&test_part(), &config(0.1, 6));
}

#[test]
fn circle_regions_tile_the_plane() {
    assert_tiles_exactly(&Shape::circle(1.0), &config(0.05, 8));
}

#[test]
fn circle_blocks_stay_in_the_plane() {
    let result = subdivide_shape(&Shape::circle(1.0), &config(0.05, 8)).unwrap();
    assert_eq!(result.dimension, 2);
    assert!(result.levels.len() > 1);
    for level in &result.levels {
        assert_eq!(level.lattice.z, 1);
    }
    assert!(!result.leaf_blocks.is_empty());
    for block in &result.leaf_blocks {
        assert_eq!(block.lattice.z, 1);
        assert_eq!(block.corner.z, 0.0);
        assert_eq!(block.extent().size().z, 0.0);
    }
    for block in &result.uniform_blocks {
        assert_eq!(block.corner.z, 0.0);
        assert_eq!(block.extent().size().z, 0.0);
    }

    // Only the disc's area is counted as inside
    let exact = std::f64::consts::PI;
    assert!(result.inside.volume > 0.0);
    assert!(result.inside.volume < exact);
}

#[test]
fn regions_tile_without_edge_overlap() {
    let mut cfg = config(0.1, 4);
    cfg.overlap_edge_samples = false;
    assert_tiles_exactly(&Shape::sphere(1.0), &cfg);
}

// ============================================================================
// Soundness
// ============================================================================

fn assert_uniform_blocks_are_uniform(shape: &Shape, config: &SubdivisionConfig) {
    let result = subdivide_shape(shape, config).unwrap();
    assert!(!result.uniform_blocks.is_empty());
    let vm = Vm::load(&shape.compile(&config.compile).unwrap()).unwrap();

    for block in &result.uniform_blocks {
        let step = block.size / 4.0;
        let layers = if result.dimension == 2 { 0 } else { 4 };
        for k in 0..=layers {
            for j in 0..=4 {
                for i in 0..=4 {
                    let p = block.corner + Vec3::new(i as f32, j as f32, k as f32) * step;
                    let d = vm.distance(p);
                    if block.inside {
                        assert!(d <= 1e-4, "inside block {:?} has d = {} at {:?}", block, d, p);
                    } else {
                        assert!(d >= -1e-4, "outside block {:?} has d = {} at {:?}", block, d, p);
                    }
                }
            }
        }
    }
}

#[test]
fn sphere_uniform_blocks_are_sound() {
    assert_uniform_blocks_are_uniform(&Shape::sphere(1.0), &config(0.05, 4));
}

#[test]
fn circle_uniform_blocks_are_sound() {
    assert_uniform_blocks_are_uniform(&Shape::circle(1.0), &config(0.05, 8));
}

#[test]
fn drilled_box_uniform_blocks_are_sound() {
    let shape = test_box().subtract(Shape::cylinder(0.5, 3.0)).unwrap();
    assert_uniform_blocks_are_uniform(&shape, &config(0.05, 5));
}

#[test]
fn inside_volume_never_exceeds_shape_volume() {
    let result = subdivide_shape(&Shape::sphere(1.0), &config(0.05, 4)).unwrap();
    let exact = 4.0 / 3.0 * std::f64::consts::PI;
    assert!(result.inside.volume > 0.0);
    assert!(result.inside.volume < exact);
}

// ============================================================================
// Device interaction
// ============================================================================

#[test]
fn leaf_samples_match_direct_evaluation() {
    let shape = test_part();
    let cfg = config(0.1, 4);
    let program = shape.compile(&cfg.compile).unwrap();
    let device = CpuDevice::new(&program).unwrap();
    let result = subdivide_on(&device, &shape.bounding_box(), 3, &cfg).unwrap();

    for block in result.leaf_blocks.iter().take(16) {
        let samples = device.sample_block(block).wait().unwrap();
        let n = block.lattice;
        assert_eq!(samples.len(), (n.x * n.y * n.z) as usize);
        let corner_far = n - UVec3::ONE;
        let index = (corner_far.x + n.x * (corner_far.y + n.y * corner_far.z)) as usize;
        let direct = device.vm().distance(block.sample_position(corner_far));
        assert_eq!(samples[index], direct);
    }
}

#[test]
fn preconditions_fail_before_dispatch() {
    let shape = Shape::sphere(1.0);
    for bad in [config(0.0, 4), config(0.1, 1), config(0.1, 257), config(0.1, 2000)] {
        assert!(matches!(
            subdivide_shape(&shape, &bad),
            Err(SubdivisionError::Precondition(_))
        ));
    }
    assert!(level_sizes(&shape.bounding_box(), 3, &config(0.1, 4)).is_ok());
}

#[test]
fn subdivision_is_deterministic() {
    let shape = test_part();
    let a = subdivide_shape(&shape, &config(0.1, 4)).unwrap();
    let b = subdivide_shape(&shape, &config(0.1, 4)).unwrap();
    assert_eq!(a.leaf_blocks, b.leaf_blocks);
    assert_eq!(a.levels, b.levels);
}
