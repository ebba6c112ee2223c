//! Integration tests: Shape → node DAG → schedule → bytecode → VM
//!
//! Author: Moroya Sakamoto

mod common;

use alice_csg::compiled::{
    encode, BuildError, Instruction, NodeCache, OpCode, Scheduler, TrialOrder, WgslDispatch,
};
use alice_csg::prelude::*;
use common::*;
use glam::Vec4;

// ============================================================================
// End-to-end
// ============================================================================

#[test]
fn box_union_sphere_end_to_end() {
    let program = test_box_union_sphere()
        .compile(&CompileConfig::default())
        .unwrap();

    let mut ops: Vec<OpCode> = program.decode().unwrap().iter().map(|i| i.opcode).collect();
    ops.sort_by_key(|op| op.code());
    assert_eq!(
        ops,
        vec![OpCode::Return, OpCode::Sphere, OpCode::Box3d, OpCode::Union]
    );
    assert_eq!(program.register_count(), 2);

    // Outside the sphere, inside the box: the union is the box itself
    let p = Vec3::new(0.8, 0.0, 0.0);
    let vm = Vm::load(&program).unwrap();
    let box_vm = Vm::load(&test_box().compile(&CompileConfig::default()).unwrap()).unwrap();
    assert!(vm.distance(p) < 0.0);
    assert_eq!(vm.eval(p), box_vm.eval(p));
    assert!((vm.distance(p) + 0.2).abs() < 1e-6);
}

#[test]
fn part_compiles_and_evaluates() {
    let part = test_part();
    let program = part.compile(&CompileConfig::default()).unwrap();
    let vm = Vm::load(&program).unwrap();

    // Inside the plate, away from the hole and boss
    assert!(vm.distance(Vec3::new(0.0, -0.6, 0.0)) < 0.0);
    // In the hole
    assert!(vm.distance(Vec3::new(-0.8, 0.0, 0.0)) > 0.0);
    // Above the plate on the boss axis
    assert!(vm.distance(Vec3::new(0.8, 0.0, 1.0)) < 0.0);
    // Far away
    assert!(vm.distance(Vec3::new(5.0, 5.0, 5.0)) > 4.0);
}

#[test]
fn batch_and_lattice_match_scalar() {
    let vm = Vm::load(&test_part().compile(&CompileConfig::default()).unwrap()).unwrap();
    let points = grid_points(8, 2.0);
    let scalar: Vec<Vec4> = points.iter().map(|&p| vm.eval(p)).collect();
    assert_eq!(vm.eval_batch(&points), scalar);
    assert_eq!(vm.eval_batch_parallel(&points), scalar);

    let lattice = vm.eval_lattice(Vec3::splat(-1.75), 0.5, [8, 8, 8]);
    for (i, &d) in lattice.iter().enumerate() {
        assert_eq!(d, scalar[i].w);
    }
}

#[test]
fn scaled_sphere_keeps_inside_and_outside() {
    let vm = Vm::load(
        &Shape::sphere(1.0)
            .scale(2.0)
            .unwrap()
            .compile(&CompileConfig::default())
            .unwrap(),
    )
    .unwrap();
    assert!((vm.distance(Vec3::ZERO) + 2.0).abs() < 1e-5);
    assert!((vm.distance(Vec3::new(5.0, 0.0, 0.0)) - 3.0).abs() < 1e-5);
}

#[test]
fn degenerate_scales_are_rejected() {
    for factor in [-2.0, 0.0, f32::NAN] {
        assert!(matches!(
            Shape::sphere(1.0).scale(factor),
            Err(BuildError::InvalidShape(_))
        ));

        // Hand-built transforms are caught when lowering
        let shape = Shape::sphere(1.0).transform(Transform::from_scale(factor));
        match shape.compile(&CompileConfig::default()) {
            Err(CompileError::Build(BuildError::InvalidShape(_))) => {}
            other => panic!("scale {factor}: unexpected {:?}", other),
        }
    }
}

// ============================================================================
// CSE identity
// ============================================================================

#[test]
fn identical_subexpressions_share_nodes() {
    let mut cache = NodeCache::new();
    let a = test_part().lower(&mut cache).unwrap();
    let len = cache.len();
    let b = test_part().lower(&mut cache).unwrap();
    assert_eq!(a, b);
    assert_eq!(cache.len(), len);
    assert!(cache.hits() > 0);
}

#[test]
fn distinct_subexpressions_get_distinct_nodes() {
    let mut cache = NodeCache::new();
    let a = Shape::sphere(1.0).lower(&mut cache).unwrap();
    let b = Shape::sphere(1.0).offset(0.0).lower(&mut cache).unwrap();
    let c = Shape::sphere(1.0 + f32::EPSILON).lower(&mut cache).unwrap();
    let d = Shape::box3d(2.0, 2.0, 2.0).lower(&mut cache).unwrap();
    let ids = [a, b, c, d];
    for i in 0..ids.len() {
        for j in i + 1..ids.len() {
            assert_ne!(ids[i], ids[j]);
        }
    }
}

// ============================================================================
// Allocator safety
// ============================================================================

#[test]
fn every_trial_reads_live_values() {
    for shape in [test_box_union_sphere(), test_part(), sphere_row(9)] {
        let (cache, root) = lowered(&shape);
        let scheduler = Scheduler::new(&cache, root).unwrap();
        for trial in 0..20 {
            let schedule = scheduler.run_trial(TrialOrder::for_trial(trial, 7), trial);
            assert_schedule_reads_live_values(&cache, root, &schedule);
        }
    }
}

#[test]
fn every_trial_evaluates_the_same_shape() {
    let shape = test_part();
    let (cache, root) = lowered(&shape);
    let scheduler = Scheduler::new(&cache, root).unwrap();
    let reference = encode(&cache, &scheduler.run_trial(TrialOrder::Identity, 0));
    let points = grid_points(10, 2.0);
    for trial in 1..12 {
        let schedule = scheduler.run_trial(TrialOrder::for_trial(trial, 99), trial);
        let program = encode(&cache, &schedule);
        assert_programs_agree(&reference, &program, &points, 1e-4);
    }
}

// ============================================================================
// Scheduler monotonicity
// ============================================================================

#[test]
fn best_trial_never_worse_than_identity() {
    for shape in [test_part(), sphere_row(12)] {
        let (cache, root) = lowered(&shape);
        let scheduler = Scheduler::new(&cache, root).unwrap();
        let identity = scheduler.run_trial(TrialOrder::Identity, 0).registers_needed;

        let mut previous = usize::MAX;
        for k in [0, 1, 2, 5, 10, 40] {
            let best = scheduler.best(k, 0x5eed).registers_needed;
            assert!(best <= identity, "k={k}: {best} > identity {identity}");
            assert!(best <= previous, "k={k}: {best} > previous {previous}");
            previous = best;
        }
    }
}

#[test]
fn register_budget_is_enforced() {
    let config = CompileConfig::default().with_max_registers(2);
    match sphere_row(12).compile(&config) {
        Err(CompileError::RegisterBudgetExceeded { needed, budget }) => {
            assert!(needed > 2);
            assert_eq!(budget, 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

// ============================================================================
// Encode / decode round trip
// ============================================================================

#[test]
fn decode_reproduces_schedule() {
    let (cache, root) = lowered(&test_part());
    let schedule = Scheduler::new(&cache, root).unwrap().best(10, 1);
    let program = encode(&cache, &schedule);

    let expected: Vec<Instruction> = schedule
        .order
        .iter()
        .filter(|e| e.opcode != OpCode::Point)
        .map(|e| {
            let input = |i: usize| e.inputs.get(i).map_or(0, |&r| r as u8);
            Instruction::new(
                e.opcode,
                e.register as u8,
                [input(0), input(1)],
                cache[e.node].params().to_vec(),
            )
        })
        .chain(std::iter::once(Instruction::ret(
            schedule.result_register() as u8,
        )))
        .collect();
    assert_eq!(program.decode().unwrap(), expected);

    let reloaded =
        Program::from_bytes(program.register_count(), program.bytecode().to_vec()).unwrap();
    assert_eq!(reloaded, program);
}

#[test]
fn dispatch_source_lists_every_encoded_opcode() {
    let program = test_part().compile(&CompileConfig::default()).unwrap();
    let source = WgslDispatch::generate(program.register_count()).to_compute_shader();
    for inst in program.decode().unwrap() {
        let constant = format!(
            "const OP_{}: u32 = {}u;",
            inst.opcode.name().to_ascii_uppercase(),
            inst.opcode.code()
        );
        assert!(source.contains(&constant), "missing {constant}");
    }
}
