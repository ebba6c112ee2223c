//! Per-opcode kernels for the CPU reference device
//!
//! Every register of the VM holds a `Vec4`. Point-valued registers carry
//! `(x, y, z, 0)`; shape-valued registers carry the gradient in `xyz` and
//! the signed distance in `w`. 2D shapes leave the gradient's `z` at zero.
//!
//! All kernels share the [`Kernel`] signature and are pure: the same
//! inputs always produce the same output, with no side effects, so a VM
//! instance can run independently per sample point.
//!
//! Author: Moroya Sakamoto

pub mod operations;
pub mod primitives;
pub mod transforms;

use glam::{Vec3, Vec4};

/// Calling contract shared by every opcode implementation.
///
/// `params` holds exactly the opcode's parameter words, `input1`/`input2`
/// the values of its input registers (`Vec4::ZERO` when unused) and
/// `point` the original evaluation point.
pub type Kernel = fn(params: &[f32], input1: Vec4, input2: Vec4, point: Vec3) -> Vec4;

/// Pack a gradient and a distance into a register value
#[inline(always)]
pub fn shape_value(gradient: Vec3, distance: f32) -> Vec4 {
    gradient.extend(distance)
}

/// Pack a point into a register value
#[inline(always)]
pub fn point_value(point: Vec3) -> Vec4 {
    point.extend(0.0)
}

/// Signed distance stored in a shape-valued register
#[inline(always)]
pub fn distance(value: Vec4) -> f32 {
    value.w
}

/// Gradient stored in a shape-valued register
#[inline(always)]
pub fn gradient(value: Vec4) -> Vec3 {
    value.truncate()
}
