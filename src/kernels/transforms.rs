//! Point-mapping kernels
//!
//! A transformation is split into a `_to` half that maps the evaluation
//! point into the child's local frame and a `_from` half that maps the
//! child's value back into the parent frame.
//!
//! Author: Moroya Sakamoto

use super::{point_value, shape_value};
use glam::{Quat, Vec2, Vec3, Vec4};

#[inline(always)]
fn quat(params: &[f32]) -> Quat {
    Quat::from_xyzw(params[0], params[1], params[2], params[3])
}

/// Map a point by `q * (p * s) + t`: params = [qx, qy, qz, qw, s, tx, ty, tz]
pub fn transformation_to(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    let t = Vec3::new(params[5], params[6], params[7]);
    point_value(quat(params) * (input1.truncate() * params[4]) + t)
}

/// Rotate the gradient by `q` and scale the distance by `s`:
/// params = [qx, qy, qz, qw, s]
pub fn transformation_from(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    shape_value(quat(params) * input1.truncate(), input1.w * params[4])
}

/// Extrude a 2D value (`input1`) along Z over `[-h/2, h/2]`, with the
/// evaluation point in `input2`: params = [h]
pub fn extrusion(params: &[f32], input1: Vec4, input2: Vec4, _: Vec3) -> Vec4 {
    let z = input2.z;
    let slab = z.abs() - params[0] * 0.5;
    let slab_grad = Vec3::new(0.0, 0.0, if z < 0.0 { -1.0 } else { 1.0 });
    let profile_grad = input1.truncate();
    let w = Vec2::new(input1.w, slab);
    let outside = w.max(Vec2::ZERO);
    let len = outside.length();
    if len > 0.0 {
        let g = (profile_grad * outside.x + slab_grad * outside.y) / len;
        shape_value(g, len)
    } else if w.x > w.y {
        shape_value(profile_grad, w.x)
    } else {
        shape_value(slab_grad, w.y)
    }
}

/// Fold a point around the Y axis into the (radius, height) half plane
pub fn revolution_to(_: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    let p = input1.truncate();
    point_value(Vec3::new(Vec2::new(p.x, p.z).length(), p.y, 0.0))
}

/// Unfold a 2D value (`input1`) computed in the revolution half plane,
/// using the unfolded point in `input2` to orient the radial gradient
pub fn revolution_from(_: &[f32], input1: Vec4, input2: Vec4, _: Vec3) -> Vec4 {
    let dir = Vec2::new(input2.x, input2.z).normalize_or_zero();
    let g = Vec3::new(input1.x * dir.x, input1.y, input1.x * dir.y);
    shape_value(g, input1.w)
}
