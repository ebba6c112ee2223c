//! Boolean and offset kernels (Deep Fried Edition)
//!
//! Union, intersection and subtraction take one parameter `r`. For
//! `r <= 0` they are the sharp min/max; otherwise they blend with a
//! circular fillet of radius `r`, which keeps the result a valid distance
//! bound. Intersection and subtraction are derived from union by negating
//! values, so all three share one reduction function.
//!
//! # Deep Fried Optimizations
//! - **Forced Inlining**: `#[inline(always)]` on the shared reduction.
//! - **Whole-Register Negation**: `-v` flips gradient and distance at once.
//!
//! Author: Moroya Sakamoto

use glam::{Vec2, Vec3, Vec4};

/// Rounded union of two shape values.
///
/// ```text
/// u = max(vec2(r - a, r - b), 0)
/// d = max(r, min(a, b)) - |u|
/// ```
#[inline(always)]
pub fn round_union(a: Vec4, b: Vec4, r: f32) -> Vec4 {
    let sharp = if a.w <= b.w { a } else { b };
    if r <= 0.0 {
        return sharp;
    }
    let u = Vec2::new(r - a.w, r - b.w).max(Vec2::ZERO);
    let len = u.length();
    if len == 0.0 {
        return sharp;
    }
    let g = (a.truncate() * u.x + b.truncate() * u.y) / len;
    g.extend(r.max(sharp.w) - len)
}

/// Rounded intersection of two shape values
#[inline(always)]
pub fn round_intersection(a: Vec4, b: Vec4, r: f32) -> Vec4 {
    -round_union(-a, -b, r)
}

/// Union: params = [r]
pub fn union(params: &[f32], input1: Vec4, input2: Vec4, _: Vec3) -> Vec4 {
    round_union(input1, input2, params[0])
}

/// Intersection: params = [r]
pub fn intersection(params: &[f32], input1: Vec4, input2: Vec4, _: Vec3) -> Vec4 {
    round_intersection(input1, input2, params[0])
}

/// Subtraction `input1 - input2`: params = [r]
pub fn subtraction(params: &[f32], input1: Vec4, input2: Vec4, _: Vec3) -> Vec4 {
    round_intersection(input1, -input2, params[0])
}

/// Offset the surface outward by `params[0]`
pub fn offset(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    input1 - Vec4::new(0.0, 0.0, 0.0, params[0])
}

/// Hollow shell of half thickness `params[0]` centred on the surface
pub fn shell(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    let s = if input1.w < 0.0 { -1.0 } else { 1.0 };
    (input1.truncate() * s).extend(input1.w.abs() - params[0])
}
