//! Primitive kernels (Deep Fried Edition)
//!
//! Primitives read the local evaluation point from `input1` (the output of
//! the point node or of a transformation) and return distance plus
//! analytic gradient.
//!
//! # Deep Fried Optimizations
//! - **Forced Inlining**: `#[inline(always)]` on the distance helpers.
//! - **Branchless Signs**: `signum()` folds the octant back in one multiply.
//!
//! Author: Moroya Sakamoto

use super::shape_value;
use glam::{Vec2, Vec3, Vec4};

/// Box distance in 2D with gradient, for a point already folded into the
/// positive quadrant (`q = |p| - half_extents`).
#[inline(always)]
fn box_2d(q: Vec2, sign: Vec2) -> (Vec2, f32) {
    let outside = q.max(Vec2::ZERO);
    let len = outside.length();
    if len > 0.0 {
        (outside / len * sign, len)
    } else if q.x > q.y {
        (Vec2::new(sign.x, 0.0), q.x)
    } else {
        (Vec2::new(0.0, sign.y), q.y)
    }
}

/// Box distance in 3D with gradient
#[inline(always)]
fn box_3d(q: Vec3, sign: Vec3) -> (Vec3, f32) {
    let outside = q.max(Vec3::ZERO);
    let len = outside.length();
    if len > 0.0 {
        return (outside / len * sign, len);
    }
    if q.x >= q.y && q.x >= q.z {
        (Vec3::new(sign.x, 0.0, 0.0), q.x)
    } else if q.y >= q.z {
        (Vec3::new(0.0, sign.y, 0.0), q.y)
    } else {
        (Vec3::new(0.0, 0.0, sign.z), q.z)
    }
}

/// Rectangle in the XY plane: params = [half_x, half_y]
pub fn rectangle(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    let p = input1.truncate().truncate();
    let (g, d) = box_2d(p.abs() - Vec2::new(params[0], params[1]), p.signum());
    shape_value(g.extend(0.0), d)
}

/// Circle in the XY plane: params = [radius]
pub fn circle(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    let p = input1.truncate().truncate();
    shape_value(p.normalize_or_zero().extend(0.0), p.length() - params[0])
}

/// Closed polygon in the XY plane: params = [x0, y0, x1, y1, ...]
///
/// Winding order does not matter; the sign comes from a crossing count.
pub fn polygon2d(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    let p = input1.truncate().truncate();
    let n = params.len() / 2;
    if n == 0 {
        return shape_value(Vec3::ZERO, f32::MAX);
    }
    let vertex = |i: usize| Vec2::new(params[2 * i], params[2 * i + 1]);

    let mut best = f32::MAX;
    let mut delta = Vec2::ZERO;
    let mut sign = 1.0f32;
    for i in 0..n {
        let vi = vertex(i);
        let vj = vertex((i + n - 1) % n);
        let e = vj - vi;
        let w = p - vi;
        let ee = e.dot(e);
        let t = if ee > 0.0 { (w.dot(e) / ee).clamp(0.0, 1.0) } else { 0.0 };
        let b = w - e * t;
        let bb = b.dot(b);
        if bb < best {
            best = bb;
            delta = b;
        }
        let c0 = p.y >= vi.y;
        let c1 = p.y < vj.y;
        let c2 = e.x * w.y > e.y * w.x;
        if (c0 && c1 && c2) || (!c0 && !c1 && !c2) {
            sign = -sign;
        }
    }

    let d = best.sqrt();
    let g = if d > 0.0 { delta / d * sign } else { Vec2::ZERO };
    shape_value(g.extend(0.0), d * sign)
}

/// Sphere: params = [radius]
pub fn sphere(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    let p = input1.truncate();
    shape_value(p.normalize_or_zero(), p.length() - params[0])
}

/// Box: params = [half_x, half_y, half_z]
pub fn box3d(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    let p = input1.truncate();
    let half = Vec3::new(params[0], params[1], params[2]);
    let (g, d) = box_3d(p.abs() - half, p.signum());
    shape_value(g, d)
}

/// Cylinder along Z: params = [radius, height]
pub fn cylinder(params: &[f32], input1: Vec4, _: Vec4, _: Vec3) -> Vec4 {
    let p = input1.truncate();
    let radial = Vec2::new(p.x, p.y);
    let dir = radial.normalize_or_zero();
    let profile = Vec2::new(radial.length(), p.z);
    let (g, d) = box_2d(
        profile.abs() - Vec2::new(params[0], params[1] * 0.5),
        Vec2::new(1.0, p.z.signum()),
    );
    shape_value(Vec3::new(g.x * dir.x, g.x * dir.y, g.y), d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::point_value;

    fn eval(kernel: fn(&[f32], Vec4, Vec4, Vec3) -> Vec4, params: &[f32], p: Vec3) -> Vec4 {
        kernel(params, point_value(p), Vec4::ZERO, p)
    }

    #[test]
    fn test_sphere() {
        let v = eval(sphere, &[1.0], Vec3::new(2.0, 0.0, 0.0));
        assert!((v.w - 1.0).abs() < 0.0001);
        assert!((v.truncate() - Vec3::X).length() < 0.0001);
    }

    #[test]
    fn test_box_inside_and_outside() {
        let half = [1.0, 2.0, 3.0];
        let inside = eval(box3d, &half, Vec3::new(0.5, 0.0, 0.0));
        assert!((inside.w + 0.5).abs() < 0.0001);
        assert!((inside.truncate() - Vec3::X).length() < 0.0001);

        let corner = eval(box3d, &half, Vec3::new(2.0, 3.0, 3.0));
        assert!((corner.w - 2.0f32.sqrt()).abs() < 0.0001);
    }

    #[test]
    fn test_box_negative_side_gradient() {
        let v = eval(box3d, &[1.0, 1.0, 1.0], Vec3::new(0.0, -3.0, 0.0));
        assert!((v.w - 2.0).abs() < 0.0001);
        assert!((v.truncate() + Vec3::Y).length() < 0.0001);
    }

    #[test]
    fn test_rectangle_and_circle() {
        let r = eval(rectangle, &[1.0, 0.5], Vec3::new(0.0, 1.5, 7.0));
        assert!((r.w - 1.0).abs() < 0.0001);
        assert_eq!(r.z, 0.0);

        let c = eval(circle, &[2.0], Vec3::new(0.0, 1.0, 4.0));
        assert!((c.w + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_polygon_square() {
        let square = [-1.0, -1.0, 1.0, -1.0, 1.0, 1.0, -1.0, 1.0];
        let inside = eval(polygon2d, &square, Vec3::ZERO);
        assert!((inside.w + 1.0).abs() < 0.0001, "got {}", inside.w);

        let outside = eval(polygon2d, &square, Vec3::new(3.0, 0.0, 0.0));
        assert!((outside.w - 2.0).abs() < 0.0001);
        assert!((outside.truncate() - Vec3::X).length() < 0.0001);
    }

    #[test]
    fn test_polygon_winding_independent() {
        let ccw = [0.0, 0.0, 2.0, 0.0, 0.0, 2.0];
        let cw = [0.0, 0.0, 0.0, 2.0, 2.0, 0.0];
        let p = Vec3::new(0.4, 0.4, 0.0);
        let a = eval(polygon2d, &ccw, p);
        let b = eval(polygon2d, &cw, p);
        assert!(a.w < 0.0);
        assert!((a.w - b.w).abs() < 0.0001);
    }

    #[test]
    fn test_cylinder() {
        let side = eval(cylinder, &[1.0, 4.0], Vec3::new(0.0, 3.0, 0.0));
        assert!((side.w - 2.0).abs() < 0.0001);
        assert!((side.truncate() - Vec3::Y).length() < 0.0001);

        let cap = eval(cylinder, &[1.0, 4.0], Vec3::new(0.0, 0.0, -3.0));
        assert!((cap.w - 1.0).abs() < 0.0001);
        assert!((cap.truncate() + Vec3::Z).length() < 0.0001);
    }
}
