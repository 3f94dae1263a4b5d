//! Geometry kernel: distance and containment primitives, spline evaluation
//! and rasterization into the detection matrix.
//!
//! Everything here is a pure function of its inputs.

mod matrix;

pub use matrix::{DetectionMatrix, generate_matrix};

use kurbo::{Point, Rect, Vec2};

/// Number of samples per curve segment used for display and rasterization.
pub const CURVE_SEGMENT_STEPS: usize = 16;

/// Distance from a point to a line segment (a→b).
pub fn distance_point_to_segment(point: Point, a: Point, b: Point) -> f64 {
    let seg = b - a;
    let pv = point - a;
    let len_sq = seg.hypot2();
    if len_sq < f64::EPSILON {
        return pv.hypot();
    }
    let t = (pv.dot(seg) / len_sq).clamp(0.0, 1.0);
    let proj = a + seg * t;
    point.distance(proj)
}

/// Minimum distance from a point to a polyline (sequence of connected segments).
pub fn point_to_polyline_dist(point: Point, points: &[Point]) -> f64 {
    match points {
        [] => f64::INFINITY,
        [only] => point.distance(*only),
        _ => points
            .windows(2)
            .map(|w| distance_point_to_segment(point, w[0], w[1]))
            .fold(f64::INFINITY, f64::min),
    }
}

/// Even-odd ray casting test.
///
/// Points exactly on an edge are classified by the crossing arithmetic alone:
/// with a ray cast towards +x, edges on the low-x/low-y side of an
/// axis-aligned polygon count as inside and those on the high side as
/// outside. Callers needing an inclusive boundary
/// should combine this with [`point_to_polyline_dist`].
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let vi = polygon[i];
        let vj = polygon[j];
        if ((vi.y > point.y) != (vj.y > point.y))
            && (point.x < (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Evaluate a uniform Catmull-Rom spline segment between `p1` and `p2`.
pub fn catmull_rom_spline(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let t2 = t * t;
    let t3 = t2 * t;
    let (v0, v1, v2, v3) = (p0.to_vec2(), p1.to_vec2(), p2.to_vec2(), p3.to_vec2());
    let v = (v1 * 2.0
        + (v2 - v0) * t
        + (v0 * 2.0 - v1 * 5.0 + v2 * 4.0 - v3) * t2
        + (v1 * 3.0 - v0 - v2 * 3.0 + v3) * t3)
        * 0.5;
    v.to_point()
}

/// Sample a Catmull-Rom curve through every control point.
///
/// End segments reuse the first/last point as the missing neighbour, so the
/// curve passes through all points and starts/ends exactly on them.
pub fn sample_catmull_rom(points: &[Point], steps: usize) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let steps = steps.max(1);
    let last = points.len() - 1;
    let mut samples = Vec::with_capacity(last * steps + 1);
    for i in 0..last {
        let p0 = points[i.saturating_sub(1)];
        let p1 = points[i];
        let p2 = points[i + 1];
        let p3 = points[(i + 2).min(last)];
        for s in 0..steps {
            samples.push(catmull_rom_spline(p0, p1, p2, p3, s as f64 / steps as f64));
        }
    }
    samples.push(points[last]);
    samples
}

/// Axis-aligned bounds of a point set, or `None` if empty.
pub fn bounds_of_points(points: &[Point]) -> Option<Rect> {
    let first = points.first()?;
    Some(
        points
            .iter()
            .skip(1)
            .fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p)),
    )
}

/// Unit vector in the direction of `v`, or zero for a degenerate vector.
pub fn unit(v: Vec2) -> Vec2 {
    let len = v.hypot();
    if len < f64::EPSILON { Vec2::ZERO } else { v / len }
}
