//! Direction arrows and entry/exit detection gates for lines and curves.

use super::ElementKind;
use crate::geometry::{CURVE_SEGMENT_STEPS, catmull_rom_spline, sample_catmull_rom, unit};
use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

/// Start/end of the arrow drawn along a directional element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Direction {
    pub start: Point,
    pub end: Point,
}

/// Which end of a directional element a gate sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateEnd {
    Entry,
    Exit,
}

/// Short segments perpendicular to the element at its two ends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionGates {
    pub entry: [Point; 2],
    pub exit: [Point; 2],
}

impl DetectionGates {
    pub fn gate(&self, end: GateEnd) -> &[Point; 2] {
        match end {
            GateEnd::Entry => &self.entry,
            GateEnd::Exit => &self.exit,
        }
    }

    pub fn gate_mut(&mut self, end: GateEnd) -> &mut [Point; 2] {
        match end {
            GateEnd::Entry => &mut self.entry,
            GateEnd::Exit => &mut self.exit,
        }
    }

    pub(crate) fn map_points(&mut self, f: impl Fn(Point) -> Point) {
        for p in self.entry.iter_mut().chain(self.exit.iter_mut()) {
            *p = f(*p);
        }
    }

    /// Carry a gate along with its moved endpoint.
    ///
    /// The gate is translated by the pivot's displacement, then rotated about
    /// the new pivot by the change in tangent angle, which keeps its angle to
    /// the element (perpendicular, unless the user tilted it) intact.
    pub fn follow_endpoint(&mut self, end: GateEnd, old_pivot: Point, new_pivot: Point, old_tangent: Vec2, new_tangent: Vec2) {
        let angle = if old_tangent.hypot2() < f64::EPSILON || new_tangent.hypot2() < f64::EPSILON {
            0.0
        } else {
            new_tangent.atan2() - old_tangent.atan2()
        };
        let transform = Affine::rotate_about(angle, new_pivot) * Affine::translate(new_pivot - old_pivot);
        for p in self.gate_mut(end).iter_mut() {
            *p = transform * *p;
        }
    }
}

/// Tangent of a directional element at one of its ends, pointing along travel.
pub fn end_tangent(kind: ElementKind, points: &[Point], end: GateEnd) -> Option<Vec2> {
    if !kind.is_directional() || points.len() < 2 {
        return None;
    }
    let path = match kind {
        ElementKind::Curve => sample_catmull_rom(points, CURVE_SEGMENT_STEPS),
        _ => points.to_vec(),
    };
    let n = path.len();
    let tangent = match end {
        GateEnd::Entry => path[1] - path[0],
        GateEnd::Exit => path[n - 1] - path[n - 2],
    };
    Some(tangent)
}

/// Arrow along the element: a straight line end to end, or the final stretch
/// of a curve so the arrowhead follows its tangent.
pub fn compute_direction(kind: ElementKind, points: &[Point]) -> Option<Direction> {
    if !kind.is_directional() || points.len() < 2 {
        return None;
    }
    let n = points.len();
    match kind {
        ElementKind::Curve if n >= 3 => {
            let p0 = points[n.saturating_sub(3)];
            let p1 = points[n - 2];
            let p2 = points[n - 1];
            Some(Direction {
                start: catmull_rom_spline(p0, p1, p2, p2, 0.9),
                end: p2,
            })
        }
        _ => Some(Direction {
            start: points[0],
            end: points[n - 1],
        }),
    }
}

fn gate_at(pivot: Point, tangent: Vec2, half_length: f64) -> [Point; 2] {
    let t = unit(tangent);
    let normal = Vec2::new(-t.y, t.x) * half_length;
    [pivot - normal, pivot + normal]
}

/// Entry and exit gates centered on the two ends, perpendicular to the tangents.
pub fn compute_gates(kind: ElementKind, points: &[Point], half_length: f64) -> Option<DetectionGates> {
    let entry_tangent = end_tangent(kind, points, GateEnd::Entry)?;
    let exit_tangent = end_tangent(kind, points, GateEnd::Exit)?;
    let first = *points.first()?;
    let last = *points.last()?;
    Some(DetectionGates {
        entry: gate_at(first, entry_tangent, half_length),
        exit: gate_at(last, exit_tangent, half_length),
    })
}
