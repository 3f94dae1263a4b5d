//! Draggable handles and point-drag geometry.

use crate::document::HistorySnapshot;
use crate::shapes::{Element, ElementId, ElementKind, GateEnd, end_tangent};
use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};

/// Which family of point a handle moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointKind {
    /// A geometry point (or derived rectangle corner / circle rim).
    Main,
    EntryGate,
    ExitGate,
}

impl PointKind {
    fn gate_end(self) -> Option<GateEnd> {
        match self {
            PointKind::Main => None,
            PointKind::EntryGate => Some(GateEnd::Entry),
            PointKind::ExitGate => Some(GateEnd::Exit),
        }
    }
}

/// Address of a draggable point on an element.
///
/// For rectangles `index` is a corner (0..4, clockwise from the first
/// stored point); for circles 0 is the center and 1 the rim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PointRef {
    pub index: usize,
    pub kind: PointKind,
}

impl PointRef {
    pub fn main(index: usize) -> Self {
        Self {
            index,
            kind: PointKind::Main,
        }
    }
}

/// Visual shape of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HandleShape {
    #[default]
    Square,
    Circle,
    Diamond,
}

/// A draggable point with its position in target space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Handle {
    pub position: Point,
    pub target: PointRef,
    pub shape: HandleShape,
}

impl Handle {
    pub fn new(position: Point, target: PointRef, shape: HandleShape) -> Self {
        Self { position, target, shape }
    }

    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        self.position.distance(point) <= tolerance
    }
}

/// All handles of an element.
pub fn handles_for(element: &Element) -> Vec<Handle> {
    let mut handles: Vec<Handle> = match element.kind {
        ElementKind::Rectangle => element
            .rectangle_corners()
            .map(|corners| {
                corners
                    .iter()
                    .enumerate()
                    .map(|(i, p)| Handle::new(*p, PointRef::main(i), HandleShape::Square))
                    .collect()
            })
            .unwrap_or_default(),
        ElementKind::Circle => element
            .points
            .iter()
            .take(2)
            .enumerate()
            .map(|(i, p)| {
                let shape = if i == 0 { HandleShape::Circle } else { HandleShape::Diamond };
                Handle::new(*p, PointRef::main(i), shape)
            })
            .collect(),
        ElementKind::Line | ElementKind::Curve | ElementKind::Area => element
            .points
            .iter()
            .enumerate()
            .map(|(i, p)| Handle::new(*p, PointRef::main(i), HandleShape::Circle))
            .collect(),
    };
    if let Some(gates) = &element.detection {
        for (kind, gate) in [(PointKind::EntryGate, &gates.entry), (PointKind::ExitGate, &gates.exit)] {
            for (index, p) in gate.iter().enumerate() {
                handles.push(Handle::new(*p, PointRef { index, kind }, HandleShape::Diamond));
            }
        }
    }
    handles
}

/// The handle nearest to `point` within `tolerance`.
pub fn hit_test_handles(element: &Element, point: Point, tolerance: f64) -> Option<Handle> {
    handles_for(element)
        .into_iter()
        .filter(|h| h.hit_test(point, tolerance))
        .min_by(|a, b| a.position.distance(point).total_cmp(&b.position.distance(point)))
}

/// What a drag moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DragTarget {
    /// One point of `DragState::element_id`.
    Point(PointRef),
    /// The whole selection.
    Selection,
}

/// An active drag. Geometry is always recomputed from `originals`, so a
/// drag never accumulates rounding drift.
#[derive(Debug, Clone)]
pub struct DragState {
    pub element_id: Option<ElementId>,
    pub target: DragTarget,
    /// Press position in target space.
    pub start: Point,
    pub current: Point,
    /// Grabbed elements as they were at press time.
    pub originals: Vec<Element>,
    /// Document at press time, recorded as the history "before".
    pub before: HistorySnapshot,
}

impl DragState {
    pub fn offset(&self) -> Vec2 {
        self.current - self.start
    }

    pub fn has_moved(&self) -> bool {
        self.offset().hypot2() > f64::EPSILON
    }
}

/// The element after moving one of its points to `to`.
pub fn drag_point(original: &Element, target: PointRef, to: Point) -> Element {
    let mut element = original.clone();
    match target.kind.gate_end() {
        Some(end) => {
            if let Some(p) = element.detection.as_mut().and_then(|g| g.gate_mut(end).get_mut(target.index)) {
                *p = to;
            }
        }
        None => move_main_point(&mut element, original, target.index, to),
    }
    element.mark_edited();
    element
}

fn move_main_point(element: &mut Element, original: &Element, index: usize, to: Point) {
    match element.kind {
        ElementKind::Rectangle => {
            let [a, b] = match original.points.as_slice() {
                [a, b, ..] => [*a, *b],
                _ => return,
            };
            // Each corner owns one coordinate of each stored point.
            let (p0, p1) = match index {
                0 => (to, b),
                1 => (Point::new(a.x, to.y), Point::new(to.x, b.y)),
                2 => (a, to),
                3 => (Point::new(to.x, a.y), Point::new(b.x, to.y)),
                _ => return,
            };
            element.points[0] = p0;
            element.points[1] = p1;
        }
        ElementKind::Circle => match (index, original.points.first()) {
            (0, Some(center)) => element.translate(to - *center),
            (1, Some(_)) if element.points.len() > 1 => element.points[1] = to,
            _ => {}
        },
        ElementKind::Area => {
            if let Some(p) = element.points.get_mut(index) {
                *p = to;
            }
        }
        ElementKind::Line | ElementKind::Curve => {
            let Some(p) = element.points.get_mut(index) else {
                return;
            };
            *p = to;
            follow_gates(element, original);
            element.refresh_direction();
        }
    }
}

/// Rotate and translate gates so they keep their angle to the moved ends.
fn follow_gates(element: &mut Element, original: &Element) {
    let Some(mut gates) = original.detection.clone() else {
        return;
    };
    for end in [GateEnd::Entry, GateEnd::Exit] {
        let pivot = |points: &[Point]| match end {
            GateEnd::Entry => points.first().copied(),
            GateEnd::Exit => points.last().copied(),
        };
        let (Some(old_pivot), Some(new_pivot)) = (pivot(&original.points), pivot(&element.points)) else {
            continue;
        };
        let old_tangent = end_tangent(original.kind, &original.points, end).unwrap_or(Vec2::ZERO);
        let new_tangent = end_tangent(element.kind, &element.points, end).unwrap_or(Vec2::ZERO);
        gates.follow_endpoint(end, old_pivot, new_pivot, old_tangent, new_tangent);
    }
    element.detection = Some(gates);
}
