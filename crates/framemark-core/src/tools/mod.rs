//! Drawing modes and the tool that builds in-progress elements.

use crate::shapes::{Element, ElementKind, SemanticType, SerializableColor};
use kurbo::Point;
use serde::{Deserialize, Serialize};

/// Interaction mode of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DrawingMode {
    /// Pick and drag points; no drawing.
    #[default]
    Cursor,
    /// Pick, multi-select and move whole elements.
    Select,
    /// Delete the element under the pointer.
    Erase,
    Line,
    Area,
    Curve,
    Rectangle,
    Circle,
}

impl DrawingMode {
    /// Kind of element this mode draws, if any.
    pub fn element_kind(self) -> Option<ElementKind> {
        match self {
            DrawingMode::Line => Some(ElementKind::Line),
            DrawingMode::Area => Some(ElementKind::Area),
            DrawingMode::Curve => Some(ElementKind::Curve),
            DrawingMode::Rectangle => Some(ElementKind::Rectangle),
            DrawingMode::Circle => Some(ElementKind::Circle),
            DrawingMode::Cursor | DrawingMode::Select | DrawingMode::Erase => None,
        }
    }

    pub fn is_drawing_mode(self) -> bool {
        self.element_kind().is_some()
    }

    /// Modes where a press picks elements or handles.
    pub fn is_picking_mode(self) -> bool {
        matches!(self, DrawingMode::Cursor | DrawingMode::Select)
    }
}

/// Builds elements from pointer input.
#[derive(Debug, Clone)]
pub struct ToolManager {
    /// Color applied to new elements.
    pub current_color: SerializableColor,
    /// Semantic type applied to new lines and curves.
    pub semantic_type: SemanticType,
    /// Clicks closer than this to the previous point are ignored.
    pub min_point_distance: f64,
    /// Rubber-band position shown after the last point of an area/curve.
    pub preview_point: Option<Point>,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self {
            current_color: SerializableColor::annotation(),
            semantic_type: SemanticType::Annotation,
            min_point_distance: 2.0,
            preview_point: None,
        }
    }
}

impl ToolManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new element at `point`.
    ///
    /// Two-point kinds start with both points on the press position and are
    /// stretched by [`Self::update`]; multi-point kinds start with one point.
    pub fn begin(&mut self, mode: DrawingMode, point: Point) -> Option<Element> {
        let kind = mode.element_kind()?;
        let points = if kind.is_multi_point() { vec![point] } else { vec![point, point] };
        let semantic_type = if kind.is_directional() {
            self.semantic_type
        } else {
            SemanticType::Annotation
        };
        self.preview_point = None;
        Some(
            Element::new(kind, points)
                .with_color(self.current_color)
                .with_semantic_type(semantic_type),
        )
    }

    /// Move the trailing point of a two-point element.
    ///
    /// With `constrain`, rectangles keep a square aspect.
    pub fn update(&self, element: &mut Element, point: Point, constrain: bool) {
        if element.kind.is_multi_point() {
            return;
        }
        let Some(anchor) = element.points.first().copied() else {
            return;
        };
        let target = if constrain && element.kind == ElementKind::Rectangle {
            constrain_square(anchor, point)
        } else {
            point
        };
        if let Some(last) = element.points.get_mut(1) {
            *last = target;
        }
    }

    /// Append a click to an area/curve. Returns false if it was too close
    /// to the previous point.
    pub fn add_point(&mut self, element: &mut Element, point: Point) -> bool {
        if let Some(last) = element.points.last() {
            if last.distance(point) < self.min_point_distance {
                return false;
            }
        }
        element.points.push(point);
        self.preview_point = None;
        true
    }

    /// Track the rubber-band point while an area/curve is open.
    pub fn hover(&mut self, point: Point) {
        self.preview_point = Some(point);
    }

    /// Points to draw for an in-progress element, including the rubber band.
    pub fn preview_points(&self, element: &Element) -> Vec<Point> {
        let mut points = element.points.clone();
        if element.kind.is_multi_point() {
            if let Some(p) = self.preview_point {
                points.push(p);
            }
        }
        points
    }

    /// Finish an element. Returns `None` if it is degenerate.
    pub fn finish(&mut self, mut element: Element, gate_half_length: f64) -> Option<Element> {
        self.preview_point = None;
        if !element.has_enough_points() {
            return None;
        }
        let (Some(first), Some(last)) = (element.points.first(), element.points.last()) else {
            return None;
        };
        if !element.kind.is_multi_point() && first.distance(*last) < self.min_point_distance {
            return None;
        }
        element.finalize(gate_half_length);
        Some(element)
    }

    pub fn cancel(&mut self) {
        self.preview_point = None;
    }
}

/// Constrain `point` so the box from `anchor` is square, keeping the drag
/// direction and the longer side.
pub fn constrain_square(anchor: Point, point: Point) -> Point {
    let dx = point.x - anchor.x;
    let dy = point.y - anchor.y;
    let side = dx.abs().max(dy.abs());
    Point::new(anchor.x + side.copysign(dx), anchor.y + side.copysign(dy))
}
