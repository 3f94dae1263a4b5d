//! Element definitions for the annotation layer.

mod detection;

pub use detection::{DetectionGates, Direction, GateEnd, compute_direction, compute_gates, end_tangent};

use crate::geometry::{
    CURVE_SEGMENT_STEPS, bounds_of_points, distance_point_to_segment, point_in_polygon,
    point_to_polyline_dist, sample_catmull_rom,
};
use crate::layers::LayerId;
use kurbo::{Point, Rect, Vec2};
use peniko::Color;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for elements.
pub type ElementId = Uuid;

/// Unique identifier for element groups.
pub type GroupId = Uuid;

/// Serializable color representation (RGBA8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializableColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl SerializableColor {
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub fn black() -> Self {
        Self::new(0, 0, 0, 255)
    }

    pub fn white() -> Self {
        Self::new(255, 255, 255, 255)
    }

    pub fn transparent() -> Self {
        Self::new(0, 0, 0, 0)
    }

    /// Default annotation stroke color.
    pub fn annotation() -> Self {
        Self::new(0, 200, 83, 255)
    }

    /// Parse `#rgb`, `#rrggbb` or `#rrggbbaa`.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let hex = hex.trim().strip_prefix('#')?;
        let byte = |s: &str| u8::from_str_radix(s, 16).ok();
        match hex.len() {
            3 => {
                let r = byte(&hex[0..1])? * 17;
                let g = byte(&hex[1..2])? * 17;
                let b = byte(&hex[2..3])? * 17;
                Some(Self::new(r, g, b, 255))
            }
            6 => Some(Self::new(byte(&hex[0..2])?, byte(&hex[2..4])?, byte(&hex[4..6])?, 255)),
            8 => Some(Self::new(
                byte(&hex[0..2])?,
                byte(&hex[2..4])?,
                byte(&hex[4..6])?,
                byte(&hex[6..8])?,
            )),
            _ => None,
        }
    }
}

impl Default for SerializableColor {
    fn default() -> Self {
        Self::annotation()
    }
}

impl From<Color> for SerializableColor {
    fn from(color: Color) -> Self {
        let rgba = color.to_rgba8();
        Self {
            r: rgba.r,
            g: rgba.g,
            b: rgba.b,
            a: rgba.a,
        }
    }
}

impl From<SerializableColor> for Color {
    fn from(color: SerializableColor) -> Self {
        Color::from_rgba8(color.r, color.g, color.b, color.a)
    }
}

/// Geometric kind of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Line,
    Curve,
    Area,
    Rectangle,
    Circle,
}

impl ElementKind {
    /// Integer code used in the detection matrix.
    pub fn code(self) -> u8 {
        match self {
            ElementKind::Line => 1,
            ElementKind::Area => 2,
            ElementKind::Curve => 3,
            ElementKind::Rectangle => 4,
            ElementKind::Circle => 5,
        }
    }

    /// Minimum number of points for a completed element.
    pub fn min_points(self) -> usize {
        match self {
            ElementKind::Line | ElementKind::Rectangle | ElementKind::Circle => 2,
            ElementKind::Area | ElementKind::Curve => 3,
        }
    }

    /// Whether the element is drawn click-by-click and completed explicitly.
    pub fn is_multi_point(self) -> bool {
        matches!(self, ElementKind::Area | ElementKind::Curve)
    }

    /// Whether the element carries a direction and may carry detection gates.
    pub fn is_directional(self) -> bool {
        matches!(self, ElementKind::Line | ElementKind::Curve)
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementKind::Line => "line",
            ElementKind::Curve => "curve",
            ElementKind::Area => "area",
            ElementKind::Rectangle => "rectangle",
            ElementKind::Circle => "circle",
        }
    }
}

/// Reconciliation state with the host's persistence boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Created locally, never persisted.
    #[default]
    New,
    /// Persisted, then changed locally.
    Edited,
    /// In sync with the backend.
    Saved,
    /// Persisted, then deleted locally; kept until the host acknowledges.
    Deleted,
}

impl SyncState {
    /// State after a local mutation.
    pub fn after_edit(self) -> Self {
        match self {
            SyncState::Saved => SyncState::Edited,
            other => other,
        }
    }
}

/// Semantic role of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SemanticType {
    /// Plain annotation.
    #[default]
    Annotation,
    /// Crossing line with entry/exit gates.
    Detection,
}

/// Label font settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontInfo {
    pub family: String,
    pub size: f64,
    pub color: SerializableColor,
}

impl Default for FontInfo {
    fn default() -> Self {
        Self {
            family: "sans-serif".to_string(),
            size: 14.0,
            color: SerializableColor::white(),
        }
    }
}

/// Label information attached to an element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub font: FontInfo,
    /// Label background (None = no background box).
    #[serde(default)]
    pub background: Option<SerializableColor>,
}

/// A drawn annotation element. All geometry is in target space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    pub kind: ElementKind,
    /// Line/rectangle: two points. Circle: center, then a point on the rim.
    /// Area/curve: three or more points.
    pub points: Vec<Point>,
    pub color: SerializableColor,
    /// False while the element is still being drawn.
    #[serde(default)]
    pub completed: bool,
    /// Owning layer (None = ungrouped legacy element, always visible).
    #[serde(default)]
    pub layer_id: Option<LayerId>,
    #[serde(default)]
    pub group_id: Option<GroupId>,
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub detection: Option<DetectionGates>,
    #[serde(default)]
    pub info: ElementInfo,
    #[serde(default)]
    pub sync_state: SyncState,
}

impl Element {
    /// Create a new, incomplete element.
    pub fn new(kind: ElementKind, points: Vec<Point>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            points,
            color: SerializableColor::default(),
            completed: false,
            layer_id: None,
            group_id: None,
            direction: None,
            detection: None,
            info: ElementInfo::default(),
            sync_state: SyncState::New,
        }
    }

    pub fn with_color(mut self, color: SerializableColor) -> Self {
        self.color = color;
        self
    }

    pub fn with_semantic_type(mut self, semantic_type: SemanticType) -> Self {
        self.info.semantic_type = semantic_type;
        self
    }

    /// Whether the element has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.sync_state == SyncState::Deleted
    }

    /// Whether the element takes part in rendering, hit-testing and export.
    pub fn is_exportable(&self) -> bool {
        self.completed && !self.is_deleted()
    }

    /// Whether the element has enough points to be completed.
    pub fn has_enough_points(&self) -> bool {
        self.points.len() >= self.kind.min_points()
    }

    /// Whether this element needs entry/exit gates.
    pub fn wants_detection(&self) -> bool {
        self.kind.is_directional() && self.info.semantic_type == SemanticType::Detection
    }

    /// Record a local mutation for sync purposes.
    pub fn mark_edited(&mut self) {
        self.sync_state = self.sync_state.after_edit();
    }

    /// Give the element a fresh id, returning the new one.
    pub fn regenerate_id(&mut self) -> ElementId {
        self.id = Uuid::new_v4();
        self.id
    }

    /// Circle radius (distance from center to rim point).
    pub fn radius(&self) -> Option<f64> {
        match (self.kind, self.points.as_slice()) {
            (ElementKind::Circle, [center, rim, ..]) => Some(center.distance(*rim)),
            _ => None,
        }
    }

    /// Polyline used for display and hit-testing (curves are sampled).
    pub fn display_points(&self) -> Vec<Point> {
        match self.kind {
            ElementKind::Curve => sample_catmull_rom(&self.points, CURVE_SEGMENT_STEPS),
            _ => self.points.clone(),
        }
    }

    /// The four corners of a rectangle, clockwise from the first stored point:
    /// `p0`, `(p1.x, p0.y)`, `p1`, `(p0.x, p1.y)`.
    pub fn rectangle_corners(&self) -> Option<[Point; 4]> {
        match (self.kind, self.points.as_slice()) {
            (ElementKind::Rectangle, [a, b, ..]) => Some([
                *a,
                Point::new(b.x, a.y),
                *b,
                Point::new(a.x, b.y),
            ]),
            _ => None,
        }
    }

    /// Axis-aligned bounds of the element's geometry.
    pub fn bounds(&self) -> Option<Rect> {
        match self.kind {
            ElementKind::Circle => {
                let center = *self.points.first()?;
                let r = self.radius().unwrap_or(0.0);
                Some(Rect::new(center.x - r, center.y - r, center.x + r, center.y + r))
            }
            ElementKind::Curve => bounds_of_points(&self.display_points()),
            _ => bounds_of_points(&self.points),
        }
    }

    /// Center of the bounds.
    pub fn center(&self) -> Option<Point> {
        self.bounds().map(|b| b.center())
    }

    /// Check if a point (in target space) hits this element.
    pub fn hit_test(&self, point: Point, tolerance: f64) -> bool {
        match self.kind {
            ElementKind::Line => match self.points.as_slice() {
                [a, b, ..] => distance_point_to_segment(point, *a, *b) <= tolerance,
                _ => false,
            },
            ElementKind::Curve => point_to_polyline_dist(point, &self.display_points()) <= tolerance,
            ElementKind::Area => {
                if point_in_polygon(point, &self.points) {
                    return true;
                }
                let mut outline = self.points.clone();
                if let Some(first) = self.points.first() {
                    outline.push(*first);
                }
                point_to_polyline_dist(point, &outline) <= tolerance
            }
            ElementKind::Rectangle => self
                .bounds()
                .is_some_and(|b| b.inflate(tolerance, tolerance).contains(point)),
            ElementKind::Circle => match (self.points.first(), self.radius()) {
                (Some(center), Some(r)) => center.distance(point) <= r + tolerance,
                _ => false,
            },
        }
    }

    /// Apply a point mapping to the geometry, gates and direction.
    pub fn map_points(&mut self, f: impl Fn(Point) -> Point) {
        for p in &mut self.points {
            *p = f(*p);
        }
        if let Some(gates) = &mut self.detection {
            gates.map_points(&f);
        }
        if let Some(direction) = &mut self.direction {
            direction.start = f(direction.start);
            direction.end = f(direction.end);
        }
    }

    /// Translate the whole element.
    pub fn translate(&mut self, delta: Vec2) {
        if delta == Vec2::ZERO {
            return;
        }
        self.map_points(|p| p + delta);
    }

    /// Recompute the derived direction (line/curve only).
    pub fn refresh_direction(&mut self) {
        self.direction = compute_direction(self.kind, &self.points);
    }

    /// Mark the element completed and derive its direction and gates.
    pub fn finalize(&mut self, gate_half_length: f64) {
        self.completed = true;
        self.refresh_direction();
        self.detection = if self.wants_detection() {
            compute_gates(self.kind, &self.points, gate_half_length)
        } else {
            None
        };
    }
}
