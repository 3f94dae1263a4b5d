//! Snapping hook consulted while dragging points.
//!
//! Smart guides live outside the engine; they plug in through
//! [`SnapProvider`]. A plain grid snapper is provided.

use crate::shapes::{Element, ElementId};
use kurbo::Point;

/// Default grid spacing in target pixels.
pub const GRID_SIZE: f64 = 20.0;

/// Result of a snap operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SnapResult {
    /// The snapped point.
    pub point: Point,
    pub snapped_x: bool,
    pub snapped_y: bool,
}

impl SnapResult {
    /// Create a result with no snapping.
    pub fn none(point: Point) -> Self {
        Self {
            point,
            snapped_x: false,
            snapped_y: false,
        }
    }

    pub fn is_snapped(&self) -> bool {
        self.snapped_x || self.snapped_y
    }
}

/// Adjusts a dragged position. Coordinates are in target space.
pub trait SnapProvider {
    /// `dragged` is the element being edited; `others` are the remaining
    /// visible elements.
    fn snap(&self, point: Point, dragged: ElementId, others: &[&Element]) -> SnapResult;
}

/// Snap to the nearest grid intersection within a threshold.
#[derive(Debug, Clone, Copy)]
pub struct GridSnap {
    pub size: f64,
    /// Maximum distance per axis for a snap to apply.
    pub threshold: f64,
}

impl Default for GridSnap {
    fn default() -> Self {
        Self {
            size: GRID_SIZE,
            threshold: GRID_SIZE / 2.0,
        }
    }
}

impl SnapProvider for GridSnap {
    fn snap(&self, point: Point, _dragged: ElementId, _others: &[&Element]) -> SnapResult {
        let snapped = snap_to_grid(point, self.size);
        let snapped_x = (snapped.x - point.x).abs() <= self.threshold;
        let snapped_y = (snapped.y - point.y).abs() <= self.threshold;
        SnapResult {
            point: Point::new(
                if snapped_x { snapped.x } else { point.x },
                if snapped_y { snapped.y } else { point.y },
            ),
            snapped_x,
            snapped_y,
        }
    }
}

/// Snap a point to the nearest grid intersection.
pub fn snap_to_grid(point: Point, grid_size: f64) -> Point {
    if grid_size <= 0.0 {
        return point;
    }
    Point::new(
        (point.x / grid_size).round() * grid_size,
        (point.y / grid_size).round() * grid_size,
    )
}
