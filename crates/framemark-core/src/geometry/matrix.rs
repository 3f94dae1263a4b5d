//! Rasterization of completed elements into an integer detection matrix.
//!
//! The matrix is the machine-readable output of a drawing: one cell per
//! target-space pixel, holding the [`ElementKind::code`] of the last element
//! covering it (0 = empty).

use super::{CURVE_SEGMENT_STEPS, sample_catmull_rom};
use crate::shapes::{Element, ElementKind};
use kurbo::{Point, Rect, Size, Vec2};
use serde::{Deserialize, Serialize};

/// Rasterized drawing at target resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionMatrix {
    pub width: usize,
    pub height: usize,
    /// Row-major cells, indexed `matrix[y][x]`.
    pub matrix: Vec<Vec<u8>>,
    /// The elements that were rasterized, in paint order.
    pub elements: Vec<Element>,
}

impl DetectionMatrix {
    /// Create an empty matrix.
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            matrix: vec![vec![0; width]; height],
            elements: Vec::new(),
        }
    }

    /// Cell value at `(x, y)`, or `None` outside the grid.
    pub fn get(&self, x: usize, y: usize) -> Option<u8> {
        self.matrix.get(y).and_then(|row| row.get(x)).copied()
    }

    /// Number of non-empty cells.
    pub fn filled_cells(&self) -> usize {
        self.matrix.iter().flatten().filter(|&&c| c != 0).count()
    }

    fn set(&mut self, x: i64, y: i64, code: u8) {
        if x < 0 || y < 0 {
            return;
        }
        let (x, y) = (x as usize, y as usize);
        if x < self.width && y < self.height {
            self.matrix[y][x] = code;
        }
    }

    /// Grid rectangle in cell-center coordinates: cell `i` covers `[i - 0.5, i + 0.5)`.
    fn bounds(&self) -> Option<Rect> {
        if self.width == 0 || self.height == 0 {
            return None;
        }
        Some(Rect::new(-0.5, -0.5, self.width as f64 - 0.5, self.height as f64 - 0.5))
    }

    /// Cell of an in-grid point, clamped against rounding at the edges.
    fn clamped_cell(&self, p: Point) -> (i64, i64) {
        let (x, y) = cell(p);
        (x.clamp(0, self.width as i64 - 1), y.clamp(0, self.height as i64 - 1))
    }

    /// Bresenham line between two cells, endpoints included.
    ///
    /// The segment is clipped to the grid first, so the walk never leaves it.
    pub fn rasterize_line(&mut self, from: Point, to: Point, code: u8) {
        let Some((from, to)) = self.bounds().and_then(|b| clip_segment(from, to, b)) else {
            return;
        };
        let (mut x0, mut y0) = self.clamped_cell(from);
        let (x1, y1) = self.clamped_cell(to);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.set(x0, y0, code);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x0 += sx;
            }
            if e2 <= dx {
                err += dx;
                y0 += sy;
            }
        }
    }

    /// Rasterize a connected polyline.
    pub fn rasterize_polyline(&mut self, points: &[Point], code: u8) {
        match points {
            [] => {}
            [only] => {
                let (x, y) = cell(*only);
                self.set(x, y, code);
            }
            _ => {
                for w in points.windows(2) {
                    self.rasterize_line(w[0], w[1], code);
                }
            }
        }
    }

    /// Scanline fill of a closed polygon, outline included.
    pub fn fill_polygon(&mut self, polygon: &[Point], code: u8) {
        if polygon.len() < 3 {
            self.rasterize_polyline(polygon, code);
            return;
        }
        let min_y = polygon.iter().map(|p| p.y).fold(f64::INFINITY, f64::min).floor() as i64;
        let max_y = polygon.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max).ceil() as i64;
        let min_y = min_y.max(0);
        let max_y = max_y.min(self.height as i64 - 1);

        let mut crossings: Vec<f64> = Vec::new();
        for y in min_y..=max_y {
            let fy = y as f64;
            crossings.clear();
            let mut j = polygon.len() - 1;
            for i in 0..polygon.len() {
                let (a, b) = (polygon[j], polygon[i]);
                if (a.y <= fy && fy < b.y) || (b.y <= fy && fy < a.y) {
                    crossings.push(a.x + (fy - a.y) * (b.x - a.x) / (b.y - a.y));
                }
                j = i;
            }
            crossings.sort_by(f64::total_cmp);
            for pair in crossings.chunks_exact(2) {
                let Some((start, end)) = cell_span(pair[0].ceil(), pair[1].floor(), self.width) else {
                    continue;
                };
                for x in start..=end {
                    self.matrix[y as usize][x] = code;
                }
            }
        }

        let mut outline = polygon.to_vec();
        outline.push(polygon[0]);
        self.rasterize_polyline(&outline, code);
    }

    /// Fill every cell whose center lies within `radius` of `center`.
    pub fn fill_circle(&mut self, center: Point, radius: f64, code: u8) {
        let (cx, cy) = (center.x.round(), center.y.round());
        let r = radius.round().max(0.0);
        let (Some((x0, x1)), Some((y0, y1))) = (
            cell_span(cx - r, cx + r, self.width),
            cell_span(cy - r, cy + r, self.height),
        ) else {
            return;
        };
        let r_sq = r * r;
        for y in y0..=y1 {
            let dy = y as f64 - cy;
            for x in x0..=x1 {
                let dx = x as f64 - cx;
                if dx * dx + dy * dy <= r_sq {
                    self.matrix[y][x] = code;
                }
            }
        }
    }

    /// Fill the axis-aligned rectangle spanned by two corners.
    pub fn fill_rect(&mut self, a: Point, b: Point, code: u8) {
        let (Some((x0, x1)), Some((y0, y1))) = (
            cell_span(a.x.min(b.x).round(), a.x.max(b.x).round(), self.width),
            cell_span(a.y.min(b.y).round(), a.y.max(b.y).round(), self.height),
        ) else {
            return;
        };
        for row in &mut self.matrix[y0..=y1] {
            row[x0..=x1].fill(code);
        }
    }

    /// Rasterize one element according to its kind.
    pub fn draw_element(&mut self, element: &Element) {
        let code = element.kind.code();
        let points = &element.points;
        match element.kind {
            ElementKind::Line => self.rasterize_polyline(points, code),
            ElementKind::Curve => {
                let samples = sample_catmull_rom(points, CURVE_SEGMENT_STEPS);
                self.rasterize_polyline(&samples, code);
            }
            ElementKind::Area => self.fill_polygon(points, code),
            ElementKind::Rectangle => {
                if let [a, b, ..] = points.as_slice() {
                    self.fill_rect(*a, *b, code);
                }
            }
            ElementKind::Circle => {
                if let [center, rim, ..] = points.as_slice() {
                    self.fill_circle(*center, center.distance(*rim), code);
                }
            }
        }
    }
}

fn cell(p: Point) -> (i64, i64) {
    (p.x.round() as i64, p.y.round() as i64)
}

/// Inclusive cell range `[lo, hi]` clamped to `0..len`, or `None` when it
/// misses the grid.
fn cell_span(lo: f64, hi: f64, len: usize) -> Option<(usize, usize)> {
    if len == 0 || lo.is_nan() || hi.is_nan() {
        return None;
    }
    let lo = lo.max(0.0);
    let hi = hi.min(len as f64 - 1.0);
    if lo > hi {
        return None;
    }
    Some((lo as usize, hi as usize))
}

const LEFT: u8 = 1;
const RIGHT: u8 = 2;
const BELOW: u8 = 4;
const ABOVE: u8 = 8;

fn outcode(p: Point, bounds: Rect) -> u8 {
    let mut code = 0;
    if p.x < bounds.x0 {
        code |= LEFT;
    } else if p.x > bounds.x1 {
        code |= RIGHT;
    }
    if p.y < bounds.y0 {
        code |= BELOW;
    } else if p.y > bounds.y1 {
        code |= ABOVE;
    }
    code
}

/// Cohen-Sutherland clipping of the segment `a..b` against `bounds`.
///
/// Clipped endpoints land exactly on the boundary. Directions are taken at
/// half length so segments spanning the whole `f64` range do not overflow.
fn clip_segment(mut a: Point, mut b: Point, bounds: Rect) -> Option<(Point, Point)> {
    if !(a.x.is_finite() && a.y.is_finite() && b.x.is_finite() && b.y.is_finite()) {
        return None;
    }
    // Each pass moves one endpoint onto an edge; two per endpoint suffice.
    for _ in 0..=4 {
        let (code_a, code_b) = (outcode(a, bounds), outcode(b, bounds));
        if code_a | code_b == 0 {
            return Some((a, b));
        }
        if code_a & code_b != 0 {
            return None;
        }
        let outside = if code_a != 0 { code_a } else { code_b };
        let half = Vec2::new(b.x * 0.5 - a.x * 0.5, b.y * 0.5 - a.y * 0.5);
        let clipped = if outside & (BELOW | ABOVE) != 0 {
            let y = if outside & BELOW != 0 { bounds.y0 } else { bounds.y1 };
            Point::new(a.x + half.x * ((y - a.y) / half.y), y)
        } else {
            let x = if outside & LEFT != 0 { bounds.x0 } else { bounds.x1 };
            Point::new(x, a.y + half.y * ((x - a.x) / half.x))
        };
        if !(clipped.x.is_finite() && clipped.y.is_finite()) {
            return None;
        }
        if code_a != 0 {
            a = clipped;
        } else {
            b = clipped;
        }
    }
    None
}

/// Rasterize every completed, non-deleted element at the given target size.
pub fn generate_matrix(elements: &[Element], target: Size) -> DetectionMatrix {
    let width = target.width.max(0.0).round() as usize;
    let height = target.height.max(0.0).round() as usize;
    let mut matrix = DetectionMatrix::new(width, height);
    for element in elements.iter().filter(|e| e.is_exportable()) {
        matrix.draw_element(element);
        matrix.elements.push(element.clone());
    }
    log::debug!(
        "Generated {}x{} detection matrix from {} elements",
        width,
        height,
        matrix.elements.len()
    );
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shapes::SyncState;

    fn completed(kind: ElementKind, points: Vec<Point>) -> Element {
        let mut e = Element::new(kind, points);
        e.completed = true;
        e
    }

    #[test]
    fn test_line_encoding() {
        let line = completed(ElementKind::Line, vec![Point::new(0.0, 0.0), Point::new(2.0, 0.0)]);
        let m = generate_matrix(&[line], Size::new(5.0, 3.0));
        assert_eq!(m.width, 5);
        assert_eq!(m.height, 3);
        assert_eq!(m.get(0, 0), Some(1));
        assert_eq!(m.get(1, 0), Some(1));
        assert_eq!(m.get(2, 0), Some(1));
        assert_eq!(m.filled_cells(), 3);
        assert_eq!(m.elements.len(), 1);
    }

    #[test]
    fn test_diagonal_line_is_connected() {
        let mut m = DetectionMatrix::new(10, 10);
        m.rasterize_line(Point::new(0.0, 0.0), Point::new(9.0, 9.0), 1);
        for i in 0..10 {
            assert_eq!(m.get(i, i), Some(1));
        }
        assert_eq!(m.filled_cells(), 10);
    }

    #[test]
    fn test_rectangle_fill() {
        let rect = completed(ElementKind::Rectangle, vec![Point::new(3.0, 2.0), Point::new(1.0, 1.0)]);
        let m = generate_matrix(&[rect], Size::new(6.0, 6.0));
        assert_eq!(m.filled_cells(), 3 * 2);
        assert_eq!(m.get(1, 1), Some(4));
        assert_eq!(m.get(3, 2), Some(4));
        assert_eq!(m.get(4, 2), Some(0));
    }

    #[test]
    fn test_area_fill() {
        let area = completed(
            ElementKind::Area,
            vec![Point::new(1.0, 1.0), Point::new(5.0, 1.0), Point::new(5.0, 5.0), Point::new(1.0, 5.0)],
        );
        let m = generate_matrix(&[area], Size::new(8.0, 8.0));
        assert_eq!(m.get(3, 3), Some(2));
        assert_eq!(m.get(5, 5), Some(2));
        assert_eq!(m.get(0, 0), Some(0));
        assert_eq!(m.get(6, 3), Some(0));
        assert_eq!(m.filled_cells(), 25);
    }

    #[test]
    fn test_circle_fill() {
        let circle = completed(ElementKind::Circle, vec![Point::new(5.0, 5.0), Point::new(7.0, 5.0)]);
        let m = generate_matrix(&[circle], Size::new(11.0, 11.0));
        assert_eq!(m.get(5, 5), Some(5));
        assert_eq!(m.get(7, 5), Some(5));
        assert_eq!(m.get(7, 7), Some(0));
        // r = 2 covers 13 cells.
        assert_eq!(m.filled_cells(), 13);
    }

    #[test]
    fn test_curve_passes_through_points() {
        let curve = completed(
            ElementKind::Curve,
            vec![Point::new(1.0, 1.0), Point::new(10.0, 8.0), Point::new(18.0, 1.0)],
        );
        let m = generate_matrix(&[curve], Size::new(20.0, 12.0));
        assert_eq!(m.get(1, 1), Some(3));
        assert_eq!(m.get(10, 8), Some(3));
        assert_eq!(m.get(18, 1), Some(3));
    }

    #[test]
    fn test_skips_incomplete_and_deleted() {
        let drawing = Element::new(ElementKind::Line, vec![Point::new(0.0, 0.0), Point::new(3.0, 0.0)]);
        let mut deleted = completed(ElementKind::Line, vec![Point::new(0.0, 1.0), Point::new(3.0, 1.0)]);
        deleted.sync_state = SyncState::Deleted;
        let m = generate_matrix(&[drawing, deleted], Size::new(4.0, 4.0));
        assert_eq!(m.filled_cells(), 0);
        assert!(m.elements.is_empty());
    }

    #[test]
    fn test_far_off_grid_geometry_is_clipped() {
        let size = Size::new(4.0, 3.0);

        let line = completed(ElementKind::Line, vec![Point::new(-1e300, 0.0), Point::new(1e300, 0.0)]);
        let m = generate_matrix(&[line], size);
        assert_eq!(m.filled_cells(), 4);
        assert!((0..4).all(|x| m.get(x, 0) == Some(1)));

        let missed = completed(ElementKind::Line, vec![Point::new(-1e300, -50.0), Point::new(-10.0, -50.0)]);
        assert_eq!(generate_matrix(&[missed], size).filled_cells(), 0);

        let rect = completed(
            ElementKind::Rectangle,
            vec![Point::new(-30000.0, -30000.0), Point::new(30000.0, 30000.0)],
        );
        let m = generate_matrix(&[rect], size);
        assert_eq!(m.filled_cells(), 12);
        assert_eq!(m.get(3, 2), Some(4));

        let circle = completed(ElementKind::Circle, vec![Point::new(2.0, 1.0), Point::new(2.0, 1e9)]);
        assert_eq!(generate_matrix(&[circle], size).filled_cells(), 12);

        let area = completed(
            ElementKind::Area,
            vec![Point::new(-1e12, -1e12), Point::new(1e12, -1e12), Point::new(0.0, 1e12)],
        );
        assert_eq!(generate_matrix(&[area], size).filled_cells(), 12);
    }

    #[test]
    fn test_diagonal_line_clipped_on_both_sides() {
        let mut m = DetectionMatrix::new(5, 5);
        m.rasterize_line(Point::new(-10.0, -10.0), Point::new(20.0, 20.0), 1);
        for i in 0..5 {
            assert_eq!(m.get(i, i), Some(1));
        }
        assert_eq!(m.filled_cells(), 5);
    }

    #[test]
    fn test_clips_outside_grid() {
        let line = completed(ElementKind::Line, vec![Point::new(-5.0, 0.0), Point::new(10.0, 0.0)]);
        let m = generate_matrix(&[line], Size::new(3.0, 1.0));
        assert_eq!(m.filled_cells(), 3);
    }
}
