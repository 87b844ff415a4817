// src/geometry.rs
//
// Pure geometric predicates shared by every rule. No state.
//
// Malformed input never panics: degenerate boxes give zero IoU, missing
// history or degenerate lines give "no crossing", polygons with fewer than
// three vertices contain nothing.

use crate::types::{BBox, Point};

/// Midpoint of a bounding box.
#[inline]
pub fn center_of(bbox: &BBox) -> Point {
    ((bbox[0] + bbox[2]) * 0.5, (bbox[1] + bbox[3]) * 0.5)
}

#[inline]
pub fn area(bbox: &BBox) -> f32 {
    (bbox[2] - bbox[0]).max(0.0) * (bbox[3] - bbox[1]).max(0.0)
}

/// Intersection over union in `[0, 1]`. Zero for disjoint or degenerate boxes.
pub fn iou(a: &BBox, b: &BBox) -> f32 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter <= 0.0 {
        return 0.0;
    }

    let union = area(a) + area(b) - inter;
    if union > 0.0 {
        (inter / union).min(1.0)
    } else {
        0.0
    }
}

/// Signed area of `(p2 - p1) × (point - p1)`. Sign tells the side of the line.
#[inline]
fn side_of(point: Point, p1: Point, p2: Point) -> f64 {
    let (dx, dy) = ((p2.0 - p1.0) as f64, (p2.1 - p1.1) as f64);
    let (px, py) = ((point.0 - p1.0) as f64, (point.1 - p1.1) as f64);
    dx * py - dy * px
}

/// True iff `previous` and `current` lie strictly on opposite sides of the
/// infinite line through `p1`, `p2`.
///
/// Without a previous sample no crossing can be asserted, so an object can
/// never cross on the frame it first appears.
pub fn crossed_line(previous: Option<Point>, current: Point, p1: Point, p2: Point) -> bool {
    let Some(previous) = previous else {
        return false;
    };
    side_of(previous, p1, p2) * side_of(current, p1, p2) < 0.0
}

/// Even-odd ray casting. Vertex order and orientation are arbitrary,
/// self-intersecting polygons are not supported.
///
/// Boundary convention: the test is half-open, so for an axis-aligned
/// rectangle points on the min-x / min-y edges are inside and points on the
/// max-x / max-y edges are outside.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }

    let (x, y) = point;
    let mut inside = false;
    let n = polygon.len();

    for i in 0..n {
        let (x1, y1) = polygon[i];
        let (x2, y2) = polygon[(i + 1) % n];

        // (y1 > y) != (y2 > y) guarantees y1 != y2
        if (y1 > y) != (y2 > y) && x < (x2 - x1) * (y - y1) / (y2 - y1) + x1 {
            inside = !inside;
        }
    }

    inside
}

/// Integer rectangle `(x, y, width, height)` covering `bbox` grown by `pad`
/// pixels on every side, clamped to a `frame_w` × `frame_h` frame.
/// `None` when nothing is left after clamping.
pub fn padded_crop_region(
    bbox: &BBox,
    pad: u32,
    frame_w: u32,
    frame_h: u32,
) -> Option<(u32, u32, u32, u32)> {
    if frame_w == 0 || frame_h == 0 {
        return None;
    }

    let pad = pad as i64;
    let (x1, y1, x2, y2) = (
        bbox[0] as i64,
        bbox[1] as i64,
        bbox[2] as i64,
        bbox[3] as i64,
    );

    let x1p = (x1 - pad).max(0);
    let y1p = (y1 - pad).max(0);
    let x2p = (x2 + pad).min(frame_w as i64 - 1);
    let y2p = (y2 + pad).min(frame_h as i64 - 1);

    if x2p <= x1p || y2p <= y1p {
        return None;
    }

    Some((
        x1p as u32,
        y1p as u32,
        (x2p - x1p) as u32,
        (y2p - y1p) as u32,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: [Point; 4] = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)];

    #[test]
    fn test_center_of() {
        assert_eq!(center_of(&[0.0, 0.0, 10.0, 20.0]), (5.0, 10.0));
        assert_eq!(center_of(&[-4.0, 2.0, 4.0, 2.0]), (0.0, 2.0));
    }

    #[test]
    fn test_iou_overlap() {
        let a = [0.0, 0.0, 100.0, 100.0];
        let b = [50.0, 50.0, 150.0, 150.0];
        let score = iou(&a, &b);
        assert!((score - 2500.0 / 17500.0).abs() < 1e-4);
    }

    #[test]
    fn test_iou_symmetric() {
        let pairs = [
            ([0.0, 0.0, 100.0, 100.0], [50.0, 50.0, 150.0, 150.0]),
            ([10.0, 10.0, 20.0, 40.0], [0.0, 15.0, 30.0, 25.0]),
            ([0.0, 0.0, 5.0, 5.0], [5.0, 5.0, 10.0, 10.0]),
        ];
        for (a, b) in pairs {
            assert_eq!(iou(&a, &b), iou(&b, &a));
        }
    }

    #[test]
    fn test_iou_self_is_one() {
        let a = [12.0, 30.0, 48.5, 99.0];
        assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = [0.0, 0.0, 50.0, 50.0];
        let b = [100.0, 100.0, 200.0, 200.0];
        assert_eq!(iou(&a, &b), 0.0);
    }

    #[test]
    fn test_iou_degenerate_is_zero() {
        let flat = [0.0, 10.0, 50.0, 10.0];
        let inverted = [50.0, 50.0, 0.0, 0.0];
        let b = [0.0, 0.0, 50.0, 50.0];
        assert_eq!(iou(&flat, &b), 0.0);
        assert_eq!(iou(&inverted, &b), 0.0);
        assert_eq!(iou(&flat, &flat), 0.0);
    }

    #[test]
    fn test_crossed_line_false_without_previous() {
        for current in [(0.0, 0.0), (10.0, 0.0), (5.0, 0.0), (-100.0, 40.0)] {
            assert!(!crossed_line(None, current, (5.0, -5.0), (5.0, 5.0)));
        }
    }

    #[test]
    fn test_crossed_line_opposite_sides() {
        let p1 = (5.0, -5.0);
        let p2 = (5.0, 5.0);
        assert!(crossed_line(Some((0.0, 0.0)), (10.0, 0.0), p1, p2));
        assert!(crossed_line(Some((10.0, 0.0)), (0.0, 0.0), p1, p2));
        assert!(!crossed_line(Some((0.0, 0.0)), (3.0, 0.0), p1, p2));
    }

    #[test]
    fn test_crossed_line_touching_is_not_crossing() {
        let p1 = (5.0, -5.0);
        let p2 = (5.0, 5.0);
        assert!(!crossed_line(Some((0.0, 0.0)), (5.0, 0.0), p1, p2));
        assert!(!crossed_line(Some((5.0, 0.0)), (10.0, 0.0), p1, p2));
    }

    #[test]
    fn test_crossed_line_degenerate_line() {
        assert!(!crossed_line(Some((0.0, 0.0)), (10.0, 0.0), (5.0, 5.0), (5.0, 5.0)));
    }

    #[test]
    fn test_point_in_polygon_square() {
        assert!(point_in_polygon((5.0, 5.0), &SQUARE));
        assert!(!point_in_polygon((15.0, 5.0), &SQUARE));
        assert!(!point_in_polygon((5.0, -1.0), &SQUARE));
    }

    #[test]
    fn test_point_in_polygon_boundary_convention() {
        // min edges inside
        assert!(point_in_polygon((0.0, 5.0), &SQUARE));
        assert!(point_in_polygon((5.0, 0.0), &SQUARE));
        // max edges outside
        assert!(!point_in_polygon((10.0, 5.0), &SQUARE));
        assert!(!point_in_polygon((5.0, 10.0), &SQUARE));
    }

    #[test]
    fn test_point_in_polygon_orientation_independent() {
        let mut reversed = SQUARE;
        reversed.reverse();
        for p in [(5.0, 5.0), (15.0, 5.0), (0.0, 5.0), (10.0, 5.0)] {
            assert_eq!(point_in_polygon(p, &SQUARE), point_in_polygon(p, &reversed));
        }
    }

    #[test]
    fn test_point_in_polygon_non_convex() {
        // U shape: notch between x=4..6 from y=4 upward
        let u = [
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 10.0),
            (6.0, 10.0),
            (6.0, 4.0),
            (4.0, 4.0),
            (4.0, 10.0),
            (0.0, 10.0),
        ];
        assert!(point_in_polygon((2.0, 8.0), &u));
        assert!(point_in_polygon((8.0, 8.0), &u));
        assert!(!point_in_polygon((5.0, 8.0), &u));
        assert!(point_in_polygon((5.0, 2.0), &u));
    }

    #[test]
    fn test_point_in_polygon_too_few_vertices() {
        assert!(!point_in_polygon((0.0, 0.0), &[]));
        assert!(!point_in_polygon((1.0, 1.0), &[(0.0, 0.0), (2.0, 2.0)]));
    }

    #[test]
    fn test_padded_crop_region_clamps() {
        let region = padded_crop_region(&[5.0, 5.0, 50.0, 40.0], 12, 100, 100);
        assert_eq!(region, Some((0, 0, 62, 52)));

        let edge = padded_crop_region(&[80.0, 80.0, 120.0, 120.0], 12, 100, 100);
        assert_eq!(edge, Some((68, 68, 31, 31)));
    }

    #[test]
    fn test_padded_crop_region_outside_frame() {
        assert_eq!(padded_crop_region(&[200.0, 200.0, 300.0, 300.0], 12, 100, 100), None);
        assert_eq!(padded_crop_region(&[0.0, 0.0, 10.0, 10.0], 12, 0, 0), None);
    }
}
