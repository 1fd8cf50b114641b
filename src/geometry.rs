use nalgebra::{Isometry2, Point2, Vector2};
use parry2d_f64::query;
use parry2d_f64::shape::ConvexPolygon;

use crate::pose::Pose;

/// Four corners of the oriented rectangle centered at `pose` with axes along
/// its heading, in a consistent (counter-clockwise) winding order.
pub fn rectangle(pose: &Pose, length: f64, width: f64) -> [Point2<f64>; 4] {
    let heading = pose.heading();
    let normal = Vector2::new(-heading.y, heading.x);
    let half_l = length / 2.0;
    let half_w = width / 2.0;
    let center = pose.point();

    [
        center + heading * half_l + normal * half_w,
        center - heading * half_l + normal * half_w,
        center - heading * half_l - normal * half_w,
        center + heading * half_l - normal * half_w,
    ]
}

/// The ego rectangle translated forward by `heading * d_brake_min`, used as
/// the inflated polygon tested against static obstacles.
pub fn inflate_forward(poly: &[Point2<f64>; 4], heading: Vector2<f64>, d_brake_min: f64) -> [Point2<f64>; 4] {
    let offset = heading * d_brake_min;
    [poly[0] + offset, poly[1] + offset, poly[2] + offset, poly[3] + offset]
}

fn convex_polygon(points: &[Point2<f64>]) -> ConvexPolygon {
    ConvexPolygon::from_convex_hull(points).expect("degenerate polygon passed to polygon_intersects")
}

/// Separating-axis intersection test between two oriented convex polygons
/// (rectangles for agents, arbitrary convex hulls for static objects). Both
/// point sets are already in world coordinates, so the query runs with
/// identity isometries.
pub fn polygon_intersects(a: &[Point2<f64>], b: &[Point2<f64>]) -> bool {
    let poly_a = convex_polygon(a);
    let poly_b = convex_polygon(b);
    let identity = Isometry2::identity();
    query::intersection_test(&identity, &poly_a, &identity, &poly_b)
        .expect("intersection_test should support two convex polygons")
}

/// Minimum Euclidean distance between the two polygons; `0.0` when they
/// intersect.
pub fn polygon_distance(a: &[Point2<f64>], b: &[Point2<f64>]) -> f64 {
    let poly_a = convex_polygon(a);
    let poly_b = convex_polygon(b);
    let identity = Isometry2::identity();
    query::distance(&identity, &poly_a, &identity, &poly_b)
        .expect("distance should support two convex polygons")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::VehicleDynamic;
    use approx::assert_relative_eq;

    fn pose_at(x: f64, y: f64, yaw: f64) -> Pose {
        Pose::new(x, y, yaw, 0.1, 0.1, VehicleDynamic::new(0.0, 0.0), 0.0)
    }

    #[test]
    fn rectangle_has_correct_extents_when_axis_aligned() {
        let pose = pose_at(0.0, 0.0, 0.0);
        let rect = rectangle(&pose, 4.0, 2.0);
        let max_x = rect.iter().map(|p| p.x).fold(f64::MIN, f64::max);
        let min_x = rect.iter().map(|p| p.x).fold(f64::MAX, f64::min);
        let max_y = rect.iter().map(|p| p.y).fold(f64::MIN, f64::max);
        assert_relative_eq!(max_x, 2.0, epsilon = 1e-9);
        assert_relative_eq!(min_x, -2.0, epsilon = 1e-9);
        assert_relative_eq!(max_y, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn overlapping_rectangles_intersect() {
        let a = rectangle(&pose_at(0.0, 0.0, 0.0), 4.0, 2.0);
        let b = rectangle(&pose_at(1.0, 0.0, 0.0), 4.0, 2.0);
        assert!(polygon_intersects(&a, &b));
    }

    #[test]
    fn far_apart_rectangles_do_not_intersect() {
        let a = rectangle(&pose_at(0.0, 0.0, 0.0), 4.0, 2.0);
        let b = rectangle(&pose_at(100.0, 0.0, 0.0), 4.0, 2.0);
        assert!(!polygon_intersects(&a, &b));
        assert!(polygon_distance(&a, &b) > 90.0);
    }
}
