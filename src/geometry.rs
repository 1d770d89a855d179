//! Planar geometry helpers over landmark coordinates

use crate::types::LandmarkPoint;

/// Euclidean distance between two landmarks (x/y only)
pub fn distance(p1: &LandmarkPoint, p2: &LandmarkPoint) -> f64 {
    (p2.x - p1.x).hypot(p2.y - p1.y)
}

/// Angle at `vertex` from the ray towards `p1` to the ray towards `p3`, in
/// degrees within [0, 360).
pub fn angle_degrees(p1: &LandmarkPoint, vertex: &LandmarkPoint, p3: &LandmarkPoint) -> f64 {
    let bearing1 = (p1.y - vertex.y).atan2(p1.x - vertex.x);
    let bearing3 = (p3.y - vertex.y).atan2(p3.x - vertex.x);
    let mut angle = (bearing3 - bearing1).to_degrees();
    if angle < 0.0 {
        angle += 360.0;
    }
    angle
}
