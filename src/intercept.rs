use nalgebra::{Point3, Unit, Vector3};

use crate::geom::{FaceId, Placement, Shape};
use crate::vertex::Mode;


/// An intercept of a trajectory with a solid, in the world frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intercept {
    pub face: FaceId,
    pub impact: Point3<f64>,
    /// Distance travelled along the trajectory from the search origin.
    pub distance: f64,
    /// Projection of that distance on the XY plane.
    pub distance_xy: f64,
    pub mode: Mode,
    /// Number of finder iterations spent.
    pub iterations: usize,
}

/// Intersects the ray `origin + t * direction` (world frame) with a placed
/// solid. The solid is queried in its own frame and the impact is mapped back.
pub fn find_line_intercept(
    origin: &Point3<f64>,
    direction: &Unit<Vector3<f64>>,
    shape: &Shape,
    placement: &Placement,
    tolerance: f64,
) -> Option<Intercept> {
    let local_origin = placement.mother_to_child(origin);
    let local_direction = placement.mother_to_child_direction(direction);
    let hit = shape.find_intercept(&local_origin, &local_direction, tolerance)?;
    let impact = placement.child_to_mother(&hit.impact);
    let travel = impact - origin;
    tracing::trace!("line intercept on {:?} face at {:?}", hit.face, impact);
    Some(Intercept {
        face: hit.face,
        impact,
        distance: travel.norm(),
        distance_xy: travel.x.hypot(travel.y),
        mode: Mode::Line,
        iterations: 1,
    })
}
