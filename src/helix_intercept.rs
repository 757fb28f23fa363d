//! Helix-to-solid intercept search.
//!
//! **Context**: A helix has no closed-form intersection with a placed box or
//! cylinder. The search therefore walks the helix outward from one of its
//! ends and lets the line finder do the geometry on short chords.
//!
//! **How it Works**: The arclength window is `[0, s_max]` where `s_max` is
//! the transverse limit of the category converted into arclength. The window
//! is cut into chords of length `step`. The first chord crossed by the solid
//! brackets the intercept. The bracket is then halved, keeping the half whose
//! chord still crosses the solid, until two consecutive impact estimates are
//! closer than the tolerance or [`HELIX_MAX_REFINEMENTS`] halvings have been
//! made. A search therefore never exceeds
//! `ceil(s_max / step) + HELIX_MAX_REFINEMENTS` iterations.

use nalgebra::{Point3, Unit};

use crate::curve::Helix3;
use crate::geom::{FaceIntercept, Placement, Shape};
use crate::intercept::Intercept;
use crate::settings::{HELIX_MAX_REFINEMENTS, HELIX_MIN_XY_RATIO};
use crate::vertex::{End, Mode};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geom::BoxShape;
    use nalgebra::Vector3;
    use rand::Rng;
    use std::f64::consts::PI;

    fn search() -> HelixSearch {
        HelixSearch {
            step: 20.0,
            tolerance: 1.0,
            max_xy: 300.0,
        }
    }

    #[test]
    fn finds_wall_in_front_of_last_end() {
        // circle of radius 1000 centred at x = 1000: the last end (angle π)
        // sits at the origin and travels towards -y
        let helix = Helix3::new(Point3::new(1000.0, 0.0, 0.0), 1000.0, 0.0, PI - 0.5, PI).unwrap();
        let wall = Shape::Box(BoxShape::new(500.0, 10.0, 500.0));
        let placement = Placement::from_translation(Vector3::new(0.0, -100.0, 0.0));
        let hit = find_helix_intercept(&helix, End::Last, &wall, &placement, &search()).unwrap();
        assert_eq!(hit.mode, Mode::Helix);
        assert!((hit.impact.y + 95.0).abs() < 1.0);
        let local = placement.mother_to_child(&hit.impact);
        assert!(wall.on_surface(&local, 1.0 + 1e-9));
        // close to the true arclength of the curve down to y = -95
        let expected = 1000.0 * (95.0f64 / 1000.0).asin();
        assert!((hit.distance - expected).abs() < 2.0);
        assert!((hit.distance_xy - hit.distance).abs() < 1e-9);
    }

    #[test]
    fn nothing_beyond_the_transverse_limit() {
        let helix = Helix3::new(Point3::new(1000.0, 0.0, 0.0), 1000.0, 0.0, PI - 0.5, PI).unwrap();
        let wall = Shape::Box(BoxShape::new(500.0, 10.0, 500.0));
        let placement = Placement::from_translation(Vector3::new(0.0, -400.0, 0.0));
        assert!(find_helix_intercept(&helix, End::Last, &wall, &placement, &search()).is_none());
    }

    #[test]
    fn iterations_are_bounded() {
        let mut rng = rand::rng();
        let settings = search();
        let wall = Shape::Box(BoxShape::new(150.0, 150.0, 150.0));
        for _ in 0..300 {
            let radius = rng.random_range(50.0..5000.0);
            let helix = Helix3::new(
                Point3::new(rng.random_range(-500.0..500.0), rng.random_range(-500.0..500.0), 0.0),
                radius,
                rng.random_range(-3000.0..3000.0),
                rng.random_range(-PI..PI),
                rng.random_range(-PI..PI),
            )
            .unwrap();
            let placement = Placement::from_translation(Vector3::new(
                rng.random_range(-400.0..400.0),
                rng.random_range(-400.0..400.0),
                rng.random_range(-400.0..400.0),
            ));
            let s_max = settings.max_arclength(&helix);
            for end in End::BOTH {
                if let Some(hit) = find_helix_intercept(&helix, end, &wall, &placement, &settings) {
                    let bound = (s_max / settings.step).ceil() as usize + HELIX_MAX_REFINEMENTS;
                    assert!(hit.iterations <= bound);
                    assert!(hit.distance >= 0.0 && hit.distance <= s_max);
                }
            }
        }
    }
}

/// Parameters of one helix search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HelixSearch {
    /// Chord length of the bracketing walk (mm).
    pub step: f64,
    /// Convergence tolerance (mm).
    pub tolerance: f64,
    /// Largest transverse distance worth walking (mm).
    pub max_xy: f64,
}

impl HelixSearch {
    /// Arclength corresponding to `max_xy` on this helix.
    pub fn max_arclength(&self, helix: &Helix3) -> f64 {
        self.max_xy / helix.xy_ratio().max(HELIX_MIN_XY_RATIO)
    }
}

/// Crossing of the chord `[a, b]` (helix arclengths from `end`) with the
/// solid, as a local face intercept and the arclength where it occurs.
fn chord_crossing(
    helix: &Helix3,
    end: End,
    a: f64,
    b: f64,
    shape: &Shape,
    placement: &Placement,
    tolerance: f64,
) -> Option<(FaceIntercept, f64)> {
    let start = placement.mother_to_child(&helix.point_from_end(end, a));
    let stop = placement.mother_to_child(&helix.point_from_end(end, b));
    let chord = stop - start;
    let length = chord.norm();
    let direction = Unit::try_new(chord, f64::EPSILON)?;
    let hit = shape.find_intercept(&start, &direction, tolerance)?;
    let t = (hit.impact - start).dot(&*direction);
    if t > length + tolerance {
        return None;
    }
    // chord and arc lengths agree to second order at this scale
    let s = a + (b - a) * (t / length);
    Some((hit, s))
}

/// Searches the first crossing of a placed solid by `helix`, walking outward
/// from `end`.
pub fn find_helix_intercept(
    helix: &Helix3,
    end: End,
    shape: &Shape,
    placement: &Placement,
    search: &HelixSearch,
) -> Option<Intercept> {
    let tolerance = search.tolerance;
    let s_max = search.max_arclength(helix);
    let steps = (s_max / search.step).ceil() as usize;
    let mut iterations = 0;

    let mut bracket = None;
    let mut a = 0.0;
    for i in 1..=steps {
        iterations += 1;
        let b = (i as f64 * search.step).min(s_max);
        if let Some(crossing) = chord_crossing(helix, end, a, b, shape, placement, tolerance) {
            bracket = Some((a, b, crossing));
            break;
        }
        a = b;
    }
    let (mut a, mut b, (mut hit, mut s)) = bracket?;
    tracing::trace!("helix bracket [{a:.3}, {b:.3}] after {iterations} steps");

    for _ in 0..HELIX_MAX_REFINEMENTS {
        if (b - a) < tolerance {
            break;
        }
        let mid = 0.5 * (a + b);
        let refined = match chord_crossing(helix, end, a, mid, shape, placement, tolerance) {
            Some(crossing) => {
                b = mid;
                crossing
            }
            None => match chord_crossing(helix, end, mid, b, shape, placement, tolerance) {
                Some(crossing) => {
                    a = mid;
                    crossing
                }
                // the arc grazes the solid between the half chords
                None => break,
            },
        };
        iterations += 1;
        let moved = (refined.0.impact - hit.impact).norm();
        (hit, s) = refined;
        if moved < tolerance {
            break;
        }
    }

    let s = s.clamp(0.0, s_max);
    let impact: Point3<f64> = placement.child_to_mother(&hit.impact);
    tracing::trace!("helix intercept on {:?} face at {:?}, s = {:.3}", hit.face, impact, s);
    Some(Intercept {
        face: hit.face,
        impact,
        distance: s,
        distance_xy: s * helix.xy_ratio(),
        mode: Mode::Helix,
        iterations,
    })
}
