//! Fitted trajectory curves.
//!
//! A [`Trajectory`] is either a straight [`Line3`] segment or a [`Helix3`]
//! arc whose axis is parallel to the magnetic field (`z`). Both expose the
//! same endpoint queries so that the search strategies can work from either
//! end of the curve:
//!
//! - [`Trajectory::endpoint`] returns the first or last point,
//! - [`Trajectory::tangent`] returns the unit direction of travel (first to last),
//! - [`Trajectory::outward`] returns the direction pointing away from the curve at
//!   that end, which is where extrapolation searches.
//!
//! Curves are validated when built (or deserialized), so every query on a
//! constructed curve is infallible.

use std::f64::consts::TAU;

use nalgebra::{Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

use crate::vertex::{End, Mode};


/// A straight segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LineRepr", into = "LineRepr")]
pub struct Line3 {
    first: Point3<f64>,
    last: Point3<f64>,
    direction: Unit<Vector3<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LineRepr {
    first: Point3<f64>,
    last: Point3<f64>,
}

impl TryFrom<LineRepr> for Line3 {
    type Error = String;

    fn try_from(repr: LineRepr) -> Result<Self, Self::Error> {
        Line3::new(repr.first, repr.last)
            .ok_or_else(|| "line segment has coincident endpoints".to_string())
    }
}

impl From<Line3> for LineRepr {
    fn from(line: Line3) -> Self {
        LineRepr {
            first: line.first,
            last: line.last,
        }
    }
}

impl Line3 {
    /// Returns `None` for a zero-length segment.
    pub fn new(first: Point3<f64>, last: Point3<f64>) -> Option<Self> {
        let direction = Unit::try_new(last - first, f64::EPSILON)?;
        Some(Self {
            first,
            last,
            direction,
        })
    }

    pub fn first(&self) -> Point3<f64> {
        self.first
    }

    pub fn last(&self) -> Point3<f64> {
        self.last
    }

    pub fn length(&self) -> f64 {
        (self.last - self.first).norm()
    }

    pub fn endpoint(&self, end: End) -> Point3<f64> {
        match end {
            End::First => self.first,
            End::Last => self.last,
        }
    }

    pub fn tangent(&self, _end: End) -> Unit<Vector3<f64>> {
        self.direction
    }

    pub fn outward(&self, end: End) -> Unit<Vector3<f64>> {
        match end {
            End::First => -self.direction,
            End::Last => self.direction,
        }
    }
}

/// A helix arc with its axis along `z`:
/// `point(a) = center + (R cos a, R sin a, pitch * a / 2π)`, with `a` running
/// from `angle1` (first end) to `angle2` (last end).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "HelixRepr", into = "HelixRepr")]
pub struct Helix3 {
    center: Point3<f64>,
    radius: f64,
    pitch: f64,
    angle1: f64,
    angle2: f64,
    first: Point3<f64>,
    last: Point3<f64>,
    first_tangent: Unit<Vector3<f64>>,
    last_tangent: Unit<Vector3<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct HelixRepr {
    center: Point3<f64>,
    radius: f64,
    /// Signed z advance per turn.
    pitch: f64,
    angle1: f64,
    angle2: f64,
}

impl TryFrom<HelixRepr> for Helix3 {
    type Error = String;

    fn try_from(repr: HelixRepr) -> Result<Self, Self::Error> {
        Helix3::new(repr.center, repr.radius, repr.pitch, repr.angle1, repr.angle2).ok_or_else(|| {
            format!(
                "invalid helix: radius {} over angles [{}, {}]",
                repr.radius, repr.angle1, repr.angle2
            )
        })
    }
}

impl From<Helix3> for HelixRepr {
    fn from(helix: Helix3) -> Self {
        HelixRepr {
            center: helix.center,
            radius: helix.radius,
            pitch: helix.pitch,
            angle1: helix.angle1,
            angle2: helix.angle2,
        }
    }
}

impl Helix3 {
    /// Returns `None` unless the radius is positive, every parameter is finite
    /// and the arc spans a non-zero angle.
    pub fn new(center: Point3<f64>, radius: f64, pitch: f64, angle1: f64, angle2: f64) -> Option<Self> {
        let finite = center.coords.iter().all(|c| c.is_finite())
            && [radius, pitch, angle1, angle2].iter().all(|v| v.is_finite());
        if !finite || radius <= 0.0 || angle1 == angle2 {
            return None;
        }
        let mut helix = Self {
            center,
            radius,
            pitch,
            angle1,
            angle2,
            first: center,
            last: center,
            first_tangent: Vector3::x_axis(),
            last_tangent: Vector3::x_axis(),
        };
        helix.first = helix.point_at_angle(angle1);
        helix.last = helix.point_at_angle(angle2);
        helix.first_tangent = helix.travel_direction_at(angle1);
        helix.last_tangent = helix.travel_direction_at(angle2);
        Some(helix)
    }

    pub fn center(&self) -> Point3<f64> {
        self.center
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    pub fn angles(&self) -> (f64, f64) {
        (self.angle1, self.angle2)
    }

    pub fn first(&self) -> Point3<f64> {
        self.first
    }

    pub fn last(&self) -> Point3<f64> {
        self.last
    }

    /// Arclength covered per radian of phase.
    pub fn arclength_per_radian(&self) -> f64 {
        self.radius.hypot(self.pitch / TAU)
    }

    /// Transverse (XY) length travelled per unit of arclength.
    pub fn xy_ratio(&self) -> f64 {
        self.radius / self.arclength_per_radian()
    }

    pub fn length(&self) -> f64 {
        self.arclength_per_radian() * (self.angle2 - self.angle1).abs()
    }

    fn travel_sign(&self) -> f64 {
        (self.angle2 - self.angle1).signum()
    }

    pub fn point_at_angle(&self, angle: f64) -> Point3<f64> {
        self.center
            + Vector3::new(
                self.radius * angle.cos(),
                self.radius * angle.sin(),
                self.pitch * angle / TAU,
            )
    }

    fn travel_direction_at(&self, angle: f64) -> Unit<Vector3<f64>> {
        let derivative = Vector3::new(
            -self.radius * angle.sin(),
            self.radius * angle.cos(),
            self.pitch / TAU,
        );
        Unit::new_normalize(derivative * self.travel_sign())
    }

    /// Point at arclength `s` from the first end, along the direction of travel.
    /// `s` may lie outside `[0, length]`.
    pub fn point_at_arclength(&self, s: f64) -> Point3<f64> {
        let angle = self.angle1 + self.travel_sign() * s / self.arclength_per_radian();
        self.point_at_angle(angle)
    }

    /// Point reached after walking an arclength `s` outward from `end`.
    pub fn point_from_end(&self, end: End, s: f64) -> Point3<f64> {
        match end {
            End::First => self.point_at_arclength(-s),
            End::Last => self.point_at_arclength(self.length() + s),
        }
    }

    pub fn endpoint(&self, end: End) -> Point3<f64> {
        match end {
            End::First => self.first,
            End::Last => self.last,
        }
    }

    pub fn tangent(&self, end: End) -> Unit<Vector3<f64>> {
        match end {
            End::First => self.first_tangent,
            End::Last => self.last_tangent,
        }
    }

    pub fn outward(&self, end: End) -> Unit<Vector3<f64>> {
        match end {
            End::First => -self.first_tangent,
            End::Last => self.last_tangent,
        }
    }
}

/// A fitted trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "lowercase")]
pub enum Trajectory {
    Line(Line3),
    Helix(Helix3),
}

impl Trajectory {
    pub fn mode(&self) -> Mode {
        match self {
            Trajectory::Line(_) => Mode::Line,
            Trajectory::Helix(_) => Mode::Helix,
        }
    }

    pub fn endpoint(&self, end: End) -> Point3<f64> {
        match self {
            Trajectory::Line(line) => line.endpoint(end),
            Trajectory::Helix(helix) => helix.endpoint(end),
        }
    }

    pub fn tangent(&self, end: End) -> Unit<Vector3<f64>> {
        match self {
            Trajectory::Line(line) => line.tangent(end),
            Trajectory::Helix(helix) => helix.tangent(end),
        }
    }

    pub fn outward(&self, end: End) -> Unit<Vector3<f64>> {
        match self {
            Trajectory::Line(line) => line.outward(end),
            Trajectory::Helix(helix) => helix.outward(end),
        }
    }

    pub fn as_helix(&self) -> Option<&Helix3> {
        match self {
            Trajectory::Helix(helix) => Some(helix),
            Trajectory::Line(_) => None,
        }
    }
}

impl From<Line3> for Trajectory {
    fn from(line: Line3) -> Self {
        Trajectory::Line(line)
    }
}

impl From<Helix3> for Trajectory {
    fn from(helix: Helix3) -> Self {
        Trajectory::Helix(helix)
    }
}
