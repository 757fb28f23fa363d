use std::f64::consts::FRAC_PI_2;
use std::fmt;

use itertools::Itertools;
use nalgebra::{Isometry3, Point3, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};


/// Sentinel for an address component that is not set.
pub const INVALID_ADDRESS: u32 = u32::MAX;

/// Geometry identifier: a category type and a multi-component address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeomId {
    pub type_id: u32,
    pub address: Vec<u32>,
}

impl GeomId {
    pub fn new(type_id: u32, address: impl Into<Vec<u32>>) -> Self {
        Self {
            type_id,
            address: address.into(),
        }
    }

    /// Returns the address component at `index`, if present and valid.
    pub fn get(&self, index: usize) -> Option<u32> {
        self.address
            .get(index)
            .copied()
            .filter(|&value| value != INVALID_ADDRESS)
    }
}

impl fmt::Display for GeomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}]", self.type_id, self.address.iter().join("."))
    }
}

/// An address pattern where `None` components match any value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeomIdPattern {
    pub type_id: u32,
    pub address: Vec<Option<u32>>,
}

impl GeomIdPattern {
    pub fn new(type_id: u32, address: impl Into<Vec<Option<u32>>>) -> Self {
        Self {
            type_id,
            address: address.into(),
        }
    }

    pub fn matches(&self, id: &GeomId) -> bool {
        id.type_id == self.type_id
            && id.address.len() == self.address.len()
            && self
                .address
                .iter()
                .zip(id.address.iter())
                .all(|(pattern, value)| pattern.map_or(true, |p| p == *value))
    }
}

/// Placement of a solid in the world frame: maps local (child) coordinates to
/// world (mother) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlacementRepr", into = "PlacementRepr")]
pub struct Placement {
    iso: Isometry3<f64>,
}

impl Placement {
    pub fn new(translation: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self {
            iso: Isometry3::from_parts(Translation3::from(translation), rotation),
        }
    }

    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self::new(translation, UnitQuaternion::identity())
    }

    /// Builds a placement from roll, pitch and yaw angles given in degrees.
    pub fn from_euler_deg(translation: Vector3<f64>, roll: f64, pitch: f64, yaw: f64) -> Self {
        let rotation =
            UnitQuaternion::from_euler_angles(roll.to_radians(), pitch.to_radians(), yaw.to_radians());
        Self::new(translation, rotation)
    }

    /// Local z along world x.
    pub fn rotated_y(translation: Vector3<f64>) -> Self {
        Self::new(
            translation,
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2),
        )
    }

    /// Local z along world y.
    pub fn rotated_x(translation: Vector3<f64>) -> Self {
        Self::new(
            translation,
            UnitQuaternion::from_axis_angle(&Vector3::x_axis(), -FRAC_PI_2),
        )
    }

    /// World position of the local origin.
    pub fn position(&self) -> Point3<f64> {
        Point3::from(self.iso.translation.vector)
    }

    pub fn mother_to_child(&self, point: &Point3<f64>) -> Point3<f64> {
        self.iso.inverse_transform_point(point)
    }

    pub fn child_to_mother(&self, point: &Point3<f64>) -> Point3<f64> {
        self.iso.transform_point(point)
    }

    pub fn mother_to_child_direction(&self, direction: &Vector3<f64>) -> Vector3<f64> {
        self.iso.inverse_transform_vector(direction)
    }

    pub fn child_to_mother_direction(&self, direction: &Vector3<f64>) -> Vector3<f64> {
        self.iso.transform_vector(direction)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlacementRepr {
    translation: [f64; 3],
    /// Roll, pitch and yaw in degrees.
    #[serde(default)]
    rotation: [f64; 3],
}

impl From<PlacementRepr> for Placement {
    fn from(repr: PlacementRepr) -> Self {
        let [roll, pitch, yaw] = repr.rotation;
        Placement::from_euler_deg(Vector3::from(repr.translation), roll, pitch, yaw)
    }
}

impl From<Placement> for PlacementRepr {
    fn from(placement: Placement) -> Self {
        let (roll, pitch, yaw) = placement.iso.rotation.euler_angles();
        let t = placement.iso.translation.vector;
        PlacementRepr {
            translation: [t.x, t.y, t.z],
            rotation: [roll.to_degrees(), pitch.to_degrees(), yaw.to_degrees()],
        }
    }
}

/// Identifies the face of a solid crossed by an intercept.
/// Box faces follow the local axes; cylinders use `Bottom`, `Top` and `Side`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FaceId {
    Back,
    Front,
    Left,
    Right,
    Bottom,
    Top,
    Side,
}

impl FaceId {
    fn from_axis(axis: usize, sign: f64) -> Self {
        match (axis, sign > 0.0) {
            (0, false) => FaceId::Back,
            (0, true) => FaceId::Front,
            (1, false) => FaceId::Left,
            (1, true) => FaceId::Right,
            (_, false) => FaceId::Bottom,
            (_, true) => FaceId::Top,
        }
    }
}

/// A face crossing in the local frame of a solid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceIntercept {
    pub face: FaceId,
    pub impact: Point3<f64>,
}

/// A box centred on its local origin. Dimensions are full lengths.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoxShape {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BoxShape {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn half(&self) -> Vector3<f64> {
        Vector3::new(0.5 * self.x, 0.5 * self.y, 0.5 * self.z)
    }

    /// Grows the local XY extent by `delta` on every side, depth unchanged.
    pub fn inflated_xy(&self, delta: f64) -> BoxShape {
        BoxShape::new(self.x + 2.0 * delta, self.y + 2.0 * delta, self.z)
    }

    /// Shrinks the local XY extent by `delta` on every side, depth unchanged.
    /// Returns `None` when nothing would be left.
    pub fn deflated_xy(&self, delta: f64) -> Option<BoxShape> {
        let x = self.x - 2.0 * delta;
        let y = self.y - 2.0 * delta;
        (x > 0.0 && y > 0.0).then(|| BoxShape::new(x, y, self.z))
    }

    /// Slab intersection of a ray with the box. Faces behind the origin by
    /// more than `tolerance` are ignored; the nearest remaining crossing wins.
    pub fn find_intercept(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        tolerance: f64,
    ) -> Option<FaceIntercept> {
        let half = self.half();
        let mut best: Option<(f64, FaceIntercept)> = None;
        for axis in 0..3 {
            let d = direction[axis];
            if d.abs() < f64::EPSILON {
                continue;
            }
            for sign in [-1.0, 1.0] {
                let plane = sign * half[axis];
                let t = (plane - origin[axis]) / d;
                if t < -tolerance {
                    continue;
                }
                let mut impact = origin + direction * t;
                let on_face = (0..3)
                    .filter(|&b| b != axis)
                    .all(|b| impact[b].abs() <= half[b] + tolerance);
                if !on_face {
                    continue;
                }
                impact[axis] = plane;
                if best.as_ref().map_or(true, |(best_t, _)| t < *best_t) {
                    let face = FaceId::from_axis(axis, sign);
                    best = Some((t, FaceIntercept { face, impact }));
                }
            }
        }
        best.map(|(_, intercept)| intercept)
    }

    fn faces_containing(&self, point: &Point3<f64>, tolerance: f64) -> impl Iterator<Item = FaceId> + '_ {
        let half = self.half();
        let point = *point;
        (0..3)
            .flat_map(|axis| [(axis, -1.0), (axis, 1.0)])
            .filter(move |&(axis, sign)| {
                (point[axis] - sign * half[axis]).abs() <= tolerance
                    && (0..3)
                        .filter(|&b| b != axis)
                        .all(|b| point[b].abs() <= half[b] + tolerance)
            })
            .map(|(axis, sign)| FaceId::from_axis(axis, sign))
    }

    /// The face holding `point`, if exactly one does.
    pub fn classify_face(&self, point: &Point3<f64>, tolerance: f64) -> Option<FaceId> {
        let mut faces = self.faces_containing(point, tolerance);
        match (faces.next(), faces.next()) {
            (Some(face), None) => Some(face),
            _ => None,
        }
    }

    pub fn on_surface(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        self.faces_containing(point, tolerance).next().is_some()
    }

    pub fn is_inside(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        let half = self.half();
        (0..3).all(|axis| point[axis].abs() <= half[axis] + tolerance)
    }
}

/// A cylinder centred on its local origin, axis along local z.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CylinderShape {
    pub radius: f64,
    pub z: f64,
}

impl CylinderShape {
    pub fn new(radius: f64, z: f64) -> Self {
        Self { radius, z }
    }

    pub fn find_intercept(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        tolerance: f64,
    ) -> Option<FaceIntercept> {
        let hz = 0.5 * self.z;
        let r = self.radius;
        let mut best: Option<(f64, FaceIntercept)> = None;
        let mut consider = |t: f64, intercept: FaceIntercept| {
            if best.as_ref().map_or(true, |(best_t, _)| t < *best_t) {
                best = Some((t, intercept));
            }
        };

        // end caps
        if direction.z.abs() > f64::EPSILON {
            for sign in [-1.0, 1.0] {
                let t = (sign * hz - origin.z) / direction.z;
                if t < -tolerance {
                    continue;
                }
                let mut impact = origin + direction * t;
                if impact.x.hypot(impact.y) <= r + tolerance {
                    impact.z = sign * hz;
                    let face = if sign > 0.0 { FaceId::Top } else { FaceId::Bottom };
                    consider(t, FaceIntercept { face, impact });
                }
            }
        }

        // lateral surface
        let a = direction.x * direction.x + direction.y * direction.y;
        if a > f64::EPSILON {
            let b = 2.0 * (origin.x * direction.x + origin.y * direction.y);
            let c = origin.x * origin.x + origin.y * origin.y - r * r;
            let disc = b * b - 4.0 * a * c;
            if disc >= 0.0 {
                let sq = disc.sqrt();
                for t in [(-b - sq) / (2.0 * a), (-b + sq) / (2.0 * a)] {
                    if t < -tolerance {
                        continue;
                    }
                    let mut impact = origin + direction * t;
                    if impact.z.abs() > hz + tolerance {
                        continue;
                    }
                    let rho = impact.x.hypot(impact.y);
                    if rho > 0.0 {
                        impact.x *= r / rho;
                        impact.y *= r / rho;
                    }
                    consider(t, FaceIntercept { face: FaceId::Side, impact });
                }
            }
        }

        best.map(|(_, intercept)| intercept)
    }

    fn faces_containing(&self, point: &Point3<f64>, tolerance: f64) -> Vec<FaceId> {
        let hz = 0.5 * self.z;
        let rho = point.x.hypot(point.y);
        let mut faces = Vec::with_capacity(3);
        if (rho - self.radius).abs() <= tolerance && point.z.abs() <= hz + tolerance {
            faces.push(FaceId::Side);
        }
        for (sign, face) in [(-1.0, FaceId::Bottom), (1.0, FaceId::Top)] {
            if (point.z - sign * hz).abs() <= tolerance && rho <= self.radius + tolerance {
                faces.push(face);
            }
        }
        faces
    }

    pub fn classify_face(&self, point: &Point3<f64>, tolerance: f64) -> Option<FaceId> {
        match self.faces_containing(point, tolerance).as_slice() {
            [face] => Some(*face),
            _ => None,
        }
    }

    pub fn on_surface(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        !self.faces_containing(point, tolerance).is_empty()
    }

    pub fn is_inside(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        point.x.hypot(point.y) <= self.radius + tolerance && point.z.abs() <= 0.5 * self.z + tolerance
    }
}

/// A solid shape known to the geometry catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Shape {
    Box(BoxShape),
    Cylinder(CylinderShape),
}

impl Shape {
    pub fn kind(&self) -> &'static str {
        match self {
            Shape::Box(_) => "box",
            Shape::Cylinder(_) => "cylinder",
        }
    }

    /// Box-like view of the shape, if it is one.
    pub fn as_box(&self) -> Option<&BoxShape> {
        match self {
            Shape::Box(b) => Some(b),
            _ => None,
        }
    }

    pub fn find_intercept(
        &self,
        origin: &Point3<f64>,
        direction: &Vector3<f64>,
        tolerance: f64,
    ) -> Option<FaceIntercept> {
        match self {
            Shape::Box(b) => b.find_intercept(origin, direction, tolerance),
            Shape::Cylinder(c) => c.find_intercept(origin, direction, tolerance),
        }
    }

    pub fn classify_face(&self, point: &Point3<f64>, tolerance: f64) -> Option<FaceId> {
        match self {
            Shape::Box(b) => b.classify_face(point, tolerance),
            Shape::Cylinder(c) => c.classify_face(point, tolerance),
        }
    }

    pub fn on_surface(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        match self {
            Shape::Box(b) => b.on_surface(point, tolerance),
            Shape::Cylinder(c) => c.on_surface(point, tolerance),
        }
    }

    pub fn is_inside(&self, point: &Point3<f64>, tolerance: f64) -> bool {
        match self {
            Shape::Box(b) => b.is_inside(point, tolerance),
            Shape::Cylinder(c) => c.is_inside(point, tolerance),
        }
    }
}

impl From<BoxShape> for Shape {
    fn from(b: BoxShape) -> Self {
        Shape::Box(b)
    }
}

impl From<CylinderShape> for Shape {
    fn from(c: CylinderShape) -> Self {
        Shape::Cylinder(c)
    }
}

/// A solid and its world placement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub shape: Shape,
    pub placement: Placement,
}

impl Volume {
    pub fn new(shape: impl Into<Shape>, placement: Placement) -> Self {
        Self {
            shape: shape.into(),
            placement,
        }
    }
}
