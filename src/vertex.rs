use std::fmt;
use std::str::FromStr;

use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::{GeomId, Placement};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip() {
        for category in Category::ALL {
            assert_eq!(category.label().parse::<Category>().unwrap(), category);
        }
        assert_eq!("first".parse::<End>().unwrap(), End::First);
        assert_eq!("helix".parse::<Mode>().unwrap(), Mode::Helix);
        assert!("calorimeter".parse::<Category>().is_err());
    }

    #[test]
    fn category_bits() {
        let mask = Category::MainCalorimeter.bit() | Category::XCalorimeter.bit();
        let vertex = Vertex {
            id: GeomId::new(1302, [0, 1, 5, 3]),
            position: Point3::origin(),
            error: [1.0; 3],
            category: Category::XCalorimeter,
            from: End::Last,
            extrapolation: Mode::Line,
            distance: 10.0,
            distance_xy: 10.0,
            best: true,
            edge: false,
        };
        assert!(vertex.match_categories(mask));
        assert!(!vertex.match_categories(Category::SourceFoil.bit()));
        assert_eq!(Category::Undefined.bit(), 0);
        assert!(Category::SourceGap.is_source());
        assert!(Category::GammaVeto.is_calorimeter());
    }

    #[test]
    fn vertex_json_uses_labels() {
        let json = serde_json::to_value(Category::CalibrationSource).unwrap();
        assert_eq!(json, serde_json::json!("calibration_source"));
        let json = serde_json::to_value(End::First).unwrap();
        assert_eq!(json, serde_json::json!("first"));
    }
}

/// Physical category of a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "foil")]
    SourceFoil,
    #[serde(rename = "calo")]
    MainCalorimeter,
    #[serde(rename = "xcalo")]
    XCalorimeter,
    #[serde(rename = "gveto")]
    GammaVeto,
    #[serde(rename = "wire")]
    Wire,
    #[serde(rename = "calibration_source")]
    CalibrationSource,
    #[serde(rename = "source_gap")]
    SourceGap,
    #[serde(rename = "undefined")]
    Undefined,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::SourceFoil,
        Category::MainCalorimeter,
        Category::XCalorimeter,
        Category::GammaVeto,
        Category::Wire,
        Category::CalibrationSource,
        Category::SourceGap,
        Category::Undefined,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::SourceFoil => "foil",
            Category::MainCalorimeter => "calo",
            Category::XCalorimeter => "xcalo",
            Category::GammaVeto => "gveto",
            Category::Wire => "wire",
            Category::CalibrationSource => "calibration_source",
            Category::SourceGap => "source_gap",
            Category::Undefined => "undefined",
        }
    }

    /// Bit flag used by [`Vertex::match_categories`]. `Undefined` has none.
    pub fn bit(self) -> u32 {
        match self {
            Category::Undefined => 0,
            Category::SourceFoil => 1 << 0,
            Category::MainCalorimeter => 1 << 1,
            Category::XCalorimeter => 1 << 2,
            Category::GammaVeto => 1 << 3,
            Category::Wire => 1 << 4,
            Category::CalibrationSource => 1 << 5,
            Category::SourceGap => 1 << 6,
        }
    }

    /// Categories reduced by the best-candidate selection.
    pub fn is_calorimeter(self) -> bool {
        matches!(
            self,
            Category::MainCalorimeter | Category::XCalorimeter | Category::GammaVeto
        )
    }

    pub fn is_source(self) -> bool {
        matches!(
            self,
            Category::SourceFoil | Category::SourceGap | Category::CalibrationSource
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown {kind} label '{label}'")]
pub struct ParseLabelError {
    kind: &'static str,
    label: String,
}

impl FromStr for Category {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.label() == s)
            .ok_or_else(|| ParseLabelError {
                kind: "vertex category",
                label: s.to_string(),
            })
    }
}

/// Trajectory end a vertex is extrapolated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum End {
    First,
    Last,
}

impl End {
    pub const BOTH: [End; 2] = [End::First, End::Last];

    pub fn label(self) -> &'static str {
        match self {
            End::First => "first",
            End::Last => "last",
        }
    }
}

impl fmt::Display for End {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for End {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(End::First),
            "last" => Ok(End::Last),
            _ => Err(ParseLabelError {
                kind: "vertex from",
                label: s.to_string(),
            }),
        }
    }
}

/// Extrapolation method that produced a vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Line,
    Helix,
}

impl Mode {
    pub fn label(self) -> &'static str {
        match self {
            Mode::Line => "line",
            Mode::Helix => "helix",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Mode {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "line" => Ok(Mode::Line),
            "helix" => Ok(Mode::Helix),
            _ => Err(ParseLabelError {
                kind: "vertex extrapolation",
                label: s.to_string(),
            }),
        }
    }
}

/// An intercept produced by a category search, before conversion to a [`Vertex`].
/// Only the `best` and `edge` flags change after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexCandidate {
    pub category: Category,
    pub end: End,
    pub mode: Mode,
    pub id: GeomId,
    /// Placement of the intercepted element.
    pub placement: Placement,
    /// Impact point, world frame.
    pub impact: Point3<f64>,
    /// Distance travelled from the trajectory end to the impact.
    pub distance: f64,
    /// The same distance projected on the plane transverse to the field.
    pub distance_xy: f64,
    pub tolerance: f64,
    pub best: bool,
    pub edge: bool,
}

/// Output vertex record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vertex {
    pub id: GeomId,
    pub position: Point3<f64>,
    /// Symmetric position error along x, y and z.
    pub error: [f64; 3],
    pub category: Category,
    pub from: End,
    pub extrapolation: Mode,
    pub distance: f64,
    pub distance_xy: f64,
    pub best: bool,
    pub edge: bool,
}

impl Vertex {
    pub fn match_categories(&self, flags: u32) -> bool {
        self.category.bit() & flags != 0
    }
}

impl From<VertexCandidate> for Vertex {
    fn from(candidate: VertexCandidate) -> Self {
        Vertex {
            id: candidate.id,
            position: candidate.impact,
            error: [candidate.tolerance; 3],
            category: candidate.category,
            from: candidate.end,
            extrapolation: candidate.mode,
            distance: candidate.distance,
            distance_xy: candidate.distance_xy,
            best: candidate.best,
            edge: candidate.edge,
        }
    }
}

impl fmt::Display for Vertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} vertex on {} from {} ({}): ({:.3}, {:.3}, {:.3}) mm, distance {:.3} mm, xy {:.3} mm{}{}",
            self.category,
            self.id,
            self.from,
            self.extrapolation,
            self.position.x,
            self.position.y,
            self.position.z,
            self.distance,
            self.distance_xy,
            if self.best { " [best]" } else { "" },
            if self.edge { " [edge]" } else { "" },
        )
    }
}
