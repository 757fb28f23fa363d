//! Error types of the extrapolation engine.
//!
//! Two families exist:
//! - [`InitError`]: raised once when the engine is built, when the settings or
//!   the geometry catalogue cannot support the search (fatal).
//! - [`TrajectoryError`]: a trajectory that cannot be extrapolated; callers
//!   treat it as "no vertices produced".
//!
//! Not finding an intercept is never an error.

use thiserror::Error;

use crate::geom::GeomId;
use crate::vertex::Category;

/// Engine construction failure.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InitError {
    /// Settings are numerically inconsistent
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// An element listed by the catalogue has no geometry record
    #[error("Geometry element {id} cannot be resolved in the catalogue")]
    UnresolvedElement {
        /// The element identifier.
        id: GeomId,
    },

    /// A solid expected to be a box is another kind of shape
    #[error("Geometry element {id} has a '{found}' shape where a box was expected")]
    NotABox {
        /// The element identifier.
        id: GeomId,
        /// The shape kind found instead.
        found: &'static str,
    },

    /// A grid anchor element (first or second along an axis) is missing
    #[error("No {category} element found at address {address:?} to anchor the {axis} axis")]
    MissingElement {
        /// The category being indexed.
        category: Category,
        /// The axis being derived.
        axis: &'static str,
        /// The address that was looked up.
        address: Vec<u32>,
    },

    /// Two neighbouring elements share the same position along a grid axis
    #[error("Degenerate {axis} axis for {category}: neighbouring elements do not move along it")]
    DegenerateGrid {
        /// The category being indexed.
        category: Category,
        /// The axis being derived.
        axis: &'static str,
    },

    /// Deflating a block would remove its whole transverse extent
    #[error("Cannot build the effective shape of {category}: {reason}")]
    InvalidEffectiveShape {
        /// The category whose blocks are deflated.
        category: Category,
        /// Why the shape is rejected.
        reason: String,
    },
}

/// Malformed trajectory input.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrajectoryError {
    /// The trajectory carries no geometry identifier
    #[error("Tracker trajectory has no geometry identifier")]
    MissingGeomId,

    /// The identifier lacks a module or side address
    #[error("Trajectory geometry identifier {id} has no valid 'module' or 'side' address")]
    MissingAddress {
        /// The offending identifier.
        id: GeomId,
    },

    /// The trajectory belongs to another detector module
    #[error("Trajectory belongs to module {found}, the engine serves module {expected}")]
    ForeignModule {
        /// Module served by the engine.
        expected: u32,
        /// Module of the trajectory.
        found: u32,
    },
}
