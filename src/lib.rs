pub mod catalogue;
pub mod curve;
pub mod demonstrator;
pub mod error;
pub mod extrapolation;
pub mod geom;
pub mod helix_intercept;
pub mod index;
pub mod intercept;
pub mod output;
pub mod selection;
pub mod settings;
pub mod strategy;
pub mod vertex;
