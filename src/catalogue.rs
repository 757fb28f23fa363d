//! Detector geometry catalogue.
//!
//! The engine only needs three queries from the geometry description: the
//! type id of a named category, the ids matching an address pattern, and the
//! solid and placement of an id. [`GeometryCatalogue`] captures exactly these.
//! [`DetectorCatalogue`] is the in-memory implementation, which can be read
//! from and written to JSON.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::{GeomId, GeomIdPattern, Volume};


pub const TRACKER_SUBMODULE: &str = "tracker_submodule";
pub const CALORIMETER_SUBMODULE: &str = "calorimeter_submodule";
pub const CALORIMETER_BLOCK: &str = "calorimeter_block";
pub const XCALO_WALL: &str = "xcalo_wall";
pub const XCALO_BLOCK: &str = "xcalo_block";
pub const GVETO_WALL: &str = "gveto_wall";
pub const GVETO_BLOCK: &str = "gveto_block";
pub const SOURCE_SUBMODULE: &str = "source_submodule";
pub const SOURCE_STRIP: &str = "source_strip";
pub const SOURCE_PAD: &str = "source_pad";
pub const SOURCE_PAD_BULK: &str = "source_pad_bulk";
pub const SOURCE_STRIP_GAP: &str = "source_strip_gap";
pub const SOURCE_CALIBRATION_SPOT: &str = "source_calibration_spot";

/// Read-only geometry queries used by the extrapolation engine.
pub trait GeometryCatalogue {
    /// Type id of a named category, `None` when the category is not described.
    fn category_type(&self, name: &str) -> Option<u32>;

    /// Ids matching `pattern`, in insertion order.
    fn list_ids(&self, pattern: &GeomIdPattern) -> Vec<GeomId>;

    fn resolve(&self, id: &GeomId) -> Option<&Volume>;
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CatalogueError {
    #[error("Geometry id {0} is already in the catalogue")]
    DuplicateId(GeomId),

    #[error("Category '{0}' is already registered")]
    DuplicateCategory(String),
}

/// One catalogue record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueEntry {
    pub id: GeomId,
    pub volume: Volume,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogueRepr {
    categories: BTreeMap<String, u32>,
    volumes: Vec<CatalogueEntry>,
}

/// In-memory geometry catalogue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "CatalogueRepr", into = "CatalogueRepr")]
pub struct DetectorCatalogue {
    categories: BTreeMap<String, u32>,
    entries: Vec<CatalogueEntry>,
    lookup: HashMap<GeomId, usize>,
}

impl TryFrom<CatalogueRepr> for DetectorCatalogue {
    type Error = CatalogueError;

    fn try_from(repr: CatalogueRepr) -> Result<Self, Self::Error> {
        let mut catalogue = DetectorCatalogue {
            categories: repr.categories,
            ..Default::default()
        };
        for entry in repr.volumes {
            catalogue.insert(entry.id, entry.volume)?;
        }
        Ok(catalogue)
    }
}

impl From<DetectorCatalogue> for CatalogueRepr {
    fn from(catalogue: DetectorCatalogue) -> Self {
        CatalogueRepr {
            categories: catalogue.categories,
            volumes: catalogue.entries,
        }
    }
}

impl DetectorCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_category(&mut self, name: &str, type_id: u32) -> Result<(), CatalogueError> {
        if self.categories.contains_key(name) {
            return Err(CatalogueError::DuplicateCategory(name.to_string()));
        }
        self.categories.insert(name.to_string(), type_id);
        Ok(())
    }

    pub fn insert(&mut self, id: GeomId, volume: Volume) -> Result<(), CatalogueError> {
        if self.lookup.contains_key(&id) {
            return Err(CatalogueError::DuplicateId(id));
        }
        self.lookup.insert(id.clone(), self.entries.len());
        self.entries.push(CatalogueEntry { id, volume });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let catalogue: DetectorCatalogue = serde_json::from_str(&text)?;
        tracing::info!(
            "loaded {} geometry volumes in {} categories from {:?}",
            catalogue.len(),
            catalogue.categories.len(),
            path.as_ref()
        );
        Ok(catalogue)
    }

    pub fn write_json_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        Ok(())
    }
}

impl GeometryCatalogue for DetectorCatalogue {
    fn category_type(&self, name: &str) -> Option<u32> {
        self.categories.get(name).copied()
    }

    fn list_ids(&self, pattern: &GeomIdPattern) -> Vec<GeomId> {
        self.entries
            .iter()
            .filter(|entry| pattern.matches(&entry.id))
            .map(|entry| entry.id.clone())
            .collect()
    }

    fn resolve(&self, id: &GeomId) -> Option<&Volume> {
        self.lookup.get(id).map(|&i| &self.entries[i].volume)
    }
}
