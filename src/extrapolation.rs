//! Extrapolation orchestrator.
//!
//! **Context**: A fitted trajectory is extrapolated from both of its ends onto
//! the detector surfaces it may have come from or gone to: the source foil,
//! the calibration spots, and the calorimeter and veto walls.
//!
//! **How it Works**: [`VertexExtrapolator`] owns the settings and the
//! [`SpatialIndex`] built once from the catalogue. For each trajectory it:
//! 1. reads the tracker side from the trajectory identifier,
//! 2. enables categories from the tracker cells touched by the cluster,
//! 3. runs every enabled category strategy on every enabled end,
//! 4. reduces each (end, category) result with the selection policy,
//! 5. converts the survivors into [`Vertex`] records.
//!
//! Nothing is mutated after construction, so one extrapolator can serve
//! trajectories from several threads at once.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::catalogue::GeometryCatalogue;
use crate::curve::Trajectory;
use crate::error::{InitError, TrajectoryError};
use crate::geom::GeomId;
use crate::index::SpatialIndex;
use crate::selection;
use crate::settings::{Settings, TrackerLayout};
use crate::strategy::{self, SearchContext};
use crate::vertex::{Category, End, Vertex, VertexCandidate};


/// Work counters of one extrapolation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    /// Category walls skipped by the half-space test.
    pub pruned: usize,
    /// Parent volumes missed by the coarse phase.
    pub coarse_misses: usize,
    /// Elements tested by the fine phase.
    pub elements_tested: usize,
    /// Helix searches run, coarse and fine.
    pub helix_searches: usize,
}

/// A tracker cell crossed by the particle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerHit {
    pub side: u32,
    pub layer: u32,
    pub row: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerCluster {
    pub hits: Vec<TrackerHit>,
}

/// A trajectory as handed over by the track fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackerTrajectory {
    /// Tracker identifier `[module, side]`.
    #[serde(default)]
    pub id: Option<GeomId>,
    pub trajectory: Trajectory,
    /// Cluster the trajectory was fitted on. Without one, every category is searched.
    #[serde(default)]
    pub cluster: Option<TrackerCluster>,
}

/// Set of vertex categories, as [`Category::bit`] flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CategoryMask(u32);

impl CategoryMask {
    pub const NONE: CategoryMask = CategoryMask(0);
    pub const ALL: CategoryMask = CategoryMask(u32::MAX);

    pub fn contains(self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    pub fn insert(&mut self, category: Category) {
        self.0 |= category.bit();
    }

    pub fn remove(&mut self, category: Category) {
        self.0 &= !category.bit();
    }

    /// Categories reachable from the tracker cells of a cluster: the first two
    /// layers face the source, the last two face the calorimeter wall, the
    /// first and last rows face the X-calorimeters. Any hit may lead to a veto.
    pub fn from_cluster(cluster: &TrackerCluster, layout: &TrackerLayout) -> Self {
        let mut mask = CategoryMask::NONE;
        for hit in &cluster.hits {
            if hit.layer <= 1 {
                mask.insert(Category::SourceFoil);
                mask.insert(Category::SourceGap);
                mask.insert(Category::CalibrationSource);
            }
            if hit.layer + 2 >= layout.layers {
                mask.insert(Category::MainCalorimeter);
            }
            if hit.row == 0 || hit.row + 1 == layout.rows {
                mask.insert(Category::XCalorimeter);
            }
            mask.insert(Category::GammaVeto);
        }
        mask
    }

    /// Applies the global category switches.
    pub fn restricted_by(mut self, settings: &Settings) -> Self {
        let switches = &settings.categories;
        for (enabled, categories) in [
            (switches.source, &[Category::SourceFoil, Category::SourceGap][..]),
            (switches.calibration, &[Category::CalibrationSource][..]),
            (switches.calo, &[Category::MainCalorimeter][..]),
            (switches.xcalo, &[Category::XCalorimeter][..]),
            (switches.gveto, &[Category::GammaVeto][..]),
        ] {
            if !enabled {
                categories.iter().for_each(|&category| self.remove(category));
            }
        }
        self
    }
}

/// Categories in search order.
const SEARCH_ORDER: [Category; 6] = [
    Category::SourceFoil,
    Category::SourceGap,
    Category::CalibrationSource,
    Category::MainCalorimeter,
    Category::XCalorimeter,
    Category::GammaVeto,
];

pub struct VertexExtrapolator {
    settings: Settings,
    index: SpatialIndex,
}

impl VertexExtrapolator {
    pub fn new(catalogue: &dyn GeometryCatalogue, settings: Settings) -> Result<Self, InitError> {
        settings.validate()?;
        let index = SpatialIndex::build(catalogue, settings.module)?;
        tracing::info!("vertex extrapolator ready for module {}", settings.module);
        Ok(Self { settings, index })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn index(&self) -> &SpatialIndex {
        &self.index
    }

    /// Tracker side of a trajectory, checked against the served module.
    pub fn side_of(&self, trajectory: &TrackerTrajectory) -> Result<u32, TrajectoryError> {
        let id = trajectory.id.as_ref().ok_or(TrajectoryError::MissingGeomId)?;
        let (Some(module), Some(side)) = (id.get(0), id.get(1)) else {
            return Err(TrajectoryError::MissingAddress { id: id.clone() });
        };
        if side > 1 {
            return Err(TrajectoryError::MissingAddress { id: id.clone() });
        }
        if module != self.settings.module {
            return Err(TrajectoryError::ForeignModule {
                expected: self.settings.module,
                found: module,
            });
        }
        Ok(side)
    }

    pub fn enabled_categories(&self, trajectory: &TrackerTrajectory) -> CategoryMask {
        let mask = match &trajectory.cluster {
            Some(cluster) => CategoryMask::from_cluster(cluster, &self.settings.tracker),
            None => CategoryMask::ALL,
        };
        mask.restricted_by(&self.settings)
    }

    fn enabled_ends(&self) -> impl Iterator<Item = End> + '_ {
        End::BOTH.into_iter().filter(|end| match end {
            End::First => self.settings.ends.first,
            End::Last => self.settings.ends.last,
        })
    }

    /// Selected candidates of all enabled (end, category) pairs, in search order.
    pub fn candidates(
        &self,
        trajectory: &TrackerTrajectory,
        stats: &mut SearchStats,
    ) -> Result<Vec<VertexCandidate>, TrajectoryError> {
        let side = self.side_of(trajectory)?;
        let mask = self.enabled_categories(trajectory);
        let mut selected = Vec::new();
        for end in self.enabled_ends() {
            let ctx = SearchContext {
                trajectory: &trajectory.trajectory,
                end,
                side,
                settings: &self.settings,
                index: &self.index,
            };
            let source = if SEARCH_ORDER.iter().any(|&c| c.is_source() && mask.contains(c)) {
                strategy::source::coarse(&ctx, stats)
            } else {
                None
            };
            for category in SEARCH_ORDER.into_iter().filter(|&c| mask.contains(c)) {
                let raw = match (category, source.as_ref()) {
                    (Category::SourceFoil, Some(hit)) => strategy::source::search_foil(&ctx, hit, stats),
                    (Category::SourceGap, Some(hit)) => strategy::source::search_gaps(&ctx, hit, stats),
                    (Category::CalibrationSource, Some(hit)) => strategy::calibration::search(&ctx, hit, stats),
                    (Category::SourceFoil | Category::SourceGap | Category::CalibrationSource, None) => Vec::new(),
                    (Category::MainCalorimeter, _) => strategy::calo::search(&ctx, stats),
                    (Category::XCalorimeter, _) => strategy::xcalo::search(&ctx, stats),
                    (Category::GammaVeto, _) => strategy::gveto::search(&ctx, stats),
                    (Category::Wire | Category::Undefined, _) => Vec::new(),
                };
                tracing::debug!("{} end, {}: {} raw candidates", end, category, raw.len());
                selected.extend(selection::select(
                    category,
                    raw,
                    self.settings.selection.policy,
                    self.index.effective(category),
                    self.settings.intercept.tolerance,
                ));
            }
        }
        Ok(selected)
    }

    pub fn try_extrapolate(&self, trajectory: &TrackerTrajectory) -> Result<Vec<Vertex>, TrajectoryError> {
        let mut stats = SearchStats::default();
        let vertices: Vec<Vertex> = self
            .candidates(trajectory, &mut stats)?
            .into_iter()
            .map(Vertex::from)
            .collect();
        tracing::debug!("{} vertices, {:?}", vertices.len(), stats);
        Ok(vertices)
    }

    /// Like [`Self::try_extrapolate`], with malformed trajectories logged and
    /// producing no vertex.
    pub fn extrapolate(&self, trajectory: &TrackerTrajectory) -> Vec<Vertex> {
        self.try_extrapolate(trajectory).unwrap_or_else(|error| {
            tracing::warn!("trajectory not extrapolated: {}", error);
            Vec::new()
        })
    }

    /// Extrapolates independent trajectories in parallel. Output order follows input order.
    pub fn extrapolate_all(&self, trajectories: &[TrackerTrajectory]) -> Vec<Vec<Vertex>> {
        trajectories
            .par_iter()
            .map(|trajectory| self.extrapolate(trajectory))
            .collect()
    }
}
