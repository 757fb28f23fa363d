//! Category search strategies.
//!
//! Every strategy follows the same sequence for one trajectory end:
//! 1. skip the category when the end points away from the half-space holding it,
//! 2. intercept the parent volume (coarse phase); a miss ends the search,
//! 3. map the coarse impact onto the element grid and test only the elements
//!    in the resulting window (fine phase),
//! 4. keep the intercepts whose transverse distance is within the category limit.
//!
//! The shared machinery lives in [`SearchContext`]; the category modules only
//! decide which volumes, axes and limits apply.

pub mod calibration;
pub mod calo;
pub mod gveto;
pub mod source;
pub mod xcalo;

use nalgebra::{Point3, Unit, Vector3};

use crate::curve::Trajectory;
use crate::extrapolation::SearchStats;
use crate::geom::{Placement, Shape};
use crate::helix_intercept::{find_helix_intercept, HelixSearch};
use crate::index::{BlockGrid, Element, SpatialIndex};
use crate::intercept::{find_line_intercept, Intercept};
use crate::settings::Settings;
use crate::vertex::{Category, End, Mode, VertexCandidate};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::Line3;
    use crate::demonstrator::DemonstratorLayout;

    fn line(first: [f64; 3], last: [f64; 3]) -> Trajectory {
        Trajectory::Line(Line3::new(Point3::from(first), Point3::from(last)).unwrap())
    }

    #[test]
    fn pruning_half_space() {
        let settings = Settings::default();
        let catalogue = DemonstratorLayout::default().build().unwrap();
        let index = SpatialIndex::build(&catalogue, 0).unwrap();
        let trajectory = line([50.0, 0.0, 0.0], [300.0, 0.0, 0.0]);
        let ctx = SearchContext {
            trajectory: &trajectory,
            end: End::Last,
            side: 1,
            settings: &settings,
            index: &index,
        };
        assert!(!ctx.points_away(0, 1.0));
        assert!(ctx.points_away(0, -1.0));
        let ctx = SearchContext { end: End::First, ..ctx };
        // the first end sits at x > 0 but travels towards the foil
        assert!(!ctx.points_away(0, -1.0));
    }
}

/// Sign of the half-space (`x`) holding a tracker side.
pub fn side_sign(side: u32) -> f64 {
    if side == 0 {
        -1.0
    } else {
        1.0
    }
}

/// Everything a strategy needs for one trajectory end.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub trajectory: &'a Trajectory,
    pub end: End,
    pub side: u32,
    pub settings: &'a Settings,
    pub index: &'a SpatialIndex,
}

impl<'a> SearchContext<'a> {
    pub fn origin(&self) -> Point3<f64> {
        self.trajectory.endpoint(self.end)
    }

    pub fn direction(&self) -> Unit<Vector3<f64>> {
        self.trajectory.outward(self.end)
    }

    /// True when both the end point and the outward direction lie on the
    /// opposite side of the `axis = 0` plane from `sign`.
    pub fn points_away(&self, axis: usize, sign: f64) -> bool {
        self.origin()[axis] * sign < 0.0 && self.direction()[axis] * sign < 0.0
    }

    /// Whether helix search replaces the line approximation for this trajectory.
    pub fn helix_only(&self) -> bool {
        self.settings.finder.helix && self.trajectory.as_helix().is_some()
    }

    fn helix_search(&self, max_xy: f64) -> HelixSearch {
        HelixSearch {
            step: self.settings.finder.step,
            tolerance: self.settings.intercept.tolerance,
            max_xy,
        }
    }

    fn intercept(
        &self,
        shape: &Shape,
        placement: &Placement,
        try_line: bool,
        try_helix: bool,
        max_xy: f64,
        stats: &mut SearchStats,
    ) -> Option<Intercept> {
        if try_line && self.settings.finder.line {
            let hit = find_line_intercept(
                &self.origin(),
                &self.direction(),
                shape,
                placement,
                self.settings.intercept.tolerance,
            );
            if hit.is_some() {
                return hit;
            }
        }
        if !(try_helix && self.settings.finder.helix) {
            return None;
        }
        let helix = self.trajectory.as_helix()?;
        stats.helix_searches += 1;
        find_helix_intercept(helix, self.end, shape, placement, &self.helix_search(max_xy))
    }

    /// Coarse phase on a parent volume: line first, then helix.
    pub fn coarse(&self, parent: &Element, helix_only: bool, max_xy: f64, stats: &mut SearchStats) -> Option<Intercept> {
        let volume = &parent.volume;
        let hit = self.intercept(&volume.shape, &volume.placement, !helix_only, true, max_xy, stats);
        if hit.is_none() {
            stats.coarse_misses += 1;
            tracing::debug!("no coarse intercept on {} from the {} end", parent.id, self.end);
        }
        hit
    }

    /// Fine phase on one element: the line first, and the helix only when the
    /// coarse phase needed it.
    pub fn fine(
        &self,
        shape: &Shape,
        placement: &Placement,
        coarse: &Intercept,
        helix_only: bool,
        max_xy: f64,
        stats: &mut SearchStats,
    ) -> Option<Intercept> {
        stats.elements_tested += 1;
        self.intercept(shape, placement, !helix_only, coarse.mode == Mode::Helix, max_xy, stats)
    }

    /// Builds a candidate when the intercept is within the transverse limit.
    pub fn accept(&self, category: Category, element: &Element, hit: Intercept, max_xy: f64) -> Option<VertexCandidate> {
        if hit.distance_xy > max_xy {
            tracing::trace!(
                "{} rejected: {:.1} mm beyond the {:.1} mm limit",
                element.id,
                hit.distance_xy,
                max_xy
            );
            return None;
        }
        Some(VertexCandidate {
            category,
            end: self.end,
            mode: hit.mode,
            id: element.id.clone(),
            placement: element.volume.placement,
            impact: hit.impact,
            distance: hit.distance,
            distance_xy: hit.distance_xy,
            tolerance: self.settings.intercept.tolerance,
            best: false,
            edge: false,
        })
    }
}

/// Coarse-then-fine search of a calorimeter wall, testing the inflated block
/// shape of the category.
pub(crate) fn search_wall(
    ctx: &SearchContext,
    category: Category,
    grid: &BlockGrid,
    helix_only: bool,
    stats: &mut SearchStats,
) -> Vec<VertexCandidate> {
    let limit = ctx.settings.max_calo_extrapolation.xy_length;
    let Some(shapes) = ctx.index.effective(category) else {
        return Vec::new();
    };
    let Some(coarse) = ctx.coarse(&grid.parent, helix_only, limit, stats) else {
        return Vec::new();
    };
    grid.select(&coarse.impact)
        .into_iter()
        .filter_map(|element| {
            let hit = ctx.fine(
                &shapes.inflated,
                &element.volume.placement,
                &coarse,
                helix_only,
                limit,
                stats,
            )?;
            ctx.accept(category, element, hit, limit)
        })
        .collect()
}
