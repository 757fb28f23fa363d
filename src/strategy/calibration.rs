//! Calibration spots mounted on the source frame.

use crate::extrapolation::SearchStats;
use crate::vertex::{Category, VertexCandidate};

use super::source::SourceHit;
use super::SearchContext;

pub fn search(ctx: &SearchContext, hit: &SourceHit, stats: &mut SearchStats) -> Vec<VertexCandidate> {
    let Some(spots) = hit.index.calibration.as_ref() else {
        return Vec::new();
    };
    let limit = ctx.settings.max_source_extrapolation.xy_length;
    spots
        .select(&hit.coarse.impact)
        .into_iter()
        .filter_map(|spot| {
            let found = ctx.fine(&spot.volume.shape, &spot.volume.placement, &hit.coarse, false, limit, stats)?;
            ctx.accept(Category::CalibrationSource, spot, found, limit)
        })
        .collect()
}
