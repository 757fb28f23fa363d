//! Source frame: strips, pads, deformed pad-bulks and the gaps between strips.
//!
//! Strip intercepts are resolved down the hierarchy:
//! - a strip without pads is itself the foil vertex,
//! - a strip whose pads are all missed is a gap,
//! - a pad is the foil vertex unless the frame is deformed, in which case one
//!   of its pad-bulks must be hit, otherwise the pad is a gap.

use crate::extrapolation::SearchStats;
use crate::index::{Element, SourceIndex};
use crate::intercept::Intercept;
use crate::vertex::{Category, VertexCandidate};

use super::{side_sign, SearchContext};

/// The source frame as intercepted from one trajectory end. Computed once per
/// end and shared by the foil, gap and calibration searches.
#[derive(Debug, Clone, Copy)]
pub struct SourceHit<'i> {
    pub index: &'i SourceIndex,
    pub coarse: Intercept,
}

/// Pruning and coarse phase of the source categories.
pub fn coarse<'i>(ctx: &SearchContext<'i>, stats: &mut SearchStats) -> Option<SourceHit<'i>> {
    let index = ctx.index.source()?;
    // the foil lies on the other side of the tracker side
    if ctx.points_away(0, -side_sign(ctx.side)) {
        stats.pruned += 1;
        tracing::debug!("source skipped: {} end points away from the foil", ctx.end);
        return None;
    }
    let limit = ctx.settings.max_source_extrapolation.xy_length;
    let coarse = ctx.coarse(&index.submodule, false, limit, stats)?;
    Some(SourceHit { index, coarse })
}

pub fn search_foil(ctx: &SearchContext, hit: &SourceHit, stats: &mut SearchStats) -> Vec<VertexCandidate> {
    let SourceHit { index: source, coarse } = hit;
    let Some(strips) = source.strips.as_ref() else {
        return Vec::new();
    };
    let limit = ctx.settings.max_source_extrapolation.xy_length;
    let mut found = Vec::new();
    for strip in strips.select(&coarse.impact) {
        let Some(hit) = ctx.fine(&strip.volume.shape, &strip.volume.placement, coarse, false, limit, stats) else {
            continue;
        };
        let Some(candidate) = ctx.accept(Category::SourceFoil, strip, hit, limit) else {
            continue;
        };
        found.extend(resolve_strip(ctx, source, strip, candidate, coarse, stats));
    }
    found
}

fn resolve_strip(
    ctx: &SearchContext,
    source: &SourceIndex,
    strip: &Element,
    mut candidate: VertexCandidate,
    coarse: &Intercept,
    stats: &mut SearchStats,
) -> Vec<VertexCandidate> {
    let pads = strip
        .id
        .get(1)
        .and_then(|number| source.pads.get(&number))
        .filter(|pads| !pads.is_empty());
    let Some(pads) = pads else {
        return vec![candidate];
    };

    let limit = ctx.settings.max_source_extrapolation.xy_length;
    let mut found = Vec::new();
    for pad in pads {
        let Some(hit) = ctx.fine(&pad.volume.shape, &pad.volume.placement, coarse, false, limit, stats) else {
            continue;
        };
        if let Some(pad_candidate) = ctx.accept(Category::SourceFoil, pad, hit, limit) {
            found.extend(resolve_pad(ctx, source, pad, pad_candidate, coarse, stats));
        }
    }
    if found.is_empty() {
        tracing::debug!("{} crossed between its pads", strip.id);
        candidate.category = Category::SourceGap;
        found.push(candidate);
    }
    found
}

fn resolve_pad(
    ctx: &SearchContext,
    source: &SourceIndex,
    pad: &Element,
    mut candidate: VertexCandidate,
    coarse: &Intercept,
    stats: &mut SearchStats,
) -> Vec<VertexCandidate> {
    if !source.deformed {
        return vec![candidate];
    }
    let bulks: &[Element] = match (pad.id.get(1), pad.id.get(2)) {
        (Some(strip), Some(number)) => source.pad_bulks(strip, number),
        _ => &[],
    };
    let limit = ctx.settings.max_source_extrapolation.xy_length;
    let found: Vec<_> = bulks
        .iter()
        .filter_map(|bulk| {
            let hit = ctx.fine(&bulk.volume.shape, &bulk.volume.placement, coarse, false, limit, stats)?;
            ctx.accept(Category::SourceFoil, bulk, hit, limit)
        })
        .collect();
    if found.is_empty() {
        tracing::debug!("{} has no pad-bulk at the impact", pad.id);
        candidate.category = Category::SourceGap;
        return vec![candidate];
    }
    found
}

/// Explicit gap volumes between strips.
pub fn search_gaps(ctx: &SearchContext, hit: &SourceHit, stats: &mut SearchStats) -> Vec<VertexCandidate> {
    let Some(gaps) = hit.index.gaps.as_ref() else {
        return Vec::new();
    };
    let limit = ctx.settings.max_source_extrapolation.xy_length;
    gaps.select(&hit.coarse.impact)
        .into_iter()
        .filter_map(|gap| {
            let found = ctx.fine(&gap.volume.shape, &gap.volume.placement, &hit.coarse, false, limit, stats)?;
            ctx.accept(Category::SourceGap, gap, found, limit)
        })
        .collect()
}
