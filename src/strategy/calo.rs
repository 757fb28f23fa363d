//! Main calorimeter walls, one per tracker side.

use crate::extrapolation::SearchStats;
use crate::vertex::{Category, VertexCandidate};

use super::{search_wall, side_sign, SearchContext};

pub fn search(ctx: &SearchContext, stats: &mut SearchStats) -> Vec<VertexCandidate> {
    let Some(grid) = ctx.index.calo(ctx.side) else {
        return Vec::new();
    };
    if ctx.points_away(0, side_sign(ctx.side)) {
        stats.pruned += 1;
        tracing::debug!("calorimeter wall {} skipped: {} end points away", ctx.side, ctx.end);
        return Vec::new();
    }
    search_wall(ctx, Category::MainCalorimeter, grid, false, stats)
}
