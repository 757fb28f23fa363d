//! Gamma-veto walls below (`z < 0`) and above (`z > 0`) the tracker.

use crate::extrapolation::SearchStats;
use crate::vertex::{Category, VertexCandidate};

use super::{search_wall, side_sign, SearchContext};

pub fn search(ctx: &SearchContext, stats: &mut SearchStats) -> Vec<VertexCandidate> {
    let helix_only = ctx.helix_only();
    let mut found = Vec::new();
    for wall in 0..2 {
        let Some(grid) = ctx.index.gveto(ctx.side, wall) else {
            continue;
        };
        if ctx.points_away(2, side_sign(wall)) {
            stats.pruned += 1;
            tracing::debug!("gveto wall {}.{} skipped: {} end points away", ctx.side, wall, ctx.end);
            continue;
        }
        found.extend(search_wall(ctx, Category::GammaVeto, grid, helix_only, stats));
    }
    found
}
