//! X-calorimeter walls at both ends of the foil (`y < 0` and `y > 0`).
//! Helices are always followed exactly: they bend noticeably across these walls.

use crate::extrapolation::SearchStats;
use crate::vertex::{Category, VertexCandidate};

use super::{search_wall, side_sign, SearchContext};

pub fn search(ctx: &SearchContext, stats: &mut SearchStats) -> Vec<VertexCandidate> {
    let helix_only = ctx.helix_only();
    let mut found = Vec::new();
    for wall in 0..2 {
        let Some(grid) = ctx.index.xcalo(ctx.side, wall) else {
            continue;
        };
        if ctx.points_away(1, side_sign(wall)) {
            stats.pruned += 1;
            tracing::debug!("xcalo wall {}.{} skipped: {} end points away", ctx.side, wall, ctx.end);
            continue;
        }
        found.extend(search_wall(ctx, Category::XCalorimeter, grid, helix_only, stats));
    }
    found
}
