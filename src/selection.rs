//! Reduction of the raw candidates of one (end, category) pair.
//!
//! Calorimeter categories keep the candidate closest to the trajectory end,
//! flagged `best`, plus every candidate within the band of
//! [`SelectionPolicy::Band`] when that policy is chosen. The best candidate is
//! also flagged `edge` when its impact does not sit cleanly on one face of the
//! deflated block.
//!
//! Source categories are passed through untouched: several pads, strips or
//! calibration spots may be reported for the same end.

use itertools::Itertools;

use crate::index::EffectiveShapes;
use crate::settings::SelectionPolicy;
use crate::vertex::{Category, VertexCandidate};


/// Applies the selection policy of `category` to its raw candidates.
pub fn select(
    category: Category,
    candidates: Vec<VertexCandidate>,
    policy: SelectionPolicy,
    shapes: Option<&EffectiveShapes>,
    tolerance: f64,
) -> Vec<VertexCandidate> {
    if !category.is_calorimeter() {
        return candidates;
    }
    let Some(best) = candidates
        .iter()
        .position_min_by(|a, b| a.distance.total_cmp(&b.distance))
    else {
        return candidates;
    };
    let best_distance = candidates[best].distance;
    let edge = shapes.is_some_and(|shapes| {
        let candidate = &candidates[best];
        let local = candidate.placement.mother_to_child(&candidate.impact);
        shapes.deflated.classify_face(&local, tolerance).is_none()
    });
    if edge {
        tracing::debug!("best {} vertex on {} is at a block edge", category, candidates[best].id);
    }

    candidates
        .into_iter()
        .enumerate()
        .filter_map(|(i, mut candidate)| {
            if i == best {
                candidate.best = true;
                candidate.edge = edge;
                return Some(candidate);
            }
            match policy {
                SelectionPolicy::Best => None,
                SelectionPolicy::Band(band) => (candidate.distance - best_distance <= band).then_some(candidate),
            }
        })
        .collect()
}
