//! Relative-score fusion of the two hybrid legs.
//!
//! Each leg's scores are min-max normalized into [0, 1], then combined as
//! `alpha * dense + (1 - alpha) * keyword`. A document absent from a leg
//! contributes 0 from that leg. Chosen over rank fusion because `alpha`
//! weights it continuously and it degenerates cleanly at 0 and 1.

use std::collections::HashMap;

use vellum_core::types::ChunkId;

pub(crate) fn fuse(
    dense: &[(ChunkId, f32)],
    keyword: &[(ChunkId, f32)],
    alpha: f32,
    limit: usize,
) -> Vec<(ChunkId, f32)> {
    let dense_norm = min_max_normalize(dense);
    let keyword_norm = min_max_normalize(keyword);

    let mut blended: HashMap<ChunkId, f32> = HashMap::new();
    for (id, s) in &dense_norm {
        *blended.entry(*id).or_default() += alpha * s;
    }
    for (id, s) in &keyword_norm {
        *blended.entry(*id).or_default() += (1.0 - alpha) * s;
    }

    let mut out: Vec<(ChunkId, f32)> = blended.into_iter().collect();
    out.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.0.cmp(&b.0.0))
    });
    out.truncate(limit);
    out
}

fn min_max_normalize(leg: &[(ChunkId, f32)]) -> Vec<(ChunkId, f32)> {
    if leg.is_empty() {
        return Vec::new();
    }
    let max = leg.iter().map(|(_, s)| *s).fold(f32::MIN, f32::max);
    let min = leg.iter().map(|(_, s)| *s).fold(f32::MAX, f32::min);
    let range = max - min;
    leg.iter()
        .map(|(id, s)| {
            let norm = if range > f32::EPSILON {
                (s - min) / range
            } else {
                1.0
            };
            (*id, norm)
        })
        .collect()
}
