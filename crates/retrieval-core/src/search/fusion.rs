// Reciprocal Rank Fusion (RRF) algorithm

use super::types::ChunkId;
use crate::config::DEFAULT_RRF_K;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::Hash;

/// One fused item with the ranks each input list gave it.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedResult<T> {
    pub id: T,
    /// Sum of 1 / (k + rank) over the lists containing `id`
    pub score: f32,
    /// 1-based rank per input list, `None` where absent
    pub ranks: Vec<Option<usize>>,
}

impl<T> FusedResult<T> {
    /// Sum of the ranks this item actually received.
    pub fn rank_sum(&self) -> usize {
        self.ranks.iter().flatten().sum()
    }
}

/// Combine ranked lists using RRF
///
/// RRF Formula: RRF_score(d) = sum_{r} 1 / (k + rank_r(d))
///
/// Where:
/// - d is an item
/// - r is a ranked list
/// - rank_r(d) is the 1-based position of d in r (lists without d add nothing)
/// - k is the damping constant (typically 60)
///
/// Output holds every item of every list, sorted by score descending. Equal
/// scores are ordered by lower rank sum, then by first appearance scanning
/// the lists in order. If an item repeats within one list, its first
/// position counts.
pub fn reciprocal_rank_fusion<T: Clone + Eq + Hash>(
    lists: &[Vec<T>],
    k: u32,
) -> Vec<FusedResult<T>> {
    let k_param = k as f64;

    let mut first_seen: Vec<T> = Vec::new();
    let mut ranks: HashMap<T, Vec<Option<usize>>> = HashMap::new();
    for (list_idx, list) in lists.iter().enumerate() {
        for (pos, item) in list.iter().enumerate() {
            let slot = ranks.entry(item.clone()).or_insert_with(|| {
                first_seen.push(item.clone());
                vec![None; lists.len()]
            });
            if slot[list_idx].is_none() {
                slot[list_idx] = Some(pos + 1);
            }
        }
    }

    let mut fused: Vec<FusedResult<T>> = first_seen
        .into_iter()
        .map(|id| {
            let item_ranks = ranks.remove(&id).unwrap_or_default();
            let score: f64 = item_ranks
                .iter()
                .flatten()
                .map(|&rank| 1.0 / (k_param + rank as f64))
                .sum();
            FusedResult {
                id,
                score: score as f32,
                ranks: item_ranks,
            }
        })
        .collect();

    // stable sort: remaining ties keep first-appearance order
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.rank_sum().cmp(&b.rank_sum()))
    });
    fused
}

/// RRF over chunk-id lists with a fixed damping constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FusionRanker {
    k: u32,
}

impl FusionRanker {
    pub fn new(k: u32) -> Self {
        Self { k }
    }

    pub fn k(&self) -> u32 {
        self.k
    }

    /// Fuses the given ranked lists, e.g. `[vector_ids, keyword_ids]`.
    pub fn fuse(&self, lists: &[Vec<ChunkId>]) -> Vec<FusedResult<ChunkId>> {
        reciprocal_rank_fusion(lists, self.k)
    }
}

impl Default for FusionRanker {
    fn default() -> Self {
        Self::new(DEFAULT_RRF_K)
    }
}
