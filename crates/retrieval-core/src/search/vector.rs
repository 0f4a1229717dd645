//! Dense vector index with exact cosine similarity.
//!
//! Every query scans all entries. Results are exact, upserts replace in place
//! and ties break deterministically by chunk id.

use super::types::{Candidate, ChunkId, Metadata};
use crate::error::RetrievalError;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::RwLock;
use tracing::instrument;

struct VectorEntry {
    embedding: Vec<f32>,
    norm: f32,
    metadata: Metadata,
}

impl VectorEntry {
    fn new(embedding: Vec<f32>, metadata: Metadata) -> Self {
        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        Self {
            embedding,
            norm,
            metadata,
        }
    }
}

/// Cosine similarity given precomputed norms. Zero vectors score 0.
fn cosine(a: &[f32], norm_a: f32, b: &[f32], norm_b: f32) -> f32 {
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(&x, &y)| x * y).sum();
    dot / (norm_a * norm_b)
}

fn poisoned<T>(_: T) -> RetrievalError {
    RetrievalError::Storage("vector index lock poisoned".to_string())
}

/// Chunk embeddings keyed by chunk id.
///
/// # Thread Safety
///
/// Entries sit behind an `RwLock`. Queries share the read lock, upserts take
/// the write lock only for the map insert, so upserts of distinct chunks
/// never wait on each other for longer than one insert.
pub struct VectorIndex {
    dimension: usize,
    entries: RwLock<BTreeMap<ChunkId, VectorEntry>>,
}

impl VectorIndex {
    /// Creates an empty index for embeddings of `dimension` values.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, actual: usize) -> Result<(), RetrievalError> {
        if actual != self.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.dimension,
                actual,
            });
        }
        Ok(())
    }

    /// Inserts or replaces the entry for `chunk_id`.
    ///
    /// # Errors
    ///
    /// `RetrievalError::DimensionMismatch` if the embedding has the wrong size.
    pub fn upsert(
        &self,
        chunk_id: ChunkId,
        embedding: Vec<f32>,
        metadata: Metadata,
    ) -> Result<(), RetrievalError> {
        self.check_dimension(embedding.len())?;
        let entry = VectorEntry::new(embedding, metadata);
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(chunk_id, entry);
        Ok(())
    }

    /// Replaces the whole index with `entries`.
    ///
    /// The new map is built before the write lock is taken, so concurrent
    /// queries see either the old or the new contents.
    pub fn replace_all(
        &self,
        entries: Vec<(ChunkId, Vec<f32>, Metadata)>,
    ) -> Result<usize, RetrievalError> {
        let mut fresh = BTreeMap::new();
        for (chunk_id, embedding, metadata) in entries {
            self.check_dimension(embedding.len())?;
            fresh.insert(chunk_id, VectorEntry::new(embedding, metadata));
        }
        let count = fresh.len();
        *self.entries.write().map_err(poisoned)? = fresh;
        Ok(count)
    }

    /// Returns up to `k` candidates ordered by cosine similarity, descending.
    ///
    /// Equal similarities keep chunk id order.
    #[instrument(skip_all, fields(k = k))]
    pub fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<Candidate>, RetrievalError> {
        self.check_dimension(embedding.len())?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        let entries = self.entries.read().map_err(poisoned)?;
        let mut scored: Vec<(ChunkId, f32)> = entries
            .iter()
            .map(|(id, entry)| {
                (
                    *id,
                    cosine(embedding, query_norm, &entry.embedding, entry.norm),
                )
            })
            .collect();
        drop(entries);

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(i, (chunk_id, score))| Candidate {
                chunk_id,
                rank: i + 1,
                score,
            })
            .collect())
    }

    pub fn contains(&self, chunk_id: ChunkId) -> bool {
        self.entries
            .read()
            .map(|entries| entries.contains_key(&chunk_id))
            .unwrap_or(false)
    }

    /// Metadata copy stored alongside the embedding.
    pub fn metadata(&self, chunk_id: ChunkId) -> Option<Metadata> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(&chunk_id).map(|e| e.metadata.clone()))
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|entries| entries.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(candidates: &[Candidate]) -> Vec<u64> {
        candidates.iter().map(|c| c.chunk_id.as_u64()).collect()
    }

    #[test]
    fn test_query_orders_by_similarity() {
        let index = VectorIndex::new(2);
        index
            .upsert(ChunkId::from_u64(1), vec![1.0, 0.0], Metadata::new())
            .unwrap();
        index
            .upsert(ChunkId::from_u64(2), vec![0.0, 1.0], Metadata::new())
            .unwrap();
        index
            .upsert(ChunkId::from_u64(3), vec![1.0, 1.0], Metadata::new())
            .unwrap();

        let results = index.query(&[1.0, 0.1], 3).unwrap();
        assert_eq!(ids(&results), vec![1, 3, 2]);
        assert_eq!(
            results.iter().map(|c| c.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert!(results[0].score > results[1].score);
    }

    #[test]
    fn test_ties_break_by_chunk_id() {
        let index = VectorIndex::new(2);
        for id in [5, 2, 9] {
            index
                .upsert(ChunkId::from_u64(id), vec![2.0, 0.0], Metadata::new())
                .unwrap();
        }
        let results = index.query(&[1.0, 0.0], 2).unwrap();
        assert_eq!(ids(&results), vec![2, 5]);
    }

    #[test]
    fn test_upsert_replaces_entry() {
        let index = VectorIndex::new(2);
        let id = ChunkId::from_u64(1);
        index.upsert(id, vec![1.0, 0.0], Metadata::new()).unwrap();

        let mut metadata = Metadata::new();
        metadata.insert("source".to_string(), "updated".to_string());
        index.upsert(id, vec![0.0, 1.0], metadata).unwrap();

        assert_eq!(index.len(), 1);
        let results = index.query(&[0.0, 1.0], 1).unwrap();
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(index.metadata(id).unwrap()["source"], "updated");
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let index = VectorIndex::new(3);
        let err = index
            .upsert(ChunkId::from_u64(1), vec![1.0, 2.0], Metadata::new())
            .unwrap_err();
        assert_eq!(
            err,
            RetrievalError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert!(index.query(&[1.0], 5).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn test_zero_vector_scores_zero() {
        let index = VectorIndex::new(2);
        index
            .upsert(ChunkId::from_u64(1), vec![0.0, 0.0], Metadata::new())
            .unwrap();
        let results = index.query(&[1.0, 0.0], 1).unwrap();
        assert_eq!(results[0].score, 0.0);
    }

    #[test]
    fn test_replace_all_swaps_contents() {
        let index = VectorIndex::new(1);
        index
            .upsert(ChunkId::from_u64(1), vec![1.0], Metadata::new())
            .unwrap();
        let count = index
            .replace_all(vec![
                (ChunkId::from_u64(7), vec![1.0], Metadata::new()),
                (ChunkId::from_u64(8), vec![-1.0], Metadata::new()),
            ])
            .unwrap();
        assert_eq!(count, 2);
        assert!(!index.contains(ChunkId::from_u64(1)));
        assert!(index.contains(ChunkId::from_u64(7)));
        assert_eq!(index.query(&[1.0], 0).unwrap().len(), 0);
    }
}
