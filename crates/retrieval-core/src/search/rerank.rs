//! Cross-encoder reranking of the fused shortlist.
//!
//! Scoring is delegated to an injected [`CrossEncoderProvider`]. Any failure
//! (error, timeout, malformed scores) surfaces as
//! [`RetrievalError::RerankUnavailable`], which the pipeline treats as a
//! degradation rather than a query failure.

use super::types::ChunkId;
use crate::error::{RerankError, RetrievalError};
use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// Pairwise relevance model: scores each passage against the query jointly.
#[async_trait]
pub trait CrossEncoderProvider: Send + Sync {
    /// Returns one score per passage, higher is more relevant.
    async fn score_batch(&self, query: &str, passages: &[String]) -> Result<Vec<f32>, RerankError>;
}

/// Reorders the top fused candidates by cross-encoder score.
pub struct CrossEncoderReranker {
    provider: Arc<dyn CrossEncoderProvider>,
    pool_size: usize,
    timeout: Duration,
}

impl CrossEncoderReranker {
    pub fn new(provider: Arc<dyn CrossEncoderProvider>, pool_size: usize, timeout: Duration) -> Self {
        Self {
            provider,
            pool_size,
            timeout,
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Number of leading candidates scored when `n` results are requested.
    ///
    /// Never smaller than `n`, so a large request is not cut short by the pool.
    pub fn pool_for(&self, n: usize) -> usize {
        self.pool_size.max(n)
    }

    /// Scores the leading `pool_for(n)` candidates and returns the best `n`
    /// as (chunk id, cross-encoder score), descending.
    ///
    /// Equal scores keep the incoming (fused) order.
    ///
    /// # Errors
    ///
    /// `RetrievalError::RerankUnavailable` if the provider fails, exceeds the
    /// timeout, or returns the wrong number of scores or a non-finite score.
    #[instrument(skip_all, fields(candidates = candidates.len(), n = n))]
    pub async fn rerank(
        &self,
        query: &str,
        mut candidates: Vec<(ChunkId, String)>,
        n: usize,
    ) -> Result<Vec<(ChunkId, f32)>, RetrievalError> {
        candidates.truncate(self.pool_for(n));
        if candidates.is_empty() || n == 0 {
            return Ok(Vec::new());
        }

        let (ids, passages): (Vec<ChunkId>, Vec<String>) = candidates.into_iter().unzip();
        let scores = tokio::time::timeout(self.timeout, self.provider.score_batch(query, &passages))
            .await
            .map_err(|_| {
                RetrievalError::RerankUnavailable(format!(
                    "cross-encoder timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })??;

        if scores.len() != ids.len() {
            return Err(RerankError::ScoreCountMismatch {
                expected: ids.len(),
                actual: scores.len(),
            }
            .into());
        }
        if scores.iter().any(|s| !s.is_finite()) {
            return Err(RerankError::Unavailable("non-finite relevance score".to_string()).into());
        }

        let mut scored: Vec<(ChunkId, f32)> = ids.into_iter().zip(scores).collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(n);

        debug!("Reranked {} passages", scored.len());
        Ok(scored)
    }
}
