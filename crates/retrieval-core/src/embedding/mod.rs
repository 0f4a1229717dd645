//! Embedding provider capability.
//!
//! Model inference is external to the retrieval core. Hosts inject an
//! [`EmbeddingProvider`]; tests use deterministic stand-ins.

use crate::error::{EmbeddingError, RetrievalError};
use async_trait::async_trait;
use std::time::Duration;

/// Turns text into a fixed-dimension vector.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; ingestion and concurrent queries
/// share one provider.
///
/// # Examples
///
/// ```ignore
/// let embedder: Arc<dyn EmbeddingProvider> = Arc::new(RemoteEmbedder::new(url));
///
/// let embedding = embedder.embed("what is reciprocal rank fusion?").await?;
/// assert_eq!(embedding.len(), embedder.dimension());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Returns the embedding dimension (vector size).
    ///
    /// Fixed for the lifetime of a collection.
    fn dimension(&self) -> usize;

    /// Embeds one piece of text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Calls the provider with a time budget and checks the returned dimension.
///
/// # Errors
///
/// - `RetrievalError::EmbeddingUnavailable` if the provider fails
/// - `RetrievalError::Timeout` if it takes longer than `timeout`
/// - `RetrievalError::DimensionMismatch` if the vector has the wrong size
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>, RetrievalError> {
    let embedding = tokio::time::timeout(timeout, provider.embed(text))
        .await
        .map_err(|_| RetrievalError::Timeout {
            operation: "embedding".to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })??;

    if embedding.len() != provider.dimension() {
        return Err(RetrievalError::DimensionMismatch {
            expected: provider.dimension(),
            actual: embedding.len(),
        });
    }
    Ok(embedding)
}
