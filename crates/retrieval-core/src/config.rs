//! Default constants and runtime configuration.
//!
//! The constants are the values used when nothing else is configured.
//! [`RetrievalConfig`] bundles them into a serde struct that can be loaded
//! from a TOML file and overridden through `RETRIEVAL_`-prefixed environment
//! variables.
//!
//! # Usage
//!
//! ```
//! use retrieval_core::config::{RetrievalConfig, DEFAULT_RRF_K};
//!
//! let config = RetrievalConfig::default();
//! assert_eq!(config.rrf_k, DEFAULT_RRF_K);
//! assert!(config.validate().is_ok());
//! ```

use crate::chunking::ChunkingStrategy;
use crate::error::RetrievalError;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

// =============================================================================
// Chunking
// =============================================================================

/// Default chunk size in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// Default overlap in characters between consecutive recursive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 200;

// =============================================================================
// Ranking
// =============================================================================

/// Damping constant for Reciprocal Rank Fusion.
///
/// Rank 1 contributes 1/61, rank 10 contributes 1/70. Large enough that a
/// chunk ranked first by both signals always beats one ranked first by only
/// one of them.
pub const DEFAULT_RRF_K: u32 = 60;

/// BM25 term-frequency saturation.
pub const DEFAULT_BM25_K1: f32 = 1.5;

/// BM25 length normalization (0 = none, 1 = full).
pub const DEFAULT_BM25_B: f32 = 0.75;

// =============================================================================
// Query
// =============================================================================

/// Upper bound on `n_results` accepted by a query.
pub const DEFAULT_MAX_RESULTS: usize = 50;

/// `n_results` used when the caller does not specify one.
pub const DEFAULT_N_RESULTS: usize = 5;

/// Number of fused candidates handed to the cross-encoder.
pub const DEFAULT_RERANK_POOL_SIZE: usize = 20;

/// Each index is asked for `n_results * DEFAULT_CANDIDATE_MULTIPLIER` candidates.
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 2;

/// Characters shown by [`Source::preview`](crate::search::Source::preview).
pub const PREVIEW_CHARS: usize = 150;

// =============================================================================
// External calls
// =============================================================================

/// Time budget for a single embedding call.
pub const DEFAULT_EMBEDDING_TIMEOUT_MS: u64 = 30_000;

/// Time budget for one cross-encoder batch.
pub const DEFAULT_RERANK_TIMEOUT_MS: u64 = 10_000;

/// BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bm25Params {
    /// Term-frequency saturation
    pub k1: f32,
    /// Length normalization
    pub b: f32,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: DEFAULT_BM25_K1,
            b: DEFAULT_BM25_B,
        }
    }
}

/// Chunking defaults applied when an ingestion request leaves them unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingDefaults {
    pub strategy: ChunkingStrategy,
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingDefaults {
    fn default() -> Self {
        Self {
            strategy: ChunkingStrategy::Recursive,
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

/// Runtime configuration for the retrieval core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub rrf_k: u32,
    pub bm25: Bm25Params,
    /// Cap on `n_results`
    pub max_results: usize,
    pub candidate_multiplier: usize,
    pub rerank_pool_size: usize,
    pub embedding_timeout_ms: u64,
    pub rerank_timeout_ms: u64,
    pub chunking: ChunkingDefaults,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: DEFAULT_RRF_K,
            bm25: Bm25Params::default(),
            max_results: DEFAULT_MAX_RESULTS,
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            rerank_pool_size: DEFAULT_RERANK_POOL_SIZE,
            embedding_timeout_ms: DEFAULT_EMBEDDING_TIMEOUT_MS,
            rerank_timeout_ms: DEFAULT_RERANK_TIMEOUT_MS,
            chunking: ChunkingDefaults::default(),
        }
    }
}

impl RetrievalConfig {
    /// Builds the layered figment: defaults, then the TOML file at `path`
    /// (if it exists), then `RETRIEVAL_*` environment variables.
    ///
    /// Nested keys use `__`, e.g. `RETRIEVAL_BM25__K1=1.2`.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(RetrievalConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed("RETRIEVAL_").split("__"))
    }

    /// Loads and validates the configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, RetrievalError> {
        Self::from_figment(Self::figment(path))
    }

    /// Extracts and validates a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, RetrievalError> {
        let config: RetrievalConfig = figment
            .extract()
            .map_err(|e| RetrievalError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), RetrievalError> {
        let invalid = |msg: String| Err(RetrievalError::InvalidConfig(msg));

        if self.max_results == 0 {
            return invalid("max_results must be positive".into());
        }
        if self.candidate_multiplier == 0 {
            return invalid("candidate_multiplier must be positive".into());
        }
        if self.rerank_pool_size == 0 {
            return invalid("rerank_pool_size must be positive".into());
        }
        if !self.bm25.k1.is_finite() || self.bm25.k1 < 0.0 {
            return invalid(format!("bm25.k1 must be a non-negative number, got {}", self.bm25.k1));
        }
        if !self.bm25.b.is_finite() || !(0.0..=1.0).contains(&self.bm25.b) {
            return invalid(format!("bm25.b must be within [0, 1], got {}", self.bm25.b));
        }
        if self.chunking.chunk_size == 0 {
            return invalid("chunking.chunk_size must be positive".into());
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return invalid(format!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap, self.chunking.chunk_size
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RetrievalConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.rrf_k, 60);
        assert_eq!(config.bm25.k1, 1.5);
        assert_eq!(config.bm25.b, 0.75);
        assert_eq!(config.chunking.strategy, ChunkingStrategy::Recursive);
    }

    #[test]
    fn test_toml_overrides_merge_over_defaults() {
        let figment = Figment::from(Serialized::defaults(RetrievalConfig::default())).merge(
            Toml::string(
                r#"
                rrf_k = 10
                max_results = 25

                [bm25]
                k1 = 1.2

                [chunking]
                strategy = "semantic"
                "#,
            ),
        );
        let config = RetrievalConfig::from_figment(figment).unwrap();

        assert_eq!(config.rrf_k, 10);
        assert_eq!(config.max_results, 25);
        assert_eq!(config.bm25.k1, 1.2);
        // untouched nested field keeps its default
        assert_eq!(config.bm25.b, DEFAULT_BM25_B);
        assert_eq!(config.chunking.strategy, ChunkingStrategy::Semantic);
        assert_eq!(config.chunking.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = RetrievalConfig::default();
        config.chunking.overlap = config.chunking.chunk_size;
        assert!(matches!(
            config.validate(),
            Err(RetrievalError::InvalidConfig(_))
        ));

        let mut config = RetrievalConfig::default();
        config.bm25.b = 1.5;
        assert!(config.validate().is_err());

        let mut config = RetrievalConfig::default();
        config.max_results = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = RetrievalConfig::load(None).unwrap();
        assert_eq!(config.rerank_pool_size, DEFAULT_RERANK_POOL_SIZE);
    }
}
