//! Query pipeline.
//!
//! A query moves through fixed stages:
//!
//! ```text
//! ReceivedQuery -> ModeDispatch -> [CandidateFusion] -> OptionalRerank -> ResultAssembly -> Done
//!                          any stage, fatal error -> Failed
//! ```
//!
//! `CandidateFusion` only runs in hybrid mode. In hybrid mode the vector and
//! keyword lookups run concurrently and are fused once both complete.
//! Reranking failures never fail the query: the fused order is kept and the
//! response is marked as not reranked.

use super::fusion::FusionRanker;
use super::rerank::{CrossEncoderProvider, CrossEncoderReranker};
use super::types::{Candidate, ChunkId, ChunkRecord, SearchMode, Source, SourceScores};
use crate::config::{RetrievalConfig, DEFAULT_N_RESULTS};
use crate::embedding::embed_with_timeout;
use crate::error::RetrievalError;
use crate::indexing::IndexManager;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Separator placed between sources by [`QueryResponse::context`].
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Pipeline states, recorded in order on every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    ReceivedQuery,
    ModeDispatch,
    CandidateFusion,
    OptionalRerank,
    ResultAssembly,
    Done,
    Failed,
}

/// A retrieval request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    pub query: String,
    pub mode: SearchMode,
    /// Maximum number of sources to return
    pub n_results: usize,
    /// Ask for cross-encoder reranking
    pub rerank: bool,
    /// Attach per-signal scores to each source
    pub include_scores: bool,
}

impl QueryRequest {
    /// Hybrid mode, 5 results, reranking on, scores included.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            mode: SearchMode::Hybrid,
            n_results: DEFAULT_N_RESULTS,
            rerank: true,
            include_scores: true,
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_n_results(mut self, n_results: usize) -> Self {
        self.n_results = n_results;
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = rerank;
        self
    }

    pub fn with_scores(mut self, include_scores: bool) -> Self {
        self.include_scores = include_scores;
        self
    }
}

/// Result of a successful query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResponse {
    /// At most `n_results` sources, best first
    pub sources: Vec<Source>,
    /// Whether the final order came from the cross-encoder
    pub reranked: bool,
    pub total_results: usize,
    pub mode: SearchMode,
    /// Non-fatal problems (rerank fallback, index inconsistency)
    pub warnings: Vec<RetrievalError>,
    pub stages: Vec<PipelineStage>,
}

impl QueryResponse {
    /// Source texts joined for an answer-generation prompt.
    pub fn context(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR)
    }
}

#[derive(Default)]
struct StageLog(Vec<PipelineStage>);

impl StageLog {
    fn enter(&mut self, stage: PipelineStage) {
        debug!(?stage, "Pipeline stage");
        self.0.push(stage);
    }

    fn current(&self) -> Option<PipelineStage> {
        self.0.last().copied()
    }
}

/// A candidate in the working order, with every score collected so far.
#[derive(Debug, Clone, Copy)]
struct Ranked {
    chunk_id: ChunkId,
    vector: Option<f32>,
    bm25: Option<f32>,
    rrf: Option<f32>,
    cross_encoder: Option<f32>,
}

impl Ranked {
    fn new(chunk_id: ChunkId) -> Self {
        Self {
            chunk_id,
            vector: None,
            bm25: None,
            rrf: None,
            cross_encoder: None,
        }
    }

    fn scores(&self) -> SourceScores {
        SourceScores {
            vector_similarity: self.vector,
            bm25: self.bm25,
            rrf: self.rrf,
            cross_encoder: self.cross_encoder,
        }
    }
}

/// Drops candidates the other index does not hold yet and renumbers ranks.
fn visible(candidates: Vec<Candidate>, in_other: impl Fn(ChunkId) -> bool) -> Vec<Candidate> {
    candidates
        .into_iter()
        .filter(|c| in_other(c.chunk_id))
        .enumerate()
        .map(|(i, c)| Candidate { rank: i + 1, ..c })
        .collect()
}

/// Orchestrates a query over the indices held by an [`IndexManager`].
pub struct RetrievalPipeline {
    manager: Arc<IndexManager>,
    reranker: Option<CrossEncoderReranker>,
    fusion: FusionRanker,
    config: RetrievalConfig,
}

impl RetrievalPipeline {
    pub fn new(
        manager: Arc<IndexManager>,
        cross_encoder: Option<Arc<dyn CrossEncoderProvider>>,
        config: RetrievalConfig,
    ) -> Self {
        let reranker = cross_encoder.map(|provider| {
            CrossEncoderReranker::new(
                provider,
                config.rerank_pool_size,
                Duration::from_millis(config.rerank_timeout_ms),
            )
        });
        Self {
            manager,
            reranker,
            fusion: FusionRanker::new(config.rrf_k),
            config,
        }
    }

    /// Runs a query end to end.
    ///
    /// # Errors
    ///
    /// - `InvalidConfig` for an empty query or `n_results` outside `1..=max_results`
    /// - `EmbeddingUnavailable` / `Timeout` / `DimensionMismatch` when the
    ///   query embedding fails in vector or hybrid mode
    /// - `Storage` when chunks cannot be read back
    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResponse, RetrievalError> {
        self.query_traced(request).await.1
    }

    /// Runs a query and also returns every stage it entered.
    ///
    /// On success the trail equals [`QueryResponse::stages`]. On a fatal
    /// error it ends with [`PipelineStage::Failed`], right after the stage
    /// that failed.
    #[instrument(skip_all, fields(mode = %request.mode, n_results = request.n_results, rerank = request.rerank))]
    pub async fn query_traced(
        &self,
        request: &QueryRequest,
    ) -> (Vec<PipelineStage>, Result<QueryResponse, RetrievalError>) {
        let mut stages = StageLog::default();
        let result = self.run(request, &mut stages).await;
        if let Err(err) = &result {
            warn!("Query failed during {:?}: {}", stages.current(), err);
            stages.enter(PipelineStage::Failed);
        }
        (stages.0, result)
    }

    fn validate(&self, request: &QueryRequest) -> Result<(), RetrievalError> {
        if request.query.trim().is_empty() {
            return Err(RetrievalError::InvalidConfig(
                "query must not be empty".to_string(),
            ));
        }
        if request.n_results == 0 || request.n_results > self.config.max_results {
            return Err(RetrievalError::InvalidConfig(format!(
                "n_results must be between 1 and {}, got {}",
                self.config.max_results, request.n_results
            )));
        }
        Ok(())
    }

    async fn run(
        &self,
        request: &QueryRequest,
        stages: &mut StageLog,
    ) -> Result<QueryResponse, RetrievalError> {
        stages.enter(PipelineStage::ReceivedQuery);
        self.validate(request)?;
        let n = request.n_results;

        stages.enter(PipelineStage::ModeDispatch);
        let mut candidate_k = n * self.config.candidate_multiplier;
        if let (true, Some(reranker)) = (request.rerank, &self.reranker) {
            candidate_k = candidate_k.max(reranker.pool_for(n));
        }
        let (vector, keyword) = self.dispatch(request.mode, &request.query, candidate_k).await?;
        debug!(
            vector = vector.len(),
            keyword = keyword.len(),
            "Collected candidates"
        );

        let mut ranked = match request.mode {
            SearchMode::Hybrid => {
                stages.enter(PipelineStage::CandidateFusion);
                self.fuse(&vector, &keyword)
            }
            SearchMode::Vector => vector
                .iter()
                .map(|c| Ranked {
                    vector: Some(c.score),
                    ..Ranked::new(c.chunk_id)
                })
                .collect(),
            SearchMode::Keyword => keyword
                .iter()
                .map(|c| Ranked {
                    bm25: Some(c.score),
                    ..Ranked::new(c.chunk_id)
                })
                .collect(),
        };

        stages.enter(PipelineStage::OptionalRerank);
        let mut warnings = Vec::new();
        let mut reranked = false;
        if request.rerank {
            match &self.reranker {
                None => {
                    let warning =
                        RetrievalError::RerankUnavailable("no cross-encoder configured".to_string());
                    warn!("{}", warning);
                    warnings.push(warning);
                }
                Some(reranker) if !ranked.is_empty() => {
                    let pool: Vec<ChunkId> = ranked
                        .iter()
                        .take(reranker.pool_for(n))
                        .map(|r| r.chunk_id)
                        .collect();
                    let passages = self
                        .manager
                        .store()
                        .get_chunks_batch(&pool)
                        .await?
                        .into_iter()
                        .map(|c| (c.id, c.text))
                        .collect();

                    match reranker.rerank(&request.query, passages, n).await {
                        Ok(scored) => {
                            ranked = apply_rerank(&ranked, &scored);
                            reranked = true;
                        }
                        Err(err) => {
                            warn!("Rerank failed, keeping fused order: {}", err);
                            warnings.push(err);
                        }
                    }
                }
                Some(_) => {}
            }
        }

        stages.enter(PipelineStage::ResultAssembly);
        ranked.truncate(n);
        let sources = self.assemble(&ranked, request.include_scores).await?;

        match self.manager.consistency_report().await {
            Ok(report) => {
                if let Some(warning) = report.to_warning() {
                    warn!("{}", warning);
                    warnings.push(warning);
                }
            }
            Err(err) => warn!("Skipping consistency check: {}", err),
        }

        stages.enter(PipelineStage::Done);
        Ok(QueryResponse {
            total_results: sources.len(),
            sources,
            reranked,
            mode: request.mode,
            warnings,
            stages: stages.0.clone(),
        })
    }

    async fn dispatch(
        &self,
        mode: SearchMode,
        query: &str,
        k: usize,
    ) -> Result<(Vec<Candidate>, Vec<Candidate>), RetrievalError> {
        match mode {
            SearchMode::Vector => Ok((self.vector_candidates(query, k).await?, Vec::new())),
            SearchMode::Keyword => Ok((Vec::new(), self.keyword_candidates(query, k)?)),
            SearchMode::Hybrid => {
                let (vector, keyword) = tokio::join!(self.vector_candidates(query, k), async {
                    self.keyword_candidates(query, k)
                });
                Ok((vector?, keyword?))
            }
        }
    }

    async fn vector_candidates(&self, query: &str, k: usize) -> Result<Vec<Candidate>, RetrievalError> {
        let timeout = Duration::from_millis(self.config.embedding_timeout_ms);
        let embedding = embed_with_timeout(self.manager.embedder().as_ref(), query, timeout).await?;
        let raw = self.manager.vector().query(&embedding, k)?;
        let keyword = self.manager.keyword();
        Ok(visible(raw, |id| keyword.contains(id)))
    }

    fn keyword_candidates(&self, query: &str, k: usize) -> Result<Vec<Candidate>, RetrievalError> {
        let raw = self.manager.keyword().query(query, k)?;
        let vector = self.manager.vector();
        Ok(visible(raw, |id| vector.contains(id)))
    }

    fn fuse(&self, vector: &[Candidate], keyword: &[Candidate]) -> Vec<Ranked> {
        let vector_scores: HashMap<ChunkId, f32> =
            vector.iter().map(|c| (c.chunk_id, c.score)).collect();
        let keyword_scores: HashMap<ChunkId, f32> =
            keyword.iter().map(|c| (c.chunk_id, c.score)).collect();
        let lists: [Vec<ChunkId>; 2] = [
            vector.iter().map(|c| c.chunk_id).collect(),
            keyword.iter().map(|c| c.chunk_id).collect(),
        ];

        self.fusion
            .fuse(&lists)
            .into_iter()
            .map(|fused| Ranked {
                vector: vector_scores.get(&fused.id).copied(),
                bm25: keyword_scores.get(&fused.id).copied(),
                rrf: Some(fused.score),
                ..Ranked::new(fused.id)
            })
            .collect()
    }

    async fn assemble(
        &self,
        ranked: &[Ranked],
        include_scores: bool,
    ) -> Result<Vec<Source>, RetrievalError> {
        let ids: Vec<ChunkId> = ranked.iter().map(|r| r.chunk_id).collect();
        let mut chunks: HashMap<ChunkId, ChunkRecord> = self
            .manager
            .store()
            .get_chunks_batch(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut sources = Vec::with_capacity(ranked.len());
        for entry in ranked {
            let Some(chunk) = chunks.remove(&entry.chunk_id) else {
                warn!("{} is indexed but missing from the store, skipping", entry.chunk_id);
                continue;
            };
            sources.push(Source {
                chunk_id: chunk.id,
                document_id: chunk.document_id,
                rank: sources.len() + 1,
                text: chunk.text,
                metadata: chunk.metadata,
                scores: include_scores.then(|| entry.scores()),
            });
        }
        Ok(sources)
    }
}

/// New working order following the cross-encoder scores.
fn apply_rerank(ranked: &[Ranked], scored: &[(ChunkId, f32)]) -> Vec<Ranked> {
    let by_id: HashMap<ChunkId, Ranked> = ranked.iter().map(|r| (r.chunk_id, *r)).collect();
    scored
        .iter()
        .map(|(id, score)| {
            let base = by_id.get(id).copied().unwrap_or_else(|| Ranked::new(*id));
            Ranked {
                cross_encoder: Some(*score),
                ..base
            }
        })
        .collect()
}
