//! BM25 keyword index.
//!
//! Postings and corpus statistics are kept in memory and derived entirely
//! from the chunk store: [`KeywordIndex::rebuild`] recomputes them from
//! scratch, which is how drift after a partial ingestion is repaired.
//!
//! # Algorithm
//!
//! Each chunk matching at least one query term scores
//!
//! ```text
//! sum over query terms t in chunk:
//!     idf(t) * tf * (k1 + 1) / (tf + k1 * (1 - b + b * chunk_len / avg_len))
//!
//! idf(t) = ln(1 + (N - df + 0.5) / (df + 0.5))
//! ```
//!
//! The `ln(1 + ..)` form keeps idf positive for terms present in more than
//! half the corpus.
//!
//! # Usage
//!
//! ```ignore
//! use retrieval_core::search::keyword::KeywordIndex;
//!
//! let index = KeywordIndex::new(Bm25Params::default());
//! index.add(&chunk).await?;
//!
//! // (chunk id, rank, BM25 score) triples
//! let results = index.query("rust borrow checker", 10)?;
//! ```

use super::types::{Candidate, ChunkId, ChunkRecord};
use crate::config::Bm25Params;
use crate::error::RetrievalError;
use crate::storage::ChunkStore;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;
use tokio::sync::Mutex;
use tracing::{info, instrument};

/// Splits text into lowercase alphanumeric terms.
///
/// Everything that is not alphanumeric separates terms, so punctuation is
/// stripped. Used for both chunks and queries.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

struct ChunkStats {
    /// Token count
    length: usize,
    /// Distinct terms, for removing postings on upsert
    terms: Vec<String>,
}

#[derive(Default)]
struct Bm25State {
    chunks: HashMap<ChunkId, ChunkStats>,
    /// term -> (chunk -> term frequency)
    postings: HashMap<String, BTreeMap<ChunkId, u32>>,
    total_length: usize,
}

impl Bm25State {
    fn insert(&mut self, chunk_id: ChunkId, text: &str) {
        self.remove(chunk_id);

        let tokens = tokenize(text);
        let length = tokens.len();
        let mut frequencies: HashMap<String, u32> = HashMap::new();
        for token in tokens {
            *frequencies.entry(token).or_insert(0) += 1;
        }

        for (term, tf) in &frequencies {
            self.postings
                .entry(term.clone())
                .or_default()
                .insert(chunk_id, *tf);
        }
        self.total_length += length;
        self.chunks.insert(
            chunk_id,
            ChunkStats {
                length,
                terms: frequencies.into_keys().collect(),
            },
        );
    }

    fn remove(&mut self, chunk_id: ChunkId) {
        let Some(stats) = self.chunks.remove(&chunk_id) else {
            return;
        };
        self.total_length -= stats.length;
        for term in stats.terms {
            if let Some(postings) = self.postings.get_mut(&term) {
                postings.remove(&chunk_id);
                if postings.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
    }

    fn score(&self, query: &str, k: usize, params: Bm25Params) -> Vec<Candidate> {
        let n = self.chunks.len();
        if n == 0 || k == 0 || self.total_length == 0 {
            return Vec::new();
        }
        let avg_len = self.total_length as f32 / n as f32;

        let mut seen = HashSet::new();
        let terms: Vec<String> = tokenize(query)
            .into_iter()
            .filter(|t| seen.insert(t.clone()))
            .collect();

        let mut scores: BTreeMap<ChunkId, f32> = BTreeMap::new();
        for term in &terms {
            let Some(postings) = self.postings.get(term) else {
                continue;
            };
            let df = postings.len() as f32;
            let idf = (1.0 + (n as f32 - df + 0.5) / (df + 0.5)).ln();

            for (chunk_id, &tf) in postings {
                let len = self.chunks.get(chunk_id).map_or(0, |s| s.length) as f32;
                let tf = tf as f32;
                let norm = params.k1 * (1.0 - params.b + params.b * len / avg_len);
                *scores.entry(*chunk_id).or_insert(0.0) +=
                    idf * (tf * (params.k1 + 1.0)) / (tf + norm);
            }
        }

        let mut ranked: Vec<(ChunkId, f32)> =
            scores.into_iter().filter(|(_, s)| *s > 0.0).collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
            .into_iter()
            .enumerate()
            .map(|(i, (chunk_id, score))| Candidate {
                chunk_id,
                rank: i + 1,
                score,
            })
            .collect()
    }
}

fn poisoned<T>(_: T) -> RetrievalError {
    RetrievalError::Storage("keyword index lock poisoned".to_string())
}

/// BM25 inverted index over chunk text.
///
/// # Thread Safety
///
/// Queries take a read lock on the postings. All mutations (`add`,
/// `add_batch`, `rebuild`) are additionally serialized through an async
/// mutex because BM25 statistics (N, average length, df) are shared by every
/// chunk. Adds are upserts, so re-adding a chunk a rebuild already picked up
/// changes nothing.
pub struct KeywordIndex {
    params: Bm25Params,
    state: RwLock<Bm25State>,
    writer: Mutex<()>,
    #[cfg(test)]
    reject_writes: std::sync::atomic::AtomicBool,
}

impl KeywordIndex {
    pub fn new(params: Bm25Params) -> Self {
        Self {
            params,
            state: RwLock::new(Bm25State::default()),
            writer: Mutex::new(()),
            #[cfg(test)]
            reject_writes: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Makes `add` and `add_batch` fail until switched back. `rebuild` is
    /// unaffected.
    #[cfg(test)]
    pub(crate) fn set_reject_writes(&self, reject: bool) {
        self.reject_writes
            .store(reject, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn check_writable(&self) -> Result<(), RetrievalError> {
        if self.reject_writes.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(RetrievalError::Storage(
                "keyword index rejected the write".to_string(),
            ));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn check_writable(&self) -> Result<(), RetrievalError> {
        Ok(())
    }

    pub fn params(&self) -> Bm25Params {
        self.params
    }

    /// Adds or replaces one chunk.
    #[instrument(skip_all, fields(chunk_id = chunk.id.as_u64()))]
    pub async fn add(&self, chunk: &ChunkRecord) -> Result<(), RetrievalError> {
        let _writer = self.writer.lock().await;
        self.check_writable()?;
        self.state
            .write()
            .map_err(poisoned)?
            .insert(chunk.id, &chunk.text);
        Ok(())
    }

    /// Adds or replaces a batch of chunks under a single write lock.
    ///
    /// Queries never observe half a batch.
    #[instrument(skip_all, fields(batch_size = chunks.len()))]
    pub async fn add_batch(&self, chunks: &[ChunkRecord]) -> Result<usize, RetrievalError> {
        let _writer = self.writer.lock().await;
        self.check_writable()?;
        let mut state = self.state.write().map_err(poisoned)?;
        for chunk in chunks {
            state.insert(chunk.id, &chunk.text);
        }
        Ok(chunks.len())
    }

    /// Discards all postings and re-tokenizes every chunk in `store`.
    ///
    /// Returns the number of indexed chunks.
    #[instrument(skip_all)]
    pub async fn rebuild(&self, store: &dyn ChunkStore) -> Result<usize, RetrievalError> {
        let _writer = self.writer.lock().await;
        let start = instant::Instant::now();

        let chunks = store.list_chunks().await?;
        let mut fresh = Bm25State::default();
        for chunk in &chunks {
            fresh.insert(chunk.id, &chunk.text);
        }
        let count = fresh.chunks.len();
        *self.state.write().map_err(poisoned)? = fresh;

        info!(
            "Rebuilt keyword index: {} chunks in {:.1}ms",
            count,
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(count)
    }

    /// Returns up to `k` chunks by BM25 score, descending.
    ///
    /// Chunks with a non-positive score are dropped. Equal scores keep chunk
    /// id order.
    pub fn query(&self, text: &str, k: usize) -> Result<Vec<Candidate>, RetrievalError> {
        Ok(self.state.read().map_err(poisoned)?.score(text, k, self.params))
    }

    pub fn contains(&self, chunk_id: ChunkId) -> bool {
        self.state
            .read()
            .map(|state| state.chunks.contains_key(&chunk_id))
            .unwrap_or(false)
    }

    /// Number of indexed chunks (N).
    pub fn len(&self) -> usize {
        self.state.read().map(|state| state.chunks.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
