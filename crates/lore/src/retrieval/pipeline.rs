//! End-to-end retrieval
//!
//! Store search (or similarity seed) → decay-aware scoring → diversity
//! ranking → compression into the token budget. Memories that make it into
//! the result count as read and get their access tracking bumped.

use chrono::Utc;
use tracing::debug;

use crate::config::Config;
use crate::error::Result;
use crate::memory::types::{Memory, MemoryType};
use crate::retrieval::compression::{Compressed, compress_batch_to_fit};
use crate::retrieval::ranker::{RankedMemory, ResultRanker, ScoredMemory};
use crate::retrieval::scorer::{QueryContext, RelevanceScorer};
use crate::storage::filter::{MemoryQuery, SearchOrder};
use crate::storage::sqlite::{MemoryStore, SimilaritySource};

/// A memory selected for the caller
#[derive(Debug, Clone)]
pub struct RetrievedMemory {
    pub memory: Memory,
    pub score: f64,
    pub effective_score: f64,
    pub compressed: Compressed,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalRequest {
    pub context: QueryContext,
    /// Token budget; the configured default when `None`
    pub budget: Option<usize>,
    pub types: Vec<MemoryType>,
    pub tags: Vec<String>,
    /// Seed candidates by vector similarity instead of a recency scan
    pub embedding: Option<Vec<f32>>,
}

impl RetrievalRequest {
    pub fn new(context: QueryContext) -> Self {
        Self {
            context,
            ..Default::default()
        }
    }

    pub fn with_budget(mut self, budget: usize) -> Self {
        self.budget = Some(budget);
        self
    }

    pub fn with_types(mut self, types: Vec<MemoryType>) -> Self {
        self.types = types;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub memories: Vec<RetrievedMemory>,
    pub tokens_used: usize,
    pub budget: usize,
    /// Candidates considered before ranking
    pub candidates: usize,
    /// The similarity seed fell back to a recency scan
    pub degraded: bool,
}

impl RetrievalResult {
    /// Compressed renderings joined for injection into a prompt
    pub fn render(&self) -> String {
        self.memories
            .iter()
            .map(|m| m.compressed.expanded.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct RetrievalPipeline {
    store: MemoryStore,
    scorer: RelevanceScorer,
    ranker: ResultRanker,
    default_budget: usize,
    candidate_limit: usize,
}

impl RetrievalPipeline {
    pub fn new(
        store: MemoryStore,
        scorer: RelevanceScorer,
        ranker: ResultRanker,
        default_budget: usize,
        candidate_limit: usize,
    ) -> Self {
        Self {
            store,
            scorer,
            ranker,
            default_budget,
            candidate_limit: candidate_limit.max(1),
        }
    }

    pub fn from_config(store: MemoryStore, config: &Config) -> Self {
        Self::new(
            store,
            RelevanceScorer::from_config(&config.decay, &config.retrieval),
            ResultRanker::new(config.retrieval.diversity_penalty),
            config.retrieval.token_budget,
            config.retrieval.candidate_limit,
        )
    }

    pub fn store(&self) -> &MemoryStore {
        &self.store
    }

    pub async fn retrieve(&self, request: &RetrievalRequest) -> Result<RetrievalResult> {
        let budget = request.budget.unwrap_or(self.default_budget);
        if budget == 0 {
            return Ok(RetrievalResult::default());
        }

        let query = MemoryQuery::new()
            .with_types(request.types.clone())
            .with_tags(request.tags.iter().cloned());
        let candidate_limit = self.candidate_limit;

        let (candidates, degraded) = match &request.embedding {
            Some(embedding) => {
                let hits = self
                    .store
                    .similarity_search(embedding, candidate_limit, 0.0)
                    .await?;
                let degraded = hits
                    .iter()
                    .any(|h| h.source == SimilaritySource::RecencyFallback);
                let memories: Vec<Memory> = hits
                    .into_iter()
                    .map(|h| h.memory)
                    .filter(|m| query.matches(m))
                    .collect();
                (memories, degraded)
            }
            None => {
                let query = query
                    .ordered_by(SearchOrder::RecentActivityDesc)
                    .with_limit(candidate_limit);
                (self.store.search(&query).await?, false)
            }
        };
        let candidate_count = candidates.len();

        let now = Utc::now();
        let scored: Vec<ScoredMemory> = candidates
            .into_iter()
            .map(|memory| {
                let score = self.scorer.score_at(&memory, &request.context, now);
                ScoredMemory::new(memory, score)
            })
            .collect();
        let ranked = self.ranker.rank(scored);

        let ordered: Vec<Memory> = ranked.iter().map(|r| r.memory.clone()).collect();
        let compressed = compress_batch_to_fit(&ordered, budget);
        let tokens_used = compressed.iter().map(|c| c.token_count).sum();

        let mut memories = Vec::with_capacity(compressed.len());
        for (RankedMemory { memory, score, effective_score }, compressed) in
            ranked.into_iter().zip(compressed)
        {
            let memory = self.store.read(&memory.id).await?.unwrap_or(memory);
            memories.push(RetrievedMemory {
                memory,
                score,
                effective_score,
                compressed,
            });
        }

        debug!(
            intent = %request.context.intent,
            candidates = candidate_count,
            selected = memories.len(),
            tokens_used,
            budget,
            "Retrieved memories"
        );

        Ok(RetrievalResult {
            memories,
            tokens_used,
            budget,
            candidates: candidate_count,
            degraded,
        })
    }
}
