//! Relevance scoring, ranking and compression
//!
//! The pure pieces ([`RelevanceScorer`], [`ResultRanker`], the compression
//! functions) hold no shared mutable state; [`RetrievalPipeline`] wires them
//! to a [`crate::storage::MemoryStore`].

pub mod compression;
pub mod intent;
pub mod pipeline;
pub mod ranker;
pub mod scorer;

pub use compression::{
    Compressed, CompressionLevel, compress, compress_batch_to_fit, compress_to_fit,
    estimate_tokens,
};
pub use intent::{Intent, IntentWeights};
pub use pipeline::{RetrievalPipeline, RetrievalRequest, RetrievalResult, RetrievedMemory};
pub use ranker::{RankedMemory, ResultRanker, ScoredMemory};
pub use scorer::{QueryContext, RelevanceScorer, ScoreBreakdown, topic_overlap};
