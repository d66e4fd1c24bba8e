//! Lore - bitemporal memory for coding assistants
//!
//! Stores typed memories about a codebase in SQLite with full version
//! history, lets their confidence decay with age and disuse, retrieves them
//! ranked and compressed into a token budget, and folds user feedback back
//! into their confidence.

pub mod config;
pub mod error;
pub mod learning;
pub mod memory;
pub mod retrieval;
pub mod storage;
pub mod testing;

pub use config::Config;
pub use error::{LoreError, Result};
pub use learning::{ActiveLearningLoop, CandidateCriteria, FeedbackAction, FeedbackOutcome};
pub use memory::{DecayCalculator, Importance, Memory, MemoryContent, MemoryType};
pub use retrieval::{Intent, QueryContext, RetrievalPipeline, RetrievalRequest};
pub use storage::{MemoryQuery, MemoryStore, MemoryUpdate, TemporalScope};
