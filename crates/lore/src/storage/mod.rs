//! Persistent memory storage
//!
//! SQLite holds the memories, their tags, entity links, relationship edges,
//! version history and embeddings. See [`MemoryStore`] for the operations.

pub mod filter;
pub mod patch;
pub mod schema;
pub mod sqlite;
pub mod vector;

pub use filter::{MemoryQuery, SearchOrder};
pub use patch::MemoryUpdate;
pub use sqlite::{
    DELETED_REASON, MAX_TRAVERSAL_DEPTH, MemoryStore, MemoryVersion, SimilarityHit,
    SimilaritySource, StoreOptions, TemporalScope, ValidationRecord, format_ts,
};
pub use vector::{SqliteVectorIndex, VectorBackend, VectorHit, cosine_similarity};
