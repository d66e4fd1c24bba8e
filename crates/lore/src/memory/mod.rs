//! Memory types and trust calculations
//!
//! Defines the memory envelope, its variant payloads, the links and
//! relationships between memories, and confidence decay.

pub mod content;
pub mod decay;
pub mod links;
pub mod types;

pub use content::{
    CodeSmellContent, ConstraintOverrideContent, CoreContent, DecisionContextContent,
    EpisodicContent, MemoryContent, PatternRationaleContent, ProceduralContent, SemanticContent,
    Severity, TribalContent,
};
pub use decay::{DecayCalculator, DecayConfig, DecayFactors};
pub use links::{
    Citation, EntityLink, FileLink, LinkKind, MemoryLinks, RelatedMemory, Relationship,
    RelationshipKind,
};
pub use types::{Importance, Memory, MemoryType, TransactionTime, ValidTime};
