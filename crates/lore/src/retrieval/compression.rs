//! Hierarchical compression of memories into token-budgeted text
//!
//! | Level | Content | Token cap |
//! |---|---|---|
//! | L0 | type tag + id prefix | 10 |
//! | L1 | one-line summary | 75 |
//! | L2 | summary, payload fields, trust, tags | 300 |
//! | L3 | everything, including links and lineage | 1000 |
//!
//! Rendering never fails: absent optional fields print as a placeholder and
//! memories of unknown type fall back to a generic renderer.

use std::fmt::{self, Write as _};

use serde::Serialize;

use crate::memory::content::MemoryContent;
use crate::memory::types::{Importance, Memory};

/// Printed for empty or absent fields
pub const PLACEHOLDER: &str = "(not provided)";

const CHARS_PER_TOKEN: usize = 4;
const L0_TYPE_CHARS: usize = 20;
const L0_ID_CHARS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum CompressionLevel {
    L0,
    L1,
    L2,
    L3,
}

impl CompressionLevel {
    /// Richest first
    pub const DESCENDING: [CompressionLevel; 4] = [
        CompressionLevel::L3,
        CompressionLevel::L2,
        CompressionLevel::L1,
        CompressionLevel::L0,
    ];

    pub fn max_tokens(&self) -> usize {
        match self {
            CompressionLevel::L0 => 10,
            CompressionLevel::L1 => 75,
            CompressionLevel::L2 => 300,
            CompressionLevel::L3 => 1000,
        }
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    pub fn from_u8(level: u8) -> Option<Self> {
        match level {
            0 => Some(CompressionLevel::L0),
            1 => Some(CompressionLevel::L1),
            2 => Some(CompressionLevel::L2),
            3 => Some(CompressionLevel::L3),
            _ => None,
        }
    }
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.as_u8())
    }
}

/// A memory rendered at one level
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Compressed {
    pub memory_id: String,
    pub level: CompressionLevel,
    pub importance: Importance,
    /// Always non-empty one-liner
    pub summary: String,
    /// Always non-empty; equals `summary` at L0 and L1
    pub expanded: String,
    /// Estimated tokens of `expanded`
    pub token_count: usize,
}

/// `ceil(chars / 4)`
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

pub fn compress(memory: &Memory, level: CompressionLevel) -> Compressed {
    let summary = match level {
        CompressionLevel::L0 => minimal_line(memory),
        _ => truncate_chars(&summary_line(memory), CompressionLevel::L1.max_tokens() * CHARS_PER_TOKEN),
    };
    let expanded = match level {
        CompressionLevel::L0 | CompressionLevel::L1 => summary.clone(),
        CompressionLevel::L2 => truncate_chars(
            &detailed(memory, &summary),
            CompressionLevel::L2.max_tokens() * CHARS_PER_TOKEN,
        ),
        CompressionLevel::L3 => truncate_chars(
            &full(memory, &summary),
            CompressionLevel::L3.max_tokens() * CHARS_PER_TOKEN,
        ),
    };

    Compressed {
        memory_id: memory.id.clone(),
        level,
        importance: memory.importance,
        token_count: estimate_tokens(&expanded),
        summary,
        expanded,
    }
}

/// Richest level within `budget` tokens, or L0 when nothing fits
pub fn compress_to_fit(memory: &Memory, budget: usize) -> Compressed {
    richest_within(memory, budget).unwrap_or_else(|| compress(memory, CompressionLevel::L0))
}

/// Compress ranked memories into a shared budget.
///
/// Walks `memories` in order. Each non-critical memory is held to an even
/// share of what is left; critical memories may use the whole remainder.
/// Stops at the first memory that cannot fit even at L0.
pub fn compress_batch_to_fit(memories: &[Memory], budget: usize) -> Vec<Compressed> {
    let mut remaining = budget;
    let mut out = Vec::with_capacity(memories.len());

    for (i, memory) in memories.iter().enumerate() {
        let left = memories.len() - i;
        let limit = if memory.importance == Importance::Critical {
            remaining
        } else {
            (remaining / left).max(compress(memory, CompressionLevel::L0).token_count)
        };

        let chosen = richest_within(memory, limit.min(remaining));
        let Some(compressed) = chosen else {
            break;
        };
        remaining -= compressed.token_count;
        out.push(compressed);
    }
    out
}

fn richest_within(memory: &Memory, budget: usize) -> Option<Compressed> {
    CompressionLevel::DESCENDING
        .into_iter()
        .map(|level| compress(memory, level))
        .find(|c| c.token_count <= budget)
}

fn minimal_line(memory: &Memory) -> String {
    let type_name = truncate_chars(memory.type_name(), L0_TYPE_CHARS);
    let id: String = memory.id.chars().take(L0_ID_CHARS).collect();
    let id = if id.trim().is_empty() { "?".to_string() } else { id };
    format!("[{type_name}] {id}")
}

fn summary_line(memory: &Memory) -> String {
    let text = if memory.summary.trim().is_empty() {
        memory.content.headline()
    } else {
        memory.summary.trim().to_string()
    };
    format!("[{}] {}", memory.type_name(), or_placeholder(&text))
}

fn detailed(memory: &Memory, summary: &str) -> String {
    let mut out = String::from(summary);
    for (name, value) in payload_fields(&memory.content) {
        let _ = write!(out, "\n{name}: {value}");
    }
    let _ = write!(
        out,
        "\nconfidence: {:.2} | importance: {}",
        memory.confidence, memory.importance
    );
    let _ = write!(out, "\ntags: {}", join_or_placeholder(memory.tags.iter()));
    out
}

fn full(memory: &Memory, summary: &str) -> String {
    let mut out = detailed(memory, summary);
    let ts = |t: Option<chrono::DateTime<chrono::Utc>>| {
        t.map(|t| t.to_rfc3339()).unwrap_or_else(|| PLACEHOLDER.to_string())
    };
    let links = &memory.links;

    let _ = write!(out, "\nid: {}", memory.id);
    let _ = write!(out, "\nrecorded: {}", memory.recorded_at().to_rfc3339());
    let _ = write!(
        out,
        "\nvalid: {} .. {}",
        ts(memory.valid_time.valid_from),
        ts(memory.valid_time.valid_until)
    );
    let _ = write!(
        out,
        "\naccesses: {} | last validated: {}",
        memory.access_count,
        ts(memory.last_validated)
    );
    let _ = write!(
        out,
        "\nsupersedes: {} | superseded by: {}",
        memory.supersedes.as_deref().unwrap_or(PLACEHOLDER),
        memory.superseded_by.as_deref().unwrap_or(PLACEHOLDER)
    );
    let entity = |l: &crate::memory::links::EntityLink| match &l.name {
        Some(name) => format!("{} ({name})", l.entity_id),
        None => l.entity_id.clone(),
    };
    let _ = write!(
        out,
        "\npatterns: {}",
        join_or_placeholder(links.patterns.iter().map(entity))
    );
    let _ = write!(
        out,
        "\nconstraints: {}",
        join_or_placeholder(links.constraints.iter().map(entity))
    );
    let _ = write!(
        out,
        "\nfunctions: {}",
        join_or_placeholder(links.functions.iter().map(entity))
    );
    let files = links.files.iter().map(|f| match &f.citation {
        Some(c) => {
            let state = match c.valid {
                Some(true) => "valid",
                Some(false) => "invalid",
                None => "unchecked",
            };
            format!(
                "{}:{}-{} #{} [{state}]",
                f.file_path, c.line_start, c.line_end, c.content_hash
            )
        }
        None => f.file_path.clone(),
    });
    let _ = write!(out, "\nfiles: {}", join_or_placeholder(files));
    if memory.archived {
        let _ = write!(
            out,
            "\narchived: {}",
            memory.archive_reason.as_deref().unwrap_or(PLACEHOLDER)
        );
    }
    out
}

fn payload_fields(content: &MemoryContent) -> Vec<(&'static str, String)> {
    let opt = |v: &Option<String>| or_placeholder(v.as_deref().unwrap_or_default());
    match content {
        MemoryContent::Core(c) => vec![
            ("project", or_placeholder(&c.project_name)),
            ("description", or_placeholder(&c.description)),
            ("conventions", join_or_placeholder(c.conventions.iter())),
        ],
        MemoryContent::Tribal(c) => vec![
            ("topic", or_placeholder(&c.topic)),
            ("knowledge", or_placeholder(&c.knowledge)),
            ("severity", c.severity.as_str().to_string()),
            ("warnings", join_or_placeholder(c.warnings.iter())),
            ("consequences", join_or_placeholder(c.consequences.iter())),
        ],
        MemoryContent::Procedural(c) => vec![
            ("title", or_placeholder(&c.title)),
            ("prerequisites", join_or_placeholder(c.prerequisites.iter())),
            (
                "steps",
                join_or_placeholder(
                    c.steps
                        .iter()
                        .enumerate()
                        .map(|(i, s)| format!("{}. {s}", i + 1)),
                ),
            ),
        ],
        MemoryContent::Semantic(c) => vec![
            ("knowledge", or_placeholder(&c.knowledge)),
            ("sources", join_or_placeholder(c.source_episodes.iter())),
        ],
        MemoryContent::Episodic(c) => vec![
            ("interaction", or_placeholder(&c.interaction)),
            ("context", or_placeholder(&c.context)),
            ("outcome", opt(&c.outcome)),
        ],
        MemoryContent::PatternRationale(c) => vec![
            ("pattern", or_placeholder(&c.pattern_name)),
            ("rationale", or_placeholder(&c.rationale)),
            ("business context", opt(&c.business_context)),
        ],
        MemoryContent::ConstraintOverride(c) => vec![
            ("constraint", or_placeholder(&c.constraint_name)),
            ("reason", or_placeholder(&c.override_reason)),
            ("approved by", opt(&c.approved_by)),
        ],
        MemoryContent::DecisionContext(c) => vec![
            ("decision", or_placeholder(&c.decision_summary)),
            ("business context", or_placeholder(&c.business_context)),
            ("alternatives", join_or_placeholder(c.alternatives.iter())),
        ],
        MemoryContent::CodeSmell(c) => vec![
            ("pattern", or_placeholder(&c.pattern)),
            ("reason", or_placeholder(&c.reason)),
            ("suggestion", opt(&c.suggestion)),
        ],
        MemoryContent::Unknown { payload, .. } => {
            let rendered = if payload.is_null() {
                String::new()
            } else {
                payload.to_string()
            };
            vec![("payload", or_placeholder(&rendered))]
        }
    }
}

fn or_placeholder(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        trimmed.to_string()
    }
}

fn join_or_placeholder<I, S>(items: I) -> String
where
    I: Iterator<Item = S>,
    S: AsRef<str>,
{
    let parts: Vec<String> = items
        .filter(|s| !s.as_ref().trim().is_empty())
        .map(|s| s.as_ref().trim().to_string())
        .collect();
    if parts.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        parts.join("; ")
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}
