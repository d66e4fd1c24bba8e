//! Relationship edges between memories and links to external entities.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoreError;

/// Kind of a directed edge between two memories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipKind {
    Supersedes,
    Supports,
    Contradicts,
    Related,
    DerivedFrom,
}

impl RelationshipKind {
    pub const ALL: [RelationshipKind; 5] = [
        RelationshipKind::Supersedes,
        RelationshipKind::Supports,
        RelationshipKind::Contradicts,
        RelationshipKind::Related,
        RelationshipKind::DerivedFrom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipKind::Supersedes => "supersedes",
            RelationshipKind::Supports => "supports",
            RelationshipKind::Contradicts => "contradicts",
            RelationshipKind::Related => "related",
            RelationshipKind::DerivedFrom => "derived_from",
        }
    }
}

impl fmt::Display for RelationshipKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RelationshipKind {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        RelationshipKind::ALL
            .into_iter()
            .find(|k| k.as_str() == normalized)
            .ok_or_else(|| LoreError::Validation(format!("unknown relationship kind: {s}")))
    }
}

/// Directed edge `(source, target, kind)` with a strength in [0, 1]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source_id: String,
    pub target_id: String,
    pub kind: RelationshipKind,
    pub strength: f64,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: RelationshipKind,
        strength: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind,
            strength,
            created_at: Utc::now(),
        }
    }

    /// The endpoint that is not `id`
    pub fn other_end(&self, id: &str) -> &str {
        if self.source_id == id {
            &self.target_id
        } else {
            &self.source_id
        }
    }
}

/// A memory reached through the relationship graph
#[derive(Debug, Clone)]
pub struct RelatedMemory {
    pub memory: super::Memory,
    pub relationship: Relationship,
    /// Hops from the starting memory (1 = direct neighbour)
    pub depth: usize,
}

/// External entity kinds a memory can be linked to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Pattern,
    Constraint,
    File,
    Function,
}

impl LinkKind {
    pub(crate) fn table(&self) -> &'static str {
        match self {
            LinkKind::Pattern => "memory_patterns",
            LinkKind::Constraint => "memory_constraints",
            LinkKind::File => "memory_files",
            LinkKind::Function => "memory_functions",
        }
    }

    pub(crate) fn key_column(&self) -> &'static str {
        match self {
            LinkKind::Pattern => "pattern_id",
            LinkKind::Constraint => "constraint_id",
            LinkKind::File => "file_path",
            LinkKind::Function => "function_id",
        }
    }
}

/// Pointer to a line range of a file, with a hash of the cited content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub line_start: u32,
    pub line_end: u32,
    pub content_hash: String,
    /// Set by drift detection; `None` means not yet checked and counts as valid
    #[serde(default)]
    pub valid: Option<bool>,
}

impl Citation {
    pub fn new(line_start: u32, line_end: u32, content_hash: impl Into<String>) -> Self {
        Self {
            line_start,
            line_end,
            content_hash: content_hash.into(),
            valid: None,
        }
    }

    pub fn is_invalid(&self) -> bool {
        self.valid == Some(false)
    }
}

/// Link to a pattern, constraint or function id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityLink {
    pub entity_id: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl EntityLink {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: None,
        }
    }

    pub fn named(entity_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
            name: Some(name.into()),
        }
    }
}

/// Link to a file, optionally pinned to a citation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileLink {
    pub file_path: String,
    #[serde(default)]
    pub citation: Option<Citation>,
}

impl FileLink {
    pub fn new(file_path: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            citation: None,
        }
    }

    pub fn cited(file_path: impl Into<String>, citation: Citation) -> Self {
        Self {
            file_path: file_path.into(),
            citation: Some(citation),
        }
    }
}

/// All external links of a memory
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryLinks {
    pub patterns: Vec<EntityLink>,
    pub constraints: Vec<EntityLink>,
    pub files: Vec<FileLink>,
    pub functions: Vec<EntityLink>,
}

impl MemoryLinks {
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
            && self.constraints.is_empty()
            && self.files.is_empty()
            && self.functions.is_empty()
    }

    /// True when a link of `kind` points at `entity_id`
    pub fn contains(&self, kind: LinkKind, entity_id: &str) -> bool {
        let entities = match kind {
            LinkKind::Pattern => &self.patterns,
            LinkKind::Constraint => &self.constraints,
            LinkKind::Function => &self.functions,
            LinkKind::File => return self.files.iter().any(|f| f.file_path == entity_id),
        };
        entities.iter().any(|e| e.entity_id == entity_id)
    }

    pub fn citations(&self) -> impl Iterator<Item = &Citation> {
        self.files.iter().filter_map(|f| f.citation.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relationship_kind_parse() {
        assert_eq!(
            "derived-from".parse::<RelationshipKind>().unwrap(),
            RelationshipKind::DerivedFrom
        );
        assert_eq!(
            " Related ".parse::<RelationshipKind>().unwrap(),
            RelationshipKind::Related
        );
        assert!("blocks".parse::<RelationshipKind>().is_err());
    }

    #[test]
    fn test_other_end() {
        let rel = Relationship::new("a", "b", RelationshipKind::Related, 0.5);
        assert_eq!(rel.other_end("a"), "b");
        assert_eq!(rel.other_end("b"), "a");
    }

    #[test]
    fn test_citation_validity_defaults_to_valid() {
        let mut citation = Citation::new(1, 10, "abc");
        assert!(!citation.is_invalid());
        citation.valid = Some(true);
        assert!(!citation.is_invalid());
        citation.valid = Some(false);
        assert!(citation.is_invalid());
    }

    #[test]
    fn test_links_citations_only_from_cited_files() {
        let links = MemoryLinks {
            files: vec![
                FileLink::new("src/lib.rs"),
                FileLink::cited("src/main.rs", Citation::new(3, 9, "h")),
            ],
            ..Default::default()
        };
        assert_eq!(links.citations().count(), 1);
        assert!(!links.is_empty());
    }

    #[test]
    fn test_links_contains_by_kind() {
        let links = MemoryLinks {
            files: vec![FileLink::new("src/lib.rs")],
            patterns: vec![EntityLink::named("p1", "retry")],
            ..Default::default()
        };
        assert!(links.contains(LinkKind::File, "src/lib.rs"));
        assert!(links.contains(LinkKind::Pattern, "p1"));
        assert!(!links.contains(LinkKind::Function, "p1"));
        assert!(!links.contains(LinkKind::File, "src/main.rs"));
    }
}
