use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::LoreError;
use crate::memory::content::MemoryContent;
use crate::memory::links::{Citation, MemoryLinks};

/// Confidence assigned when a caller does not supply one
pub const DEFAULT_CONFIDENCE: f64 = 1.0;

/// Generated summaries are cut to this many characters
pub const MAX_SUMMARY_CHARS: usize = 200;

/// Closed set of memory variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Core,
    Tribal,
    Procedural,
    Semantic,
    Episodic,
    PatternRationale,
    ConstraintOverride,
    DecisionContext,
    CodeSmell,
}

impl MemoryType {
    pub const ALL: [MemoryType; 9] = [
        MemoryType::Core,
        MemoryType::Tribal,
        MemoryType::Procedural,
        MemoryType::Semantic,
        MemoryType::Episodic,
        MemoryType::PatternRationale,
        MemoryType::ConstraintOverride,
        MemoryType::DecisionContext,
        MemoryType::CodeSmell,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Core => "core",
            MemoryType::Tribal => "tribal",
            MemoryType::Procedural => "procedural",
            MemoryType::Semantic => "semantic",
            MemoryType::Episodic => "episodic",
            MemoryType::PatternRationale => "pattern_rationale",
            MemoryType::ConstraintOverride => "constraint_override",
            MemoryType::DecisionContext => "decision_context",
            MemoryType::CodeSmell => "code_smell",
        }
    }
}

impl fmt::Display for MemoryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoryType {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        MemoryType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| LoreError::Validation(format!("unknown memory type: {s}")))
    }
}

/// How much a memory matters when it is wrong or missing
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Importance {
    pub const ALL: [Importance; 4] = [
        Importance::Low,
        Importance::Normal,
        Importance::High,
        Importance::Critical,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Importance::Low => "low",
            Importance::Normal => "normal",
            Importance::High => "high",
            Importance::Critical => "critical",
        }
    }

    /// Weight in [0, 1] used by candidate prioritisation
    pub fn weight(&self) -> f64 {
        match self {
            Importance::Low => 0.25,
            Importance::Normal => 0.5,
            Importance::High => 0.75,
            Importance::Critical => 1.0,
        }
    }
}

impl fmt::Display for Importance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Importance {
    type Err = LoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        Importance::ALL
            .into_iter()
            .find(|i| i.as_str() == normalized)
            .ok_or_else(|| LoreError::Validation(format!("unknown importance: {s}")))
    }
}

/// When the system learned the fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionTime {
    pub recorded_at: DateTime<Utc>,
}

/// When the fact is (or was) true in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidTime {
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl ValidTime {
    pub fn new(valid_from: Option<DateTime<Utc>>, valid_until: Option<DateTime<Utc>>) -> Self {
        Self {
            valid_from,
            valid_until,
        }
    }

    /// Whether the fact holds at `at`; an open start falls back to `recorded_at`
    pub fn holds_at(&self, at: DateTime<Utc>, recorded_at: DateTime<Utc>) -> bool {
        let from = self.valid_from.unwrap_or(recorded_at);
        from <= at && self.valid_until.is_none_or(|until| until > at)
    }
}

/// A single unit of knowledge with its trust and lifecycle envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub content: MemoryContent,
    pub summary: String,
    pub confidence: f64,
    pub importance: Importance,
    pub transaction_time: TransactionTime,
    pub valid_time: ValidTime,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub access_count: i64,
    pub last_accessed: Option<DateTime<Utc>>,
    pub last_validated: Option<DateTime<Utc>>,
    pub archived: bool,
    pub archive_reason: Option<String>,
    pub superseded_by: Option<String>,
    pub supersedes: Option<String>,
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub links: MemoryLinks,
}

impl Memory {
    /// Create a new memory with a generated id and default trust envelope
    pub fn new(content: MemoryContent) -> Self {
        let now = Utc::now();
        let summary = derive_summary(&content);
        Self {
            id: Uuid::new_v4().to_string(),
            content,
            summary,
            confidence: DEFAULT_CONFIDENCE,
            importance: Importance::default(),
            transaction_time: TransactionTime { recorded_at: now },
            valid_time: ValidTime::default(),
            created_at: now,
            updated_at: now,
            access_count: 0,
            last_accessed: None,
            last_validated: None,
            archived: false,
            archive_reason: None,
            superseded_by: None,
            supersedes: None,
            tags: BTreeSet::new(),
            links: MemoryLinks::default(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = summary.into();
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_importance(mut self, importance: Importance) -> Self {
        self.importance = importance;
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

    pub fn with_valid_time(
        mut self,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        self.valid_time = ValidTime::new(valid_from, valid_until);
        self
    }

    pub fn with_links(mut self, links: MemoryLinks) -> Self {
        self.links = links;
        self
    }

    /// Backdate creation and recording time, e.g. for imported knowledge
    pub fn created(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = at;
        self.updated_at = at;
        self.transaction_time.recorded_at = at;
        self
    }

    pub fn memory_type(&self) -> Option<MemoryType> {
        self.content.memory_type()
    }

    pub fn type_name(&self) -> &str {
        self.content.type_name()
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.transaction_time.recorded_at
    }

    pub fn is_active(&self) -> bool {
        !self.archived
    }

    pub fn citations(&self) -> impl Iterator<Item = &Citation> {
        self.links.citations()
    }

    /// Searchable text: summary, payload text and tags
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(self.summary.len() + 64);
        text.push_str(&self.summary);
        text.push(' ');
        text.push_str(&self.content.text());
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text
    }

    /// Fill the summary from the payload when it is blank
    pub fn ensure_summary(&mut self) {
        if self.summary.trim().is_empty() {
            self.summary = derive_summary(&self.content);
        }
    }
}

/// Headline of the payload cut to [`MAX_SUMMARY_CHARS`], or the type tag when the payload is empty
pub fn derive_summary(content: &MemoryContent) -> String {
    let headline = content.headline();
    if headline.is_empty() {
        return format!("{} memory", content.type_name());
    }
    if headline.chars().count() <= MAX_SUMMARY_CHARS {
        return headline;
    }
    let cut: String = headline.chars().take(MAX_SUMMARY_CHARS - 3).collect();
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::content::{SemanticContent, TribalContent};
    use chrono::Duration;

    fn tribal(topic: &str, knowledge: &str) -> MemoryContent {
        MemoryContent::Tribal(TribalContent {
            topic: topic.into(),
            knowledge: knowledge.into(),
            ..Default::default()
        })
    }

    #[test]
    fn test_memory_new_defaults() {
        let memory = Memory::new(tribal("auth", "tokens expire after an hour"));
        assert!(!memory.id.is_empty());
        assert_eq!(memory.confidence, DEFAULT_CONFIDENCE);
        assert_eq!(memory.importance, Importance::Normal);
        assert_eq!(memory.access_count, 0);
        assert!(!memory.archived);
        assert_eq!(memory.summary, "auth: tokens expire after an hour");
        assert_eq!(memory.memory_type(), Some(MemoryType::Tribal));
        assert_eq!(memory.recorded_at(), memory.created_at);
    }

    #[test]
    fn test_memory_ids_are_unique() {
        let a = Memory::new(tribal("a", "b"));
        let b = Memory::new(tribal("a", "b"));
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_empty_payload_summary_uses_type() {
        let memory = Memory::new(MemoryContent::Semantic(SemanticContent::default()));
        assert_eq!(memory.summary, "semantic memory");
    }

    #[test]
    fn test_long_summary_is_truncated() {
        let memory = Memory::new(tribal("t", &"x".repeat(500)));
        assert_eq!(memory.summary.chars().count(), MAX_SUMMARY_CHARS);
        assert!(memory.summary.ends_with("..."));
    }

    #[test]
    fn test_memory_type_parse() {
        assert_eq!(
            "pattern-rationale".parse::<MemoryType>().unwrap(),
            MemoryType::PatternRationale
        );
        assert_eq!("CODE_SMELL".parse::<MemoryType>().unwrap(), MemoryType::CodeSmell);
        assert!("incident".parse::<MemoryType>().is_err());
    }

    #[test]
    fn test_importance_weights_are_ordered() {
        let weights: Vec<f64> = Importance::ALL.iter().map(|i| i.weight()).collect();
        assert!(weights.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(Importance::Critical.weight(), 1.0);
    }

    #[test]
    fn test_valid_time_holds_at() {
        let now = Utc::now();
        let recorded = now - Duration::days(10);
        let window = ValidTime::new(Some(now - Duration::days(5)), Some(now + Duration::days(5)));
        assert!(window.holds_at(now, recorded));
        assert!(!window.holds_at(now - Duration::days(6), recorded));
        assert!(!window.holds_at(now + Duration::days(5), recorded));

        let open = ValidTime::default();
        assert!(open.holds_at(now, recorded));
        assert!(!open.holds_at(recorded - Duration::days(1), recorded));
    }

    #[test]
    fn test_searchable_text_includes_tags() {
        let memory = Memory::new(tribal("cache", "invalidate on write")).with_tags(["redis"]);
        let text = memory.searchable_text();
        assert!(text.contains("invalidate on write"));
        assert!(text.contains("redis"));
    }
}
