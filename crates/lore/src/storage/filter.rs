//! Query types for memory search operations
//!
//! A [`MemoryQuery`] narrows a search by type, tags, confidence, importance,
//! creation date, access count and archival state. Unset and empty filters
//! mean "no filter"; they never exclude everything.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;

use crate::memory::types::{Importance, Memory, MemoryType};
use crate::storage::sqlite::format_ts;

/// Result ordering for searches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchOrder {
    /// Most recently recorded first
    #[default]
    RecordedDesc,
    /// Highest stored confidence first
    ConfidenceDesc,
    /// Lowest stored confidence first
    ConfidenceAsc,
    /// Most recently read first; never-read memories last
    LastAccessedDesc,
    /// Most recent activity (last read, else recorded) first
    RecentActivityDesc,
}

impl SearchOrder {
    pub(crate) fn sql(&self) -> &'static str {
        match self {
            SearchOrder::RecordedDesc => "m.recorded_at DESC, m.id ASC",
            SearchOrder::ConfidenceDesc => "m.confidence DESC, m.id ASC",
            SearchOrder::ConfidenceAsc => "m.confidence ASC, m.id ASC",
            SearchOrder::LastAccessedDesc => {
                "m.last_accessed IS NULL, m.last_accessed DESC, m.id ASC"
            }
            SearchOrder::RecentActivityDesc => {
                "COALESCE(m.last_accessed, m.recorded_at) DESC, m.id ASC"
            }
        }
    }

    /// In-process equivalent of [`SearchOrder::sql`]
    pub(crate) fn sort(&self, memories: &mut [Memory]) {
        match self {
            SearchOrder::RecordedDesc => memories.sort_by(|a, b| {
                b.recorded_at()
                    .cmp(&a.recorded_at())
                    .then_with(|| a.id.cmp(&b.id))
            }),
            SearchOrder::ConfidenceDesc => memories.sort_by(|a, b| {
                b.confidence
                    .total_cmp(&a.confidence)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            SearchOrder::ConfidenceAsc => memories.sort_by(|a, b| {
                a.confidence
                    .total_cmp(&b.confidence)
                    .then_with(|| a.id.cmp(&b.id))
            }),
            SearchOrder::LastAccessedDesc => memories.sort_by(|a, b| {
                match (a.last_accessed, b.last_accessed) {
                    (Some(x), Some(y)) => y.cmp(&x),
                    (Some(_), None) => std::cmp::Ordering::Less,
                    (None, Some(_)) => std::cmp::Ordering::Greater,
                    (None, None) => std::cmp::Ordering::Equal,
                }
                .then_with(|| a.id.cmp(&b.id))
            }),
            SearchOrder::RecentActivityDesc => memories.sort_by(|a, b| {
                let a_at = a.last_accessed.unwrap_or(a.recorded_at());
                let b_at = b.last_accessed.unwrap_or(b.recorded_at());
                b_at.cmp(&a_at).then_with(|| a.id.cmp(&b.id))
            }),
        }
    }
}

/// Filter criteria for memory searches.
///
/// All fields are optional; set filters are combined with AND logic.
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    /// Match any of these types
    pub types: Option<Vec<MemoryType>>,
    /// Match memories carrying any of these tags
    pub tags: Option<Vec<String>>,
    /// Minimum stored confidence (inclusive)
    pub min_confidence: Option<f64>,
    /// Maximum stored confidence (inclusive)
    pub max_confidence: Option<f64>,
    /// Match any of these importance levels
    pub importance: Option<Vec<Importance>>,
    /// Created at or after
    pub created_after: Option<DateTime<Utc>>,
    /// Created strictly before
    pub created_before: Option<DateTime<Utc>>,
    /// Minimum access count (inclusive)
    pub min_access_count: Option<i64>,
    /// Never validated, or last validated at or before this instant
    pub validated_before: Option<DateTime<Utc>>,
    /// Only memories that were never validated
    pub never_validated: bool,
    /// Include soft-deleted memories
    pub include_archived: bool,
    pub order: SearchOrder,
    pub limit: Option<usize>,
    pub offset: usize,
}

impl MemoryQuery {
    /// Create a new empty query (active memories, no other filtering)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_types(mut self, types: Vec<MemoryType>) -> Self {
        self.types = Some(types);
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = Some(tags.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_confidence_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.min_confidence = min;
        self.max_confidence = max;
        self
    }

    pub fn with_importance(mut self, importance: Vec<Importance>) -> Self {
        self.importance = Some(importance);
        self
    }

    pub fn created_between(
        mut self,
        after: Option<DateTime<Utc>>,
        before: Option<DateTime<Utc>>,
    ) -> Self {
        self.created_after = after;
        self.created_before = before;
        self
    }

    pub fn with_min_access_count(mut self, count: i64) -> Self {
        self.min_access_count = Some(count);
        self
    }

    pub fn validated_at_or_before(mut self, at: DateTime<Utc>) -> Self {
        self.validated_before = Some(at);
        self
    }

    pub fn never_validated(mut self) -> Self {
        self.never_validated = true;
        self
    }

    pub fn including_archived(mut self) -> Self {
        self.include_archived = true;
        self
    }

    pub fn ordered_by(mut self, order: SearchOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn type_filter(&self) -> Option<&[MemoryType]> {
        self.types.as_deref().filter(|t| !t.is_empty())
    }

    fn tag_filter(&self) -> Option<&[String]> {
        self.tags.as_deref().filter(|t| !t.is_empty())
    }

    fn importance_filter(&self) -> Option<&[Importance]> {
        self.importance.as_deref().filter(|i| !i.is_empty())
    }

    /// Build a parameterised WHERE fragment over the `memories m` alias.
    ///
    /// Returns `None` when nothing is filtered.
    pub fn to_sql_clause(&self) -> Option<(String, Vec<Value>)> {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(types) = self.type_filter() {
            conditions.push(format!("m.type IN ({})", placeholders(types.len())));
            params.extend(types.iter().map(|t| Value::Text(t.as_str().to_string())));
        }

        if let Some(tags) = self.tag_filter() {
            conditions.push(format!(
                "m.id IN (SELECT memory_id FROM memory_tags WHERE tag IN ({}))",
                placeholders(tags.len())
            ));
            params.extend(tags.iter().map(|t| Value::Text(t.clone())));
        }

        if let Some(min) = self.min_confidence {
            conditions.push("m.confidence >= ?".to_string());
            params.push(Value::Real(min));
        }

        if let Some(max) = self.max_confidence {
            conditions.push("m.confidence <= ?".to_string());
            params.push(Value::Real(max));
        }

        if let Some(levels) = self.importance_filter() {
            conditions.push(format!("m.importance IN ({})", placeholders(levels.len())));
            params.extend(levels.iter().map(|i| Value::Text(i.as_str().to_string())));
        }

        if let Some(after) = self.created_after {
            conditions.push("m.created_at >= ?".to_string());
            params.push(Value::Text(format_ts(&after)));
        }

        if let Some(before) = self.created_before {
            conditions.push("m.created_at < ?".to_string());
            params.push(Value::Text(format_ts(&before)));
        }

        if let Some(floor) = self.min_access_count {
            conditions.push("m.access_count >= ?".to_string());
            params.push(Value::Integer(floor));
        }

        if let Some(at) = self.validated_before {
            conditions.push("(m.last_validated IS NULL OR m.last_validated <= ?)".to_string());
            params.push(Value::Text(format_ts(&at)));
        }

        if self.never_validated {
            conditions.push("m.last_validated IS NULL".to_string());
        }

        if !self.include_archived {
            conditions.push("m.archived = 0".to_string());
        }

        if conditions.is_empty() {
            None
        } else {
            Some((conditions.join(" AND "), params))
        }
    }

    /// In-process equivalent of [`MemoryQuery::to_sql_clause`], used for
    /// reconstructed historical versions
    pub fn matches(&self, memory: &Memory) -> bool {
        if let Some(types) = self.type_filter() {
            if !memory.memory_type().is_some_and(|t| types.contains(&t)) {
                return false;
            }
        }
        if let Some(tags) = self.tag_filter() {
            if !tags.iter().any(|t| memory.tags.contains(t)) {
                return false;
            }
        }
        if self.min_confidence.is_some_and(|min| !(memory.confidence >= min)) {
            return false;
        }
        if self.max_confidence.is_some_and(|max| !(memory.confidence <= max)) {
            return false;
        }
        if let Some(levels) = self.importance_filter() {
            if !levels.contains(&memory.importance) {
                return false;
            }
        }
        if self.created_after.is_some_and(|after| memory.created_at < after) {
            return false;
        }
        if self.created_before.is_some_and(|before| memory.created_at >= before) {
            return false;
        }
        if self
            .min_access_count
            .is_some_and(|floor| memory.access_count < floor)
        {
            return false;
        }
        if self
            .validated_before
            .is_some_and(|at| memory.last_validated.is_some_and(|v| v > at))
        {
            return false;
        }
        if self.never_validated && memory.last_validated.is_some() {
            return false;
        }
        self.include_archived || !memory.archived
    }

    /// Check if this query filters nothing beyond excluding archived memories
    pub fn is_empty(&self) -> bool {
        self.type_filter().is_none()
            && self.tag_filter().is_none()
            && self.min_confidence.is_none()
            && self.max_confidence.is_none()
            && self.importance_filter().is_none()
            && self.created_after.is_none()
            && self.created_before.is_none()
            && self.min_access_count.is_none()
            && self.validated_before.is_none()
            && !self.never_validated
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
