//! Validation candidate selection
//!
//! ```text
//! priority = (1 - confidence) * 0.4
//!          + importance_weight * 0.3
//!          + min(access_count / 100, 1) * 0.2
//!          + never_validated * 0.1
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::memory::types::{Importance, Memory};

const CONFIDENCE_FACTOR: f64 = 0.4;
const IMPORTANCE_FACTOR: f64 = 0.3;
const USAGE_FACTOR: f64 = 0.2;
const NEVER_VALIDATED_FACTOR: f64 = 0.1;
const USAGE_SATURATION: f64 = 100.0;

const LOW_CONFIDENCE_THRESHOLD: f64 = 0.5;
const FREQUENT_USE_THRESHOLD: i64 = 10;

/// Why a memory was picked for validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateReason {
    LowConfidence,
    NeverValidated,
    HighImportance,
    FrequentlyUsed,
}

impl CandidateReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateReason::LowConfidence => "low_confidence",
            CandidateReason::NeverValidated => "never_validated",
            CandidateReason::HighImportance => "high_importance",
            CandidateReason::FrequentlyUsed => "frequently_used",
        }
    }
}

/// Which memories are eligible for validation
#[derive(Debug, Clone)]
pub struct CandidateCriteria {
    pub min_confidence: f64,
    pub max_confidence: f64,
    /// Empty means every importance level
    pub importance: Vec<Importance>,
    /// Only memories at least this old
    pub min_age: Option<Duration>,
    pub only_never_validated: bool,
    pub limit: usize,
}

impl Default for CandidateCriteria {
    fn default() -> Self {
        Self {
            min_confidence: 0.0,
            max_confidence: 0.7,
            importance: Vec::new(),
            min_age: None,
            only_never_validated: false,
            limit: 10,
        }
    }
}

impl CandidateCriteria {
    pub fn with_confidence_range(mut self, min: f64, max: f64) -> Self {
        self.min_confidence = min;
        self.max_confidence = max;
        self
    }

    pub fn with_importance(mut self, importance: Vec<Importance>) -> Self {
        self.importance = importance;
        self
    }

    pub fn with_min_age(mut self, age: Duration) -> Self {
        self.min_age = Some(age);
        self
    }

    pub fn never_validated(mut self) -> Self {
        self.only_never_validated = true;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Checks everything except cooldown
    pub fn admits(&self, memory: &Memory, now: DateTime<Utc>) -> bool {
        if memory.archived {
            return false;
        }
        if !(memory.confidence >= self.min_confidence && memory.confidence <= self.max_confidence) {
            return false;
        }
        if !self.importance.is_empty() && !self.importance.contains(&memory.importance) {
            return false;
        }
        if self.min_age.is_some_and(|age| now - memory.created_at < age) {
            return false;
        }
        !(self.only_never_validated && memory.last_validated.is_some())
    }
}

/// A memory proposed for validation
#[derive(Debug, Clone)]
pub struct ValidationCandidate {
    pub memory: Memory,
    pub priority: f64,
    pub reasons: Vec<CandidateReason>,
    pub prompt: String,
}

/// Priority in [0, 1] for a memory with confidence in [0, 1]
pub fn priority(memory: &Memory) -> f64 {
    let confidence = memory.confidence.clamp(0.0, 1.0);
    let usage = (memory.access_count.max(0) as f64 / USAGE_SATURATION).min(1.0);
    let never_validated = if memory.last_validated.is_none() { 1.0 } else { 0.0 };

    (1.0 - confidence) * CONFIDENCE_FACTOR
        + memory.importance.weight() * IMPORTANCE_FACTOR
        + usage * USAGE_FACTOR
        + never_validated * NEVER_VALIDATED_FACTOR
}

pub fn reasons(memory: &Memory) -> Vec<CandidateReason> {
    let mut reasons = Vec::new();
    if memory.confidence < LOW_CONFIDENCE_THRESHOLD {
        reasons.push(CandidateReason::LowConfidence);
    }
    if memory.last_validated.is_none() {
        reasons.push(CandidateReason::NeverValidated);
    }
    if memory.importance >= Importance::High {
        reasons.push(CandidateReason::HighImportance);
    }
    if memory.access_count >= FREQUENT_USE_THRESHOLD {
        reasons.push(CandidateReason::FrequentlyUsed);
    }
    reasons
}

/// Descending priority, then id for a stable order
pub fn sort_by_priority(candidates: &mut [ValidationCandidate]) {
    candidates.sort_by(|a, b| {
        b.priority
            .total_cmp(&a.priority)
            .then_with(|| a.memory.id.cmp(&b.memory.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::content::{MemoryContent, TribalContent};

    fn memory(confidence: f64, importance: Importance, access_count: i64) -> Memory {
        let mut memory = Memory::new(MemoryContent::Tribal(TribalContent::default()))
            .with_confidence(confidence)
            .with_importance(importance);
        memory.access_count = access_count;
        memory
    }

    #[test]
    fn test_priority_formula() {
        let m = memory(0.5, Importance::Normal, 50);
        let expected = 0.5 * 0.4 + 0.5 * 0.3 + 0.5 * 0.2 + 0.1;
        assert!((priority(&m) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_priority_bounds() {
        let top = memory(0.0, Importance::Critical, 1_000);
        assert!((priority(&top) - 1.0).abs() < 1e-12);

        let mut bottom = memory(1.0, Importance::Low, 0);
        bottom.last_validated = Some(Utc::now());
        assert!((priority(&bottom) - 0.075).abs() < 1e-12);
    }

    #[test]
    fn test_negative_access_count_does_not_panic() {
        let m = memory(0.5, Importance::Normal, -4);
        assert!(priority(&m).is_finite());
    }

    #[test]
    fn test_reasons() {
        let m = memory(0.3, Importance::Critical, 25);
        assert_eq!(
            reasons(&m),
            vec![
                CandidateReason::LowConfidence,
                CandidateReason::NeverValidated,
                CandidateReason::HighImportance,
                CandidateReason::FrequentlyUsed,
            ]
        );

        let mut quiet = memory(0.9, Importance::Normal, 0);
        quiet.last_validated = Some(Utc::now());
        assert!(reasons(&quiet).is_empty());
    }

    #[test]
    fn test_criteria_admits() {
        let now = Utc::now();
        let criteria = CandidateCriteria::default();
        assert!(criteria.admits(&memory(0.5, Importance::Normal, 0), now));
        assert!(!criteria.admits(&memory(0.9, Importance::Normal, 0), now));
        assert!(!criteria.admits(&memory(f64::NAN, Importance::Normal, 0), now));

        let mut archived = memory(0.5, Importance::Normal, 0);
        archived.archived = true;
        assert!(!criteria.admits(&archived, now));

        let important_only = CandidateCriteria::default().with_importance(vec![Importance::High]);
        assert!(!important_only.admits(&memory(0.5, Importance::Normal, 0), now));

        let old_only = CandidateCriteria::default().with_min_age(Duration::days(30));
        assert!(!old_only.admits(&memory(0.5, Importance::Normal, 0), now));
        let old = memory(0.5, Importance::Normal, 0).created(now - Duration::days(31));
        assert!(old_only.admits(&old, now));

        let mut validated = memory(0.5, Importance::Normal, 0);
        validated.last_validated = Some(now);
        assert!(!CandidateCriteria::default().never_validated().admits(&validated, now));
    }
}
