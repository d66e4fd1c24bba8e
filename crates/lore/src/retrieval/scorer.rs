//! Relevance scoring
//!
//! ```text
//! base  = (cw * final_confidence + tw * topic_overlap) / (cw + tw)
//! score = base * intent_weight / MAX_INTENT_WEIGHT
//! ```
//!
//! Scores lie in [0, 1] for finite inputs. NaN confidence yields a NaN score.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::config::RetrievalConfig;
use crate::memory::decay::{DecayCalculator, DecayConfig};
use crate::memory::types::Memory;
use crate::retrieval::intent::{Intent, IntentWeights, MAX_INTENT_WEIGHT};

/// What a retrieval is for
#[derive(Debug, Clone, Default)]
pub struct QueryContext {
    pub intent: Intent,
    /// Free text the caller is focused on (file name, symbol, question)
    pub focus: String,
}

impl QueryContext {
    pub fn new(intent: Intent, focus: impl Into<String>) -> Self {
        Self {
            intent,
            focus: focus.into(),
        }
    }
}

/// Per-term breakdown of a score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreBreakdown {
    pub final_confidence: f64,
    pub topic_overlap: f64,
    pub intent_weight: f64,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    decay: DecayCalculator,
    weights: IntentWeights,
    confidence_weight: f64,
    topic_weight: f64,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(
            DecayCalculator::default(),
            IntentWeights::default(),
            &RetrievalConfig::default(),
        )
    }
}

impl RelevanceScorer {
    pub fn new(decay: DecayCalculator, weights: IntentWeights, config: &RetrievalConfig) -> Self {
        Self {
            decay,
            weights,
            confidence_weight: config.confidence_weight,
            topic_weight: config.topic_weight,
        }
    }

    pub fn from_config(decay: &DecayConfig, retrieval: &RetrievalConfig) -> Self {
        Self::new(
            DecayCalculator::new(decay.clone()),
            IntentWeights::default(),
            retrieval,
        )
    }

    pub fn intent_weights(&self) -> &IntentWeights {
        &self.weights
    }

    pub fn score(&self, memory: &Memory, context: &QueryContext) -> f64 {
        self.explain_at(memory, context, Utc::now()).score
    }

    pub fn score_at(&self, memory: &Memory, context: &QueryContext, now: DateTime<Utc>) -> f64 {
        self.explain_at(memory, context, now).score
    }

    pub fn explain_at(
        &self,
        memory: &Memory,
        context: &QueryContext,
        now: DateTime<Utc>,
    ) -> ScoreBreakdown {
        let final_confidence = self.decay.calculate_at(memory, now).final_confidence;
        let topic_overlap = topic_overlap(&context.focus, &memory.searchable_text());
        let intent_weight = self.weights.weight(context.intent, memory.type_name());

        let total = self.confidence_weight + self.topic_weight;
        let base = if total > 0.0 {
            (self.confidence_weight * final_confidence + self.topic_weight * topic_overlap) / total
        } else {
            final_confidence
        };
        // clamp keeps NaN as NaN
        let score = (base * intent_weight / MAX_INTENT_WEIGHT).clamp(0.0, 1.0);

        ScoreBreakdown {
            final_confidence,
            topic_overlap,
            intent_weight,
            score,
        }
    }
}

/// Fraction of focus tokens found in `text`; 0.0 for a blank focus
pub fn topic_overlap(focus: &str, text: &str) -> f64 {
    let focus_tokens: HashSet<String> = tokenize(focus).collect();
    if focus_tokens.is_empty() {
        return 0.0;
    }
    let text_tokens: HashSet<String> = tokenize(text).collect();
    let matches = focus_tokens
        .iter()
        .filter(|t| text_tokens.contains(*t))
        .count();
    matches as f64 / focus_tokens.len() as f64
}

/// Lowercased alphanumeric runs of two or more characters
fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::content::{CodeSmellContent, MemoryContent, TribalContent};

    fn tribal(knowledge: &str, confidence: f64) -> Memory {
        Memory::new(MemoryContent::Tribal(TribalContent {
            topic: "payments".into(),
            knowledge: knowledge.into(),
            ..Default::default()
        }))
        .with_confidence(confidence)
    }

    #[test]
    fn test_topic_overlap() {
        assert_eq!(topic_overlap("retry logic", "the retry logic is flaky"), 1.0);
        assert_eq!(topic_overlap("retry cache", "the retry logic is flaky"), 0.5);
        assert_eq!(topic_overlap("Retry", "RETRY"), 1.0);
        assert_eq!(topic_overlap("", "anything"), 0.0);
        assert_eq!(topic_overlap("   ", "anything"), 0.0);
        assert_eq!(topic_overlap("x", "x"), 0.0);
    }

    #[test]
    fn test_blank_focus_scores_in_range() {
        let scorer = RelevanceScorer::default();
        let memory = tribal("refunds go through the ledger", 0.9);
        let now = memory.created_at;
        for focus in ["", "   ", "\t\n"] {
            let score = scorer.score_at(&memory, &QueryContext::new(Intent::General, focus), now);
            assert!((0.0..=1.0).contains(&score), "{score}");
        }
    }

    #[test]
    fn test_fresh_memory_general_intent() {
        let scorer = RelevanceScorer::default();
        let memory = tribal("refunds go through the ledger", 1.0);
        let now = memory.created_at;
        let breakdown =
            scorer.explain_at(&memory, &QueryContext::new(Intent::General, "ledger"), now);
        assert!((breakdown.final_confidence - 1.0).abs() < 1e-9);
        assert_eq!(breakdown.topic_overlap, 1.0);
        assert_eq!(breakdown.intent_weight, 1.0);
        assert!((breakdown.score - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_intent_boosts_matching_type() {
        let scorer = RelevanceScorer::default();
        let tribal = tribal("flaky retry", 0.8);
        let smell = Memory::new(MemoryContent::CodeSmell(CodeSmellContent {
            pattern: "flaky retry".into(),
            ..Default::default()
        }))
        .with_confidence(0.8);
        let context = QueryContext::new(Intent::FixBug, "flaky retry");
        let now = tribal.created_at.max(smell.created_at);

        assert!(scorer.score_at(&tribal, &context, now) > scorer.score_at(&smell, &context, now));
    }

    #[test]
    fn test_nan_confidence_propagates() {
        let scorer = RelevanceScorer::default();
        let memory = tribal("x", f64::NAN);
        let score = scorer.score_at(&memory, &QueryContext::default(), memory.created_at);
        assert!(score.is_nan());
    }
}
