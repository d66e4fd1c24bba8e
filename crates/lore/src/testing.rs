//! Test utilities for lore: memory fixtures, a mock embedder and
//! misbehaving vector backends

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{LoreError, Result};
use crate::memory::content::{
    CodeSmellContent, ConstraintOverrideContent, CoreContent, DecisionContextContent,
    EpisodicContent, MemoryContent, PatternRationaleContent, ProceduralContent, SemanticContent,
    Severity, TribalContent,
};
use crate::memory::types::{Importance, Memory};
use crate::storage::vector::{VectorBackend, VectorHit};

/// Dimensions produced by [`MockEmbeddingModel`]
pub const MOCK_DIMENSIONS: usize = 64;

pub fn tribal(topic: &str, knowledge: &str) -> Memory {
    Memory::new(MemoryContent::Tribal(TribalContent {
        topic: topic.to_string(),
        knowledge: knowledge.to_string(),
        severity: Severity::Warning,
        ..Default::default()
    }))
}

pub fn core(project: &str, description: &str) -> Memory {
    Memory::new(MemoryContent::Core(CoreContent {
        project_name: project.to_string(),
        description: description.to_string(),
        ..Default::default()
    }))
    .with_importance(Importance::Critical)
}

pub fn procedural(title: &str, steps: &[&str]) -> Memory {
    Memory::new(MemoryContent::Procedural(ProceduralContent {
        title: title.to_string(),
        steps: steps.iter().map(|s| s.to_string()).collect(),
        ..Default::default()
    }))
}

pub fn semantic(knowledge: &str) -> Memory {
    Memory::new(MemoryContent::Semantic(SemanticContent {
        knowledge: knowledge.to_string(),
        ..Default::default()
    }))
}

pub fn episodic(interaction: &str) -> Memory {
    Memory::new(MemoryContent::Episodic(EpisodicContent {
        interaction: interaction.to_string(),
        ..Default::default()
    }))
}

pub fn pattern_rationale(pattern: &str, rationale: &str) -> Memory {
    Memory::new(MemoryContent::PatternRationale(PatternRationaleContent {
        pattern_name: pattern.to_string(),
        rationale: rationale.to_string(),
        ..Default::default()
    }))
}

pub fn constraint_override(constraint: &str, reason: &str) -> Memory {
    Memory::new(MemoryContent::ConstraintOverride(ConstraintOverrideContent {
        constraint_name: constraint.to_string(),
        override_reason: reason.to_string(),
        ..Default::default()
    }))
}

pub fn decision_context(summary: &str, context: &str) -> Memory {
    Memory::new(MemoryContent::DecisionContext(DecisionContextContent {
        decision_summary: summary.to_string(),
        business_context: context.to_string(),
        ..Default::default()
    }))
}

pub fn code_smell(pattern: &str, reason: &str) -> Memory {
    Memory::new(MemoryContent::CodeSmell(CodeSmellContent {
        pattern: pattern.to_string(),
        reason: reason.to_string(),
        ..Default::default()
    }))
}

/// Deterministic bag-of-words embeddings for tests that don't need a real model.
///
/// Each token lands in a hashed bucket, so texts sharing words point in
/// similar directions. Vectors are unit length unless the text has no tokens.
#[derive(Debug, Clone, Default)]
pub struct MockEmbeddingModel;

impl MockEmbeddingModel {
    pub fn new() -> Self {
        Self
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; MOCK_DIMENSIONS];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let bucket = (hasher.finish() % MOCK_DIMENSIONS as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }

    pub fn embed_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }
}

/// Backend whose every call fails
#[derive(Debug, Default)]
pub struct FailingVectorBackend;

#[async_trait]
impl VectorBackend for FailingVectorBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn upsert(&self, _memory_id: &str, _embedding: &[f32]) -> Result<()> {
        Err(LoreError::Task("vector backend unavailable".to_string()))
    }

    async fn search(&self, _query: &[f32], _limit: usize, _threshold: f32) -> Result<Vec<VectorHit>> {
        Err(LoreError::Task("vector backend unavailable".to_string()))
    }
}

/// Backend that sleeps before answering, for timeout tests
#[derive(Debug)]
pub struct SlowVectorBackend {
    pub delay: Duration,
}

#[async_trait]
impl VectorBackend for SlowVectorBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn upsert(&self, _memory_id: &str, _embedding: &[f32]) -> Result<()> {
        tokio::time::sleep(self.delay).await;
        Ok(())
    }

    async fn search(&self, _query: &[f32], _limit: usize, _threshold: f32) -> Result<Vec<VectorHit>> {
        tokio::time::sleep(self.delay).await;
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::vector::cosine_similarity;

    #[test]
    fn mock_embedding_is_deterministic() {
        let model = MockEmbeddingModel::new();
        assert_eq!(model.embed("hello world"), model.embed("hello world"));
    }

    #[test]
    fn mock_embedding_has_correct_dimensions() {
        let model = MockEmbeddingModel::new();
        assert_eq!(model.embed("test").len(), MOCK_DIMENSIONS);
    }

    #[test]
    fn mock_embedding_is_unit_length() {
        let model = MockEmbeddingModel::new();
        let emb = model.embed("retry the database connection");
        let norm = emb.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert!(model.embed("   ").iter().all(|v| *v == 0.0));
    }

    #[test]
    fn mock_embedding_shared_words_are_closer() {
        let model = MockEmbeddingModel::new();
        let base = model.embed("database connection pool");
        let near = model.embed("database connection timeout");
        let far = model.embed("frontend button colour");
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn fixtures_cover_every_known_type() {
        let names: Vec<String> = [
            core("p", "d"),
            tribal("t", "k"),
            procedural("t", &["a"]),
            semantic("k"),
            episodic("i"),
            pattern_rationale("p", "r"),
            constraint_override("c", "r"),
            decision_context("s", "c"),
            code_smell("p", "r"),
        ]
        .iter()
        .map(|m| m.type_name().to_string())
        .collect();
        assert_eq!(names.len(), 9);
        assert!(names.iter().all(|n| !n.is_empty()));
    }
}
