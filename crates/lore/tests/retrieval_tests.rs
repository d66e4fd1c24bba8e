//! Integration tests for the retrieval pipeline
//!
//! Store → scorer → ranker → compressor, end to end.

use lore::config::Config;
use lore::memory::{Importance, MemoryType};
use lore::retrieval::{
    CompressionLevel, Intent, QueryContext, RelevanceScorer, ResultRanker, RetrievalPipeline,
    RetrievalRequest,
};
use lore::storage::MemoryStore;
use lore::testing::{MockEmbeddingModel, code_smell, core, semantic, tribal};

/// Test fixture: a fresh in-memory store
fn create_test_store() -> MemoryStore {
    MemoryStore::in_memory().unwrap()
}

/// Test fixture: pipeline with default scoring and the given diversity penalty
fn create_pipeline(store: &MemoryStore, diversity_penalty: f64) -> RetrievalPipeline {
    RetrievalPipeline::new(
        store.clone(),
        RelevanceScorer::default(),
        ResultRanker::new(diversity_penalty),
        2000,
        200,
    )
}

fn request(intent: Intent, focus: &str) -> RetrievalRequest {
    RetrievalRequest::new(QueryContext::new(intent, focus))
}

mod scoring_tests {
    use super::*;

    #[tokio::test]
    async fn test_intent_changes_the_winner() {
        let store = create_test_store();
        store
            .create_many(vec![
                tribal("retries", "the payment API drops the first request"),
                semantic("payments settle overnight"),
            ])
            .await
            .unwrap();
        let pipeline = create_pipeline(&store, 0.0);

        let fixing = pipeline.retrieve(&request(Intent::FixBug, "")).await.unwrap();
        assert_eq!(fixing.memories[0].memory.type_name(), "tribal");

        let learning = pipeline.retrieve(&request(Intent::Learn, "")).await.unwrap();
        assert_eq!(learning.memories[0].memory.type_name(), "semantic");
    }

    #[tokio::test]
    async fn test_focus_overlap_lifts_matching_memory() {
        let store = create_test_store();
        store
            .create_many(vec![
                semantic("frontend uses a design system"),
                semantic("database pool size is capped at ten"),
            ])
            .await
            .unwrap();
        let pipeline = create_pipeline(&store, 0.0);

        let result = pipeline
            .retrieve(&request(Intent::General, "database pool"))
            .await
            .unwrap();
        assert!(result.memories[0].memory.summary.contains("database"));
        assert!(result.memories[0].score > result.memories[1].score);
    }

    #[tokio::test]
    async fn test_scores_stay_in_unit_range() {
        let store = create_test_store();
        store
            .create_many(vec![
                core("lore", "memory engine"),
                tribal("a", "b").with_confidence(0.0),
                code_smell("c", "d").with_confidence(1.0),
            ])
            .await
            .unwrap();
        let pipeline = create_pipeline(&store, 0.05);

        for intent in Intent::ALL {
            let result = pipeline.retrieve(&request(intent, "lore memory")).await.unwrap();
            for m in &result.memories {
                assert!((0.0..=1.0).contains(&m.score), "{intent}: {}", m.score);
            }
        }
    }
}

mod ranking_tests {
    use super::*;

    #[tokio::test]
    async fn test_diversity_penalty_interleaves_types() {
        let store = create_test_store();
        let mut memories: Vec<_> = (0..4)
            .map(|i| tribal(&format!("topic {i}"), "knowledge"))
            .collect();
        memories.push(code_smell("god object", "too many responsibilities"));
        store.create_many(memories).await.unwrap();

        let plain = create_pipeline(&store, 0.0)
            .retrieve(&request(Intent::FixBug, ""))
            .await
            .unwrap();
        assert_eq!(plain.memories.last().unwrap().memory.type_name(), "code_smell");

        let diverse = create_pipeline(&store, 0.2)
            .retrieve(&request(Intent::FixBug, ""))
            .await
            .unwrap();
        assert_eq!(diverse.memories[1].memory.type_name(), "code_smell");
        assert!(
            diverse
                .memories
                .iter()
                .all(|m| m.effective_score <= m.score)
        );
    }

    #[tokio::test]
    async fn test_retrieval_is_deterministic() {
        let store = create_test_store();
        store
            .create_many((0..10).map(|i| semantic(&format!("fact number {i}"))).collect())
            .await
            .unwrap();
        let pipeline = create_pipeline(&store, 0.05);

        let first: Vec<String> = pipeline
            .retrieve(&request(Intent::Recall, "fact"))
            .await
            .unwrap()
            .memories
            .into_iter()
            .map(|m| m.memory.id)
            .collect();
        let second: Vec<String> = pipeline
            .retrieve(&request(Intent::Recall, "fact"))
            .await
            .unwrap()
            .memories
            .into_iter()
            .map(|m| m.memory.id)
            .collect();
        let mut a = first.clone();
        let mut b = second.clone();
        a.sort();
        b.sort();
        assert_eq!(a, b);
    }
}

mod budget_tests {
    use super::*;

    #[tokio::test]
    async fn test_results_fit_the_budget() {
        let store = create_test_store();
        let long = "the ingestion worker batches writes and flushes every few seconds ".repeat(10);
        store
            .create_many((0..20).map(|i| tribal(&format!("worker {i}"), &long)).collect())
            .await
            .unwrap();
        let pipeline = create_pipeline(&store, 0.05);

        let result = pipeline
            .retrieve(&request(Intent::General, "ingestion").with_budget(120))
            .await
            .unwrap();

        assert!(!result.memories.is_empty());
        assert!(result.tokens_used <= 120);
        assert_eq!(result.budget, 120);
        assert_eq!(result.candidates, 20);
        assert!(
            result
                .memories
                .iter()
                .all(|m| !m.compressed.expanded.is_empty())
        );
    }

    #[tokio::test]
    async fn test_generous_budget_gets_full_detail() {
        let store = create_test_store();
        store
            .create(tribal("cache", "invalidate on write").with_importance(Importance::Critical))
            .await
            .unwrap();
        let pipeline = create_pipeline(&store, 0.05);

        let result = pipeline
            .retrieve(&request(Intent::General, "cache").with_budget(5000))
            .await
            .unwrap();
        assert_eq!(result.memories[0].compressed.level, CompressionLevel::L3);
        assert!(result.render().contains("invalidate on write"));
    }

    #[tokio::test]
    async fn test_zero_budget_returns_nothing() {
        let store = create_test_store();
        store.create(semantic("anything")).await.unwrap();
        let pipeline = create_pipeline(&store, 0.05);

        let result = pipeline
            .retrieve(&request(Intent::General, "").with_budget(0))
            .await
            .unwrap();
        assert!(result.memories.is_empty());
        assert_eq!(result.tokens_used, 0);
    }

    #[tokio::test]
    async fn test_empty_store() {
        let pipeline = create_pipeline(&create_test_store(), 0.05);
        let result = pipeline.retrieve(&request(Intent::General, "x")).await.unwrap();
        assert!(result.memories.is_empty());
        assert_eq!(result.render(), "");
    }
}

mod pipeline_tests {
    use super::*;

    #[tokio::test]
    async fn test_retrieval_counts_as_access() {
        let store = create_test_store();
        let created = store.create(semantic("read me")).await.unwrap();
        let pipeline = create_pipeline(&store, 0.05);

        let result = pipeline.retrieve(&request(Intent::General, "")).await.unwrap();
        assert_eq!(result.memories[0].memory.access_count, 1);

        let stored = store.peek(&created.id).await.unwrap().unwrap();
        assert_eq!(stored.access_count, 1);
        assert!(stored.last_accessed.is_some());
    }

    #[tokio::test]
    async fn test_type_and_tag_filters() {
        let store = create_test_store();
        store
            .create_many(vec![
                tribal("a", "b").with_tags(["backend"]),
                semantic("c").with_tags(["backend"]),
                semantic("d").with_tags(["frontend"]),
            ])
            .await
            .unwrap();
        let pipeline = create_pipeline(&store, 0.05);

        let semantic_only = pipeline
            .retrieve(&request(Intent::General, "").with_types(vec![MemoryType::Semantic]))
            .await
            .unwrap();
        assert_eq!(semantic_only.memories.len(), 2);

        let backend = pipeline
            .retrieve(
                &request(Intent::General, "")
                    .with_types(vec![MemoryType::Semantic])
                    .with_tags(["backend"]),
            )
            .await
            .unwrap();
        assert_eq!(backend.memories.len(), 1);
    }

    #[tokio::test]
    async fn test_archived_memories_are_never_retrieved() {
        let store = create_test_store();
        let created = store.create(semantic("retired fact")).await.unwrap();
        store.delete(&created.id).await.unwrap();

        let result = create_pipeline(&store, 0.05)
            .retrieve(&request(Intent::General, "retired"))
            .await
            .unwrap();
        assert!(result.memories.is_empty());
    }

    #[tokio::test]
    async fn test_embedding_seed_uses_vector_index() {
        let store = create_test_store();
        let model = MockEmbeddingModel::new();
        for text in ["database connection pool", "button hover colour"] {
            let memory = store.create(semantic(text)).await.unwrap();
            store.upsert_embedding(&memory.id, &model.embed(text)).await.unwrap();
        }
        let pipeline = create_pipeline(&store, 0.05);

        let result = pipeline
            .retrieve(
                &request(Intent::General, "database")
                    .with_embedding(model.embed("database connection")),
            )
            .await
            .unwrap();
        assert!(!result.degraded);
        assert!(result.memories[0].memory.summary.contains("database"));
    }

    #[tokio::test]
    async fn test_embedding_seed_degrades_without_backend() {
        let store = create_test_store().without_vector_backend();
        store.create(semantic("still here")).await.unwrap();
        let pipeline = create_pipeline(&store, 0.05);

        let result = pipeline
            .retrieve(&request(Intent::General, "").with_embedding(vec![0.5; 8]))
            .await
            .unwrap();
        assert!(result.degraded);
        assert_eq!(result.memories.len(), 1);
    }

    #[tokio::test]
    async fn test_from_config_uses_configured_budget() {
        let store = create_test_store();
        store.create(semantic("configured")).await.unwrap();
        let mut config = Config::default();
        config.retrieval.token_budget = 3;

        let result = RetrievalPipeline::from_config(store, &config)
            .retrieve(&request(Intent::General, ""))
            .await
            .unwrap();
        assert_eq!(result.budget, 3);
        assert!(result.tokens_used <= 3);
    }
}
