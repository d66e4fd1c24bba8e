//! Integration tests for the active learning loop

use chrono::{Duration, Utc};
use lore::config::LearningConfig;
use lore::learning::{
    ActiveLearningLoop, CandidateCriteria, CandidateReason, FeedbackAction, FeedbackKind,
    USER_REJECTED,
};
use lore::memory::Importance;
use lore::storage::{MemoryQuery, MemoryStore};
use lore::testing::{semantic, tribal};

/// Test fixture: a fresh in-memory store
fn create_test_store() -> MemoryStore {
    MemoryStore::in_memory().unwrap()
}

/// Test fixture: learning loop with default settings
fn create_loop(store: &MemoryStore) -> ActiveLearningLoop {
    ActiveLearningLoop::new(store.clone(), LearningConfig::default())
}

mod feedback_tests {
    use super::*;

    #[tokio::test]
    async fn test_repeated_rejection_archives() {
        let store = create_test_store();
        let memory = store
            .create(tribal("builds", "always run make clean first").with_confidence(0.8))
            .await
            .unwrap();
        let learner = create_loop(&store);

        let first = learner.reject(&memory.id).await.unwrap();
        assert!(first.success);
        assert!((first.new_confidence.unwrap() - 0.4).abs() < 1e-9);
        assert!(!first.archived);

        let second = learner.reject(&memory.id).await.unwrap();
        assert!((second.new_confidence.unwrap() - 0.2).abs() < 1e-9);
        assert!(!second.archived);

        let third = learner.reject(&memory.id).await.unwrap();
        assert!((third.new_confidence.unwrap() - 0.1).abs() < 1e-9);
        assert!(third.archived);

        let stored = store.peek(&memory.id).await.unwrap().unwrap();
        assert!(stored.archived);
        assert_eq!(stored.archive_reason.as_deref(), Some(USER_REJECTED));
        assert!(store.search(&MemoryQuery::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_confirm_raises_and_caps_confidence() {
        let store = create_test_store();
        let memory = store
            .create(semantic("the queue is FIFO").with_confidence(0.95))
            .await
            .unwrap();
        let learner = create_loop(&store);

        let outcome = learner.confirm(&memory.id).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.previous_confidence, Some(0.95));
        assert_eq!(outcome.new_confidence, Some(1.0));

        let stored = store.peek(&memory.id).await.unwrap().unwrap();
        assert_eq!(stored.confidence, 1.0);
        assert!(stored.last_validated.is_some());
    }

    #[tokio::test]
    async fn test_modify_rewrites_summary() {
        let store = create_test_store();
        let memory = store
            .create(semantic("logs rotate weekly").with_confidence(0.5))
            .await
            .unwrap();
        let learner = create_loop(&store);

        let outcome = learner
            .modify(&memory.id, "logs rotate daily since the disk upgrade")
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.action, FeedbackKind::Modify);

        let stored = store.peek(&memory.id).await.unwrap().unwrap();
        assert_eq!(stored.summary, "logs rotate daily since the disk upgrade");
        assert_eq!(stored.id, memory.id);
        assert!(stored.confidence > 0.5);
    }

    #[tokio::test]
    async fn test_modify_with_blank_summary_is_an_error() {
        let store = create_test_store();
        let memory = store.create(semantic("x")).await.unwrap();
        let learner = create_loop(&store);

        let err = learner.modify(&memory.id, "   ").await.unwrap_err();
        assert!(err.is_validation());
        assert!(store.validations(&memory.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_memory_reports_failure() {
        let learner = create_loop(&create_test_store());

        let outcome = learner
            .apply("no-such-memory", FeedbackAction::Confirm)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.message.is_some());
        assert!(outcome.new_confidence.is_none());
    }

    #[tokio::test]
    async fn test_feedback_is_audited_and_versioned() {
        let store = create_test_store();
        let memory = store
            .create(semantic("audited").with_confidence(0.6))
            .await
            .unwrap();
        let learner = create_loop(&store);

        learner.confirm(&memory.id).await.unwrap();
        learner.reject(&memory.id).await.unwrap();

        let records = store.validations(&memory.id).await.unwrap();
        let actions: Vec<&str> = records.iter().map(|r| r.action.as_str()).collect();
        assert_eq!(actions, vec!["confirm", "reject"]);
        assert!((records[0].previous_confidence - 0.6).abs() < 1e-9);
        assert!((records[1].previous_confidence - records[0].new_confidence).abs() < 1e-9);

        assert_eq!(store.history(&memory.id).await.unwrap().len(), 3);
    }
}

mod candidate_tests {
    use super::*;

    #[tokio::test]
    async fn test_candidates_sorted_by_priority() {
        let store = create_test_store();
        store
            .create_many(vec![
                semantic("solid").with_confidence(0.65),
                semantic("shaky")
                    .with_confidence(0.2)
                    .with_importance(Importance::Critical),
                semantic("middling").with_confidence(0.5),
                semantic("trusted").with_confidence(0.95),
            ])
            .await
            .unwrap();
        let learner = create_loop(&store);

        let candidates = learner
            .select_candidates(&learner.default_criteria())
            .await
            .unwrap();

        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0].memory.summary, "shaky");
        assert!(candidates.windows(2).all(|w| w[0].priority >= w[1].priority));
        assert!(candidates[0].reasons.contains(&CandidateReason::LowConfidence));
        assert!(candidates[0].reasons.contains(&CandidateReason::HighImportance));
        assert!(candidates[0].prompt.contains("shaky"));
    }

    #[tokio::test]
    async fn test_feedback_starts_cooldown() {
        let store = create_test_store();
        let memory = store
            .create(semantic("cool me down").with_confidence(0.3))
            .await
            .unwrap();
        let learner = create_loop(&store);
        let criteria = CandidateCriteria::default();

        assert_eq!(learner.select_candidates(&criteria).await.unwrap().len(), 1);

        learner.reject(&memory.id).await.unwrap();
        assert!(learner.is_cooling(&memory.id).unwrap());
        assert!(learner.select_candidates(&criteria).await.unwrap().is_empty());

        let later = Utc::now() + Duration::hours(25);
        let candidates = learner.select_candidates_at(&criteria, later).await.unwrap();
        assert_eq!(candidates.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_validation_survives_new_loop() {
        let store = create_test_store();
        let memory = store
            .create(semantic("validated elsewhere").with_confidence(0.3))
            .await
            .unwrap();
        create_loop(&store).reject(&memory.id).await.unwrap();

        let fresh = create_loop(&store);
        assert!(!fresh.is_cooling(&memory.id).unwrap());
        assert!(
            fresh
                .select_candidates(&CandidateCriteria::default())
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_priority_outranks_low_confidence_crowd() {
        let store = create_test_store();
        let mut batch: Vec<_> = (0..300)
            .map(|i| {
                semantic(&format!("minor {i}"))
                    .with_confidence(0.3)
                    .with_importance(Importance::Low)
            })
            .collect();
        batch.push(
            semantic("critical one")
                .with_confidence(0.6)
                .with_importance(Importance::Critical),
        );
        store.create_many(batch).await.unwrap();
        let learner = create_loop(&store);

        let top = learner
            .select_candidates(&CandidateCriteria::default().with_limit(1))
            .await
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].memory.summary, "critical one");
        assert!((top[0].priority - 0.56).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_cooling_memories_do_not_starve_eligible_ones() {
        let store = create_test_store();
        let mut ids = Vec::new();
        for i in 0..5 {
            let memory = store
                .create(semantic(&format!("recently confirmed {i}")).with_confidence(0.4))
                .await
                .unwrap();
            ids.push(memory.id);
        }
        store
            .create(semantic("never asked").with_confidence(0.6))
            .await
            .unwrap();
        let learner = create_loop(&store);
        for id in &ids {
            learner.confirm(id).await.unwrap();
        }

        let top = learner
            .select_candidates(&CandidateCriteria::default().with_limit(1))
            .await
            .unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].memory.summary, "never asked");

        // A fresh loop has no in-memory cooldown; the stored validation time
        // still excludes the confirmed memories.
        let fresh = create_loop(&store);
        let all = fresh
            .select_candidates(&CandidateCriteria::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].memory.summary, "never asked");
    }

    #[tokio::test]
    async fn test_criteria_filters() {
        let store = create_test_store();
        let now = Utc::now();
        store
            .create_many(vec![
                semantic("old and important")
                    .with_confidence(0.4)
                    .with_importance(Importance::High)
                    .created(now - Duration::days(60)),
                semantic("new and important")
                    .with_confidence(0.4)
                    .with_importance(Importance::High),
                semantic("old and minor")
                    .with_confidence(0.4)
                    .with_importance(Importance::Low)
                    .created(now - Duration::days(60)),
            ])
            .await
            .unwrap();
        let learner = create_loop(&store);

        let criteria = CandidateCriteria::default()
            .with_importance(vec![Importance::High, Importance::Critical])
            .with_min_age(Duration::days(30));
        let candidates = learner.select_candidates(&criteria).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].memory.summary, "old and important");
    }

    #[tokio::test]
    async fn test_limit_is_respected() {
        let store = create_test_store();
        store
            .create_many(
                (0..8)
                    .map(|i| semantic(&format!("candidate {i}")).with_confidence(0.1 * i as f64 / 2.0))
                    .collect(),
            )
            .await
            .unwrap();
        let learner = create_loop(&store);

        let top = learner
            .select_candidates(&CandidateCriteria::default().with_limit(3))
            .await
            .unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(top[0].memory.summary, "candidate 0");

        let none = learner
            .select_candidates(&CandidateCriteria::default().with_limit(0))
            .await
            .unwrap();
        assert!(none.is_empty());
    }
}
