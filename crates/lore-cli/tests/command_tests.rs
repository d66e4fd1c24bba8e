//! Command tests against an on-disk store in a temporary directory

use clap::Parser;
use lore::config::Config;
use lore::storage::{MemoryQuery, MemoryStore};
use lore_cli::commands::{LearnCommand, MemoryCommand, RetrieveCommand, SearchCommand, StatsCommand};
use lore_cli::output::OutputFormat;
use tempfile::TempDir;

/// Test fixture: config pointing at a fresh temp dir, and the store it opens
fn create_test_store() -> (TempDir, Config, MemoryStore) {
    let dir = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.data_dir = dir.path().to_path_buf();
    let store = MemoryStore::from_config(&config).unwrap();
    (dir, config, store)
}

fn memory_cmd(args: &[&str]) -> MemoryCommand {
    MemoryCommand::parse_from(std::iter::once("memory").chain(args.iter().copied()))
}

mod memory_tests {
    use super::*;

    #[tokio::test]
    async fn test_add_then_list_and_show() {
        let (_dir, _config, store) = create_test_store();

        memory_cmd(&[
            "add",
            "never force-push to main",
            "--type",
            "tribal",
            "--importance",
            "high",
            "--tags",
            "git, workflow",
        ])
        .execute(&store, OutputFormat::Json)
        .await
        .unwrap();

        let memories = store.search(&MemoryQuery::new()).await.unwrap();
        assert_eq!(memories.len(), 1);
        let memory = &memories[0];
        assert_eq!(memory.type_name(), "tribal");
        assert!(memory.content.text().contains("force-push"));
        assert!(memory.tags.contains("git"));

        memory_cmd(&["list"]).execute(&store, OutputFormat::Table).await.unwrap();
        memory_cmd(&["show", &memory.id])
            .execute(&store, OutputFormat::Table)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_add_with_payload() {
        let (_dir, _config, store) = create_test_store();

        memory_cmd(&[
            "add",
            "ignored",
            "--type",
            "procedural",
            "--payload",
            r#"{"title":"release","steps":["tag","publish"]}"#,
        ])
        .execute(&store, OutputFormat::Json)
        .await
        .unwrap();

        let memories = store.search(&MemoryQuery::new()).await.unwrap();
        assert!(memories[0].content.text().contains("publish"));
    }

    #[tokio::test]
    async fn test_unknown_type_is_rejected() {
        let (_dir, _config, store) = create_test_store();

        let result = memory_cmd(&["add", "x", "--type", "gossip"])
            .execute(&store, OutputFormat::Json)
            .await;
        assert!(result.is_err());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_history_and_delete() {
        let (_dir, _config, store) = create_test_store();
        let created = store
            .create(lore::testing::semantic("the build takes ten minutes"))
            .await
            .unwrap();

        memory_cmd(&["update", &created.id, "--confidence", "0.4"])
            .execute(&store, OutputFormat::Json)
            .await
            .unwrap();
        assert_eq!(store.history(&created.id).await.unwrap().len(), 2);

        memory_cmd(&["history", &created.id])
            .execute(&store, OutputFormat::Table)
            .await
            .unwrap();

        memory_cmd(&["delete", &created.id])
            .execute(&store, OutputFormat::Json)
            .await
            .unwrap();
        assert!(store.peek(&created.id).await.unwrap().unwrap().archived);

        memory_cmd(&["archive-hard", &created.id])
            .execute(&store, OutputFormat::Json)
            .await
            .unwrap();
        assert!(store.peek(&created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_update_is_an_error() {
        let (_dir, _config, store) = create_test_store();
        let created = store.create(lore::testing::semantic("x")).await.unwrap();

        let result = memory_cmd(&["update", &created.id])
            .execute(&store, OutputFormat::Json)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_relate_and_related() {
        let (_dir, _config, store) = create_test_store();
        let a = store.create(lore::testing::semantic("a")).await.unwrap();
        let b = store.create(lore::testing::semantic("b")).await.unwrap();

        memory_cmd(&["relate", &a.id, &b.id, "--kind", "supports"])
            .execute(&store, OutputFormat::Json)
            .await
            .unwrap();

        let related = store.get_related(&a.id, &[], 1).await.unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].memory.id, b.id);

        memory_cmd(&["related", &a.id, "--depth", "2"])
            .execute(&store, OutputFormat::Table)
            .await
            .unwrap();
    }
}

mod query_tests {
    use super::*;

    #[tokio::test]
    async fn test_search_retrieve_and_stats() {
        let (_dir, config, store) = create_test_store();
        store
            .create_many(vec![
                lore::testing::tribal("deploys", "deploys freeze on fridays"),
                lore::testing::semantic("the api is versioned"),
            ])
            .await
            .unwrap();

        SearchCommand::parse_from(["search", "--type", "tribal", "--valid-at", "2999-01-01"])
            .execute(&store, OutputFormat::Json)
            .await
            .unwrap();

        RetrieveCommand::parse_from(["retrieve", "deploys", "--intent", "deploy-migrate"])
            .execute(&store, &config, OutputFormat::Table)
            .await
            .unwrap();

        StatsCommand::parse_from(["stats"])
            .execute(&store, OutputFormat::Table)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bad_timestamp_is_an_error() {
        let (_dir, _config, store) = create_test_store();
        let result = SearchCommand::parse_from(["search", "--as-of", "yesterday"])
            .execute(&store, OutputFormat::Json)
            .await;
        assert!(result.is_err());
    }
}

mod learn_tests {
    use super::*;

    #[tokio::test]
    async fn test_reject_via_cli_lowers_confidence() {
        let (_dir, config, store) = create_test_store();
        let created = store
            .create(lore::testing::semantic("tabs over spaces").with_confidence(0.5))
            .await
            .unwrap();

        LearnCommand::parse_from(["learn", "candidates"])
            .execute(&store, &config, OutputFormat::Json)
            .await
            .unwrap();

        LearnCommand::parse_from(["learn", "reject", created.id.as_str()])
            .execute(&store, &config, OutputFormat::Table)
            .await
            .unwrap();

        let stored = store.peek(&created.id).await.unwrap().unwrap();
        assert!(stored.confidence < 0.5);
        assert!(stored.last_validated.is_some());
    }

    #[tokio::test]
    async fn test_modify_unknown_id_reports_without_failing() {
        let (_dir, config, store) = create_test_store();

        LearnCommand::parse_from(["learn", "modify", "missing", "new summary"])
            .execute(&store, &config, OutputFormat::Json)
            .await
            .unwrap();
    }
}
