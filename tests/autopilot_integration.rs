//! Integration tests for the context autopilot
//!
//! These drive the public API end to end: stored decisions, conversations and
//! extracted items flow through scoring, filtering, compression and health
//! assessment.

use chrono::{Duration, Utc};
use context_autopilot::autopilot::{ConversationRecord, DecisionRecord};
use context_autopilot::context::{total_tokens, IssueCategory, IssueSeverity};
use context_autopilot::{
    Autopilot, AutopilotConfig, AutopilotEvent, ContextItem, ContextType, InMemoryStore,
};
use std::path::Path;
use std::sync::Arc;

fn config_for(root: &Path) -> AutopilotConfig {
    let mut config = AutopilotConfig {
        workspace_root: root.to_path_buf(),
        relevance_threshold: 40.0,
        watch_enabled: false,
        ..AutopilotConfig::default()
    };
    config.vcs.polling_enabled = false;
    config
}

async fn seeded_store() -> Arc<InMemoryStore> {
    let store = Arc::new(InMemoryStore::new("demo"));
    store
        .add_decision(DecisionRecord {
            id: "decision-jwt".to_string(),
            description: "Use JWT for auth".to_string(),
            reasoning: None,
            timestamp: Utc::now() - Duration::days(2),
            files: vec!["auth.ts".to_string()],
        })
        .await;
    store
        .add_conversation(ConversationRecord {
            id: "conversation-logo".to_string(),
            content: "Discussed the logo color palette".to_string(),
            timestamp: Utc::now() - Duration::days(60),
        })
        .await;
    store
        .add_item(
            ContextItem::new(
                "doc-auth",
                ContextType::Documentation,
                "Refresh tokens rotate every hour in auth.ts",
            )
            .with_files(["auth.ts"]),
        )
        .await;
    store
}

#[tokio::test]
async fn test_optimal_context_selects_relevant_items() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let autopilot = Autopilot::with_git(config_for(dir.path()), store).unwrap();

    let context = autopilot
        .get_optimal_context(
            &["auth.ts".to_string()],
            &["need refresh tokens".to_string()],
            None,
        )
        .await
        .unwrap();

    let ids: Vec<&str> = context.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["doc-auth", "decision-jwt"]);
}

#[tokio::test]
async fn test_optimal_context_without_compression() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    let config = AutopilotConfig {
        auto_compress: false,
        relevance_threshold: 0.0,
        ..config_for(dir.path())
    };
    let autopilot = Autopilot::with_git(config, store).unwrap();

    let context = autopilot
        .get_optimal_context(&["auth.ts".to_string()], &[], Some("refresh tokens"))
        .await
        .unwrap();

    assert_eq!(context.len(), 3);
    assert_eq!(context.last().map(|i| i.id.as_str()), Some("conversation-logo"));
}

#[tokio::test]
async fn test_decisions_survive_tight_budget() {
    let dir = tempfile::tempdir().unwrap();
    let store = seeded_store().await;
    for i in 0..5 {
        store
            .add_item(
                ContextItem::new(
                    format!("doc-{}", i),
                    ContextType::Documentation,
                    format!(
                        "Refresh tokens for auth.ts section {}. The handler validates expiry, \
                         rotates the signing key and records the audit trail for session {}.",
                        i, i
                    ),
                )
                .with_files(["auth.ts"]),
            )
            .await;
    }

    let config = AutopilotConfig {
        token_budget: 30,
        ..config_for(dir.path())
    };
    let autopilot = Autopilot::with_git(config, store).unwrap();
    let mut rx = autopilot.subscribe();

    let context = autopilot
        .get_optimal_context(
            &["auth.ts".to_string()],
            &["need refresh tokens".to_string()],
            None,
        )
        .await
        .unwrap();

    assert!(context.iter().any(|i| i.id == "decision-jwt"));
    assert!(total_tokens(&context) <= 30);

    let mut compressed = false;
    while let Ok(event) = rx.try_recv() {
        if let AutopilotEvent::CompressionCompleted {
            tokens_before,
            tokens_after,
            ..
        } = event
        {
            assert!(tokens_after < tokens_before);
            compressed = true;
        }
    }
    assert!(compressed);
}

#[tokio::test]
async fn test_health_check_reports_conflicting_decisions() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::new("demo"));
    for (id, description) in [
        ("d-redis", "We should use Redis for sessions"),
        ("d-no-redis", "We should not use Redis for sessions"),
    ] {
        store
            .add_decision(DecisionRecord {
                id: id.to_string(),
                description: description.to_string(),
                reasoning: None,
                timestamp: Utc::now(),
                files: vec!["src/session.ts".to_string()],
            })
            .await;
    }

    let autopilot = Autopilot::with_git(config_for(dir.path()), store).unwrap();
    let health = autopilot.check_health().await.unwrap();

    let conflicts: Vec<_> = health.issues_in(IssueCategory::Conflict).collect();
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].severity, IssueSeverity::Critical);
    assert!(health.score <= 85.0);
    assert!(health.recommendations[0].contains("conflicting"));
}

#[tokio::test]
async fn test_store_outside_workspace_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let other = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryStore::new("demo").with_root(other.path()));
    store
        .add_decision(DecisionRecord {
            id: "d1".to_string(),
            description: "Use JWT for auth".to_string(),
            reasoning: None,
            timestamp: Utc::now(),
            files: vec!["auth.ts".to_string()],
        })
        .await;

    let autopilot = Autopilot::with_git(config_for(dir.path()), store).unwrap();
    let context = autopilot
        .get_optimal_context(&["auth.ts".to_string()], &[], None)
        .await
        .unwrap();
    assert!(context.is_empty());

    let health = autopilot.check_health().await.unwrap();
    assert_eq!(health.score, 100.0);
}
