//! Integration tests for the repository layer
//!
//! These tests need a PostgreSQL database in `DATABASE_URL` and are ignored
//! by default. Run them with `cargo test -- --ignored`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use pipeline_coordinator::agents::audit::AuditRecorder;
use pipeline_coordinator::domain::audit::{AuditAction, AuditEntry};
use pipeline_coordinator::domain::repositories::AuditRepository;
use pipeline_coordinator::infrastructure::repositories::PostgresAuditRepository;
use sqlx::PgPool;
use uuid::Uuid;

/// Set up test database connection pool
async fn setup_test_db() -> PgPool {
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set for integration tests");

    PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to test database")
}

async fn setup_repository() -> (PgPool, PostgresAuditRepository) {
    let pool = setup_test_db().await;
    let repository = PostgresAuditRepository::new(pool.clone());
    repository.migrate().await.expect("Failed to migrate");
    (pool, repository)
}

/// Clean up rows written by one test
async fn cleanup_actor(pool: &PgPool, actor: &str) {
    sqlx::query("DELETE FROM audit_entries WHERE actor = $1")
        .bind(actor)
        .execute(pool)
        .await
        .expect("Failed to clean up audit entries");
}

#[tokio::test]
#[ignore]
async fn test_append_and_read_back() {
    let (pool, repository) = setup_repository().await;
    let actor = format!("test-{}", Uuid::new_v4());

    for (sequence, action) in [(1, AuditAction::WorkAdded), (2, AuditAction::WorkDispatched)] {
        repository
            .append(&AuditEntry {
                sequence,
                timestamp: Utc::now(),
                actor: actor.clone(),
                action,
                summary: format!("entry {}", sequence),
            })
            .await
            .expect("Failed to append");
    }

    let recent = repository.recent(2).await.expect("Failed to read");
    let ours: Vec<&AuditEntry> = recent.iter().filter(|e| e.actor == actor).collect();

    assert_eq!(ours.len(), 2);
    assert_eq!(ours[0].action, AuditAction::WorkAdded);
    assert_eq!(ours[1].action, AuditAction::WorkDispatched);
    assert!(ours[0].sequence < ours[1].sequence);

    cleanup_actor(&pool, &actor).await;
}

#[tokio::test]
#[ignore]
async fn test_recorder_forwards_to_postgres() {
    let (pool, repository) = setup_repository().await;
    let actor = format!("test-{}", Uuid::new_v4());
    let recorder = AuditRecorder::with_repository(10, Arc::new(repository));

    recorder.record(&actor, AuditAction::Handoff, "research -> writer");

    let mut stored = 0i64;
    for _ in 0..50 {
        stored = sqlx::query_scalar("SELECT COUNT(*) FROM audit_entries WHERE actor = $1")
            .bind(&actor)
            .fetch_one(&pool)
            .await
            .expect("Failed to count");
        if stored == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(stored, 1);

    cleanup_actor(&pool, &actor).await;
}
