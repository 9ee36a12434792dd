use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::audit::{AuditAction, AuditEntry};
use crate::domain::repositories::AuditRepository;

/// PostgreSQL implementation of AuditRepository
///
/// Rows are only ever inserted. `id` orders them across process restarts,
/// since each recorder restarts its `sequence` at 1.
pub struct PostgresAuditRepository {
    pool: PgPool,
}

impl PostgresAuditRepository {
    /// Creates a new PostgresAuditRepository
    ///
    /// # Arguments
    /// * `pool` - SQLx connection pool for PostgreSQL
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the bundled migrations
    pub async fn migrate(&self) -> Result<(), String> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| format!("Failed to run audit migrations: {}", e))
    }
}

#[async_trait]
impl AuditRepository for PostgresAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<(), String> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries (sequence, recorded_at, actor, action, summary)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(entry.sequence as i64)
        .bind(entry.timestamp)
        .bind(&entry.actor)
        .bind(entry.action.as_str())
        .bind(&entry.summary)
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to append audit entry: {}", e))?;

        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, String> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, recorded_at, actor, action, summary
            FROM audit_entries
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| format!("Failed to load audit entries: {}", e))?;

        let mut entries = rows
            .into_iter()
            .map(|row| {
                let sequence: i64 = row.try_get("sequence").map_err(|e| e.to_string())?;
                let timestamp: DateTime<Utc> =
                    row.try_get("recorded_at").map_err(|e| e.to_string())?;
                let action: String = row.try_get("action").map_err(|e| e.to_string())?;
                Ok(AuditEntry {
                    sequence: sequence as u64,
                    timestamp,
                    actor: row.try_get("actor").map_err(|e| e.to_string())?,
                    action: action.parse::<AuditAction>()?,
                    summary: row.try_get("summary").map_err(|e| e.to_string())?,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;

        entries.reverse();
        Ok(entries)
    }
}
