//! # Audit Log Repository
//!
//! Batched writes into the `audit_logs` table. This is the durable end
//! of the audit pipeline: the drain worker hands over dequeued batches
//! and considers them delivered only once the insert commits.
//!
//! The queue is at-least-once, so a batch may arrive twice after a
//! transient failure. `ON CONFLICT (id) DO NOTHING` makes redelivery
//! harmless: the entry id is generated once at creation time and
//! survives the round trip through Redis.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tracing::debug;

use meridian_coord::{AuditSink, CoordError, CoordResult};
use meridian_core::AuditEntry;

use crate::error::DbResult;

/// Repository for the `audit_logs` table.
#[derive(Clone)]
pub struct AuditLogRepository {
    pool: PgPool,
}

impl AuditLogRepository {
    pub fn new(pool: PgPool) -> Self {
        AuditLogRepository { pool }
    }

    /// Inserts a batch of entries as one multi-row statement.
    ///
    /// Duplicate ids (at-least-once redelivery) are skipped silently.
    pub async fn insert_batch(&self, entries: &[AuditEntry]) -> DbResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO audit_logs (\
             id, user_id, user_name, action, module, target_id, target_type, \
             old_value, new_value, ip_address, user_agent, created_at) ",
        );

        builder.push_values(entries, |mut row, entry| {
            row.push_bind(entry.id)
                .push_bind(entry.user_id)
                .push_bind(&entry.user_name)
                .push_bind(&entry.action)
                .push_bind(&entry.module)
                .push_bind(&entry.target_id)
                .push_bind(&entry.target_type)
                .push_bind(&entry.old_value)
                .push_bind(&entry.new_value)
                .push_bind(&entry.ip_address)
                .push_bind(&entry.user_agent)
                .push_bind(entry.created_at);
        });
        builder.push(" ON CONFLICT (id) DO NOTHING");

        builder.build().execute(&self.pool).await?;
        debug!(count = entries.len(), "Persisted audit batch");
        Ok(())
    }

    /// Total rows in the audit log.
    pub async fn count(&self) -> DbResult<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM audit_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("count"))
    }
}

#[async_trait]
impl AuditSink for AuditLogRepository {
    async fn persist_batch(&self, entries: Vec<AuditEntry>) -> CoordResult<()> {
        self.insert_batch(&entries)
            .await
            .map_err(|e| CoordError::Persistence(e.to_string()))
    }
}
