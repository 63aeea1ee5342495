//! # Database Pool Management
//!
//! Connection pool creation and embedded migrations for the audit sink.

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::error::{DbError, DbResult};
use crate::repository::audit::AuditLogRepository;

/// Database connection pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect to the database.
    pub async fn connect(url: &str) -> DbResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        info!("Connected to PostgreSQL");
        Ok(Database { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> DbResult<()> {
        sqlx::migrate!("../../migrations/postgres")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration(e.to_string()))?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Get the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Audit log repository bound to this pool.
    pub fn audit_logs(&self) -> AuditLogRepository {
        AuditLogRepository::new(self.pool.clone())
    }
}
