//! # meridian-db: Durable Audit Sink for Meridian ERP
//!
//! PostgreSQL layer the drain worker writes into: connection pool,
//! embedded migrations, and the audit log repository.
//!
//! ## Module Organization
//! - [`pool`] - `Database` connection pool wrapper + migrations
//! - [`repository`] - `AuditLogRepository` (implements
//!   `meridian_coord::AuditSink`)
//! - [`error`] - `DbError` types
//!
//! ## Usage
//! ```rust,ignore
//! use meridian_db::Database;
//!
//! let db = Database::connect(&config.database_url).await?;
//! db.run_migrations().await?;
//! let sink = db.audit_logs();
//! ```

pub mod error;
pub mod pool;
pub mod repository;

pub use error::{DbError, DbResult};
pub use pool::Database;
pub use repository::audit::AuditLogRepository;
