//! # Audit Entry Model
//!
//! The audit entry is the unit of work flowing through the audit queue:
//! created by any state-changing operation, enqueued as serialized JSON,
//! dequeued in batches by the drain worker, and persisted to the audit
//! log table.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Business operation                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  AuditEntry::new("UPDATE", "inventory")                                 │
//! │       .with_user(user_id, "jsmith")                                     │
//! │       .with_target("prod-001", "Product")                               │
//! │       .with_change(old_json, new_json)                                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  AuditQueue::enqueue  ──►  Redis list  ──►  QueueDrainWorker            │
//! │                                                 │                       │
//! │                                                 ▼                       │
//! │                                          audit_logs table               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `old_value`/`new_value` are opaque pre-serialized JSON blobs. The
//! caller serializes whatever shape it wants audited; this core never
//! inspects them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// A single audit record, queued before its durable write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry id, generated at construction time.
    pub id: Uuid,

    /// Acting user, if the operation ran in an authenticated context.
    pub user_id: Option<Uuid>,

    /// Display name of the actor ("system" for background operations).
    pub user_name: String,

    /// Verb describing what happened (e.g. "CREATE", "STOCK_ADJUST").
    pub action: String,

    /// Functional module the action belongs to (e.g. "orders").
    pub module: String,

    /// Identifier of the affected entity, if any.
    pub target_id: Option<String>,

    /// Type name of the affected entity, if any.
    pub target_type: Option<String>,

    /// Pre-serialized JSON of the entity before the change.
    pub old_value: Option<String>,

    /// Pre-serialized JSON of the entity after the change.
    pub new_value: Option<String>,

    /// Client IP the request originated from.
    pub ip_address: Option<String>,

    /// Client user agent string.
    pub user_agent: Option<String>,

    /// Timestamp taken when the entry was created (enqueue time).
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    /// Creates a new entry for `action` within `module`, attributed to
    /// "system" until [`with_user`](Self::with_user) is called.
    pub fn new(action: impl Into<String>, module: impl Into<String>) -> Self {
        AuditEntry {
            id: Uuid::new_v4(),
            user_id: None,
            user_name: "system".to_string(),
            action: action.into(),
            module: module.into(),
            target_id: None,
            target_type: None,
            old_value: None,
            new_value: None,
            ip_address: None,
            user_agent: None,
            created_at: Utc::now(),
        }
    }

    /// Attributes the entry to a user.
    pub fn with_user(mut self, user_id: Uuid, user_name: impl Into<String>) -> Self {
        self.user_id = Some(user_id);
        self.user_name = user_name.into();
        self
    }

    /// Records the affected entity.
    pub fn with_target(
        mut self,
        target_id: impl Into<String>,
        target_type: impl Into<String>,
    ) -> Self {
        self.target_id = Some(target_id.into());
        self.target_type = Some(target_type.into());
        self
    }

    /// Attaches opaque before/after payloads (pre-serialized JSON).
    pub fn with_change(mut self, old_value: Option<String>, new_value: Option<String>) -> Self {
        self.old_value = old_value;
        self.new_value = new_value;
        self
    }

    /// Records request metadata.
    pub fn with_request_meta(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }

    /// Validates the entry before it is handed to the queue.
    ///
    /// Action and module are the only mandatory free-text fields;
    /// everything else is optional by design.
    pub fn validate(&self) -> CoreResult<()> {
        if self.action.trim().is_empty() {
            return Err(CoreError::Validation("audit action must not be empty".into()));
        }
        if self.module.trim().is_empty() {
            return Err(CoreError::Validation("audit module must not be empty".into()));
        }
        Ok(())
    }
}
