//! # Coordination Error Types
//!
//! Error taxonomy for the coordination layer.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  Coordination Error Categories                          │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Store       │  │     Payload     │  │       Worker            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │ StoreUnavailable│  │ Serialization   │  │ Persistence             │ │
//! │  │                 │  │ MalformedEntry  │  │ ChannelClosed           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Lock release with a stale token is NOT an error: it surfaces as       │
//! │  `Ok(false)` from `LockGuard::release` (benign no-op).                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for coordination operations.
pub type CoordResult<T> = Result<T, CoordError>;

/// Coordination layer error type.
///
/// ## Design Principles
/// - Store failures are never silently swallowed here; each consumer
///   applies its own documented policy (rate limiting fails open at the
///   interceptor, the drain worker retries next cycle, locks fail
///   closed).
/// - All errors are `Send + Sync` for async compatibility.
#[derive(Debug, Error)]
pub enum CoordError {
    /// The backing store cannot be reached or refused the command.
    #[error("Backing store unavailable: {0}")]
    StoreUnavailable(String),

    /// Failed to serialize a payload before it reached the store.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A dequeued audit entry failed to deserialize. Logged and
    /// dropped by the queue so one bad entry never blocks the drain.
    #[error("Malformed queue entry: {0}")]
    MalformedEntry(String),

    /// The durable sink rejected a batch during a drain cycle.
    #[error("Durable persistence failed: {0}")]
    Persistence(String),

    /// Invalid coordination configuration.
    #[error("Invalid value for {0}")]
    InvalidConfig(String),

    /// A worker control channel closed unexpectedly.
    #[error("Channel error: {0}")]
    ChannelClosed(String),
}

impl From<redis::RedisError> for CoordError {
    fn from(err: redis::RedisError) -> Self {
        CoordError::StoreUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for CoordError {
    fn from(err: serde_json::Error) -> Self {
        CoordError::Serialization(err.to_string())
    }
}

impl CoordError {
    /// Returns true if the operation can be retried on a later cycle.
    ///
    /// Store and sink failures are transient by assumption; payload and
    /// configuration failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordError::StoreUnavailable(_) | CoordError::Persistence(_)
        )
    }

    /// Returns true if this error indicates a bad payload rather than
    /// an infrastructure problem.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            CoordError::Serialization(_) | CoordError::MalformedEntry(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(CoordError::StoreUnavailable("connection refused".into()).is_retryable());
        assert!(CoordError::Persistence("insert failed".into()).is_retryable());

        assert!(!CoordError::MalformedEntry("bad json".into()).is_retryable());
        assert!(!CoordError::InvalidConfig("AUDIT_BATCH_SIZE".into()).is_retryable());
    }

    #[test]
    fn test_data_errors() {
        assert!(CoordError::MalformedEntry("truncated".into()).is_data_error());
        assert!(!CoordError::StoreUnavailable("down".into()).is_data_error());
    }

    #[test]
    fn test_serde_conversion() {
        let bad: Result<meridian_core::AuditEntry, _> = serde_json::from_str("{not json");
        let err: CoordError = bad.unwrap_err().into();
        assert!(matches!(err, CoordError::Serialization(_)));
    }
}
