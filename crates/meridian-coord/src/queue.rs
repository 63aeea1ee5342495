//! # Audit Queue
//!
//! Durable-intent FIFO queue of audit entries over a single well-known
//! list key. Producers are request handlers and background jobs;
//! the single consumer is [`QueueDrainWorker`](crate::QueueDrainWorker).
//!
//! ## Delivery Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  enqueue: serialize → LPUSH audit:queue                                 │
//! │  dequeue: RPOP audit:queue [count] → deserialize each                   │
//! │  (LPUSH + RPOP = FIFO)                                                  │
//! │                                                                         │
//! │  AT-LEAST-ONCE toward the sink: an entry counts as delivered only       │
//! │  once the drain worker's durable write commits. Duplicates from a       │
//! │  redelivered batch are tolerated by the sink.                           │
//! │                                                                         │
//! │  KNOWN GAP: RPOP is destructive. A crash after the pop but before        │
//! │  the durable write loses that batch. A stricter design would LMOVE      │
//! │  to an in-flight list and delete only after commit; kept as-is          │
//! │  deliberately - see DESIGN.md.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A dequeued entry that fails to deserialize is logged and dropped so
//! it can never block the drain of the valid entries behind it.

use std::sync::Arc;

use tracing::warn;

use meridian_core::AuditEntry;

use crate::error::{CoordError, CoordResult};
use crate::store::KeyValueStore;

/// The single well-known queue key.
const AUDIT_QUEUE_KEY: &str = "audit:queue";

/// FIFO queue of audit entries over the shared store.
#[derive(Clone)]
pub struct AuditQueue {
    store: Arc<dyn KeyValueStore>,
}

impl AuditQueue {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        AuditQueue { store }
    }

    /// Validates, serializes and enqueues one entry. Ownership of the
    /// entry transfers to the queue; the caller never waits for the
    /// durable write.
    ///
    /// An entry that fails validation is rejected here, before it can
    /// occupy a queue slot it would only be dropped from later.
    pub async fn enqueue(&self, entry: &AuditEntry) -> CoordResult<()> {
        entry
            .validate()
            .map_err(|e| CoordError::MalformedEntry(e.to_string()))?;
        let payload = serde_json::to_string(entry)?;
        self.store.list_push(AUDIT_QUEUE_KEY, &payload).await
    }

    /// Dequeues up to `count` entries in FIFO order, stopping early
    /// when the queue empties. Malformed payloads are logged, dropped,
    /// and do not count against the batch.
    pub async fn dequeue(&self, count: usize) -> CoordResult<Vec<AuditEntry>> {
        let raw = self.store.list_pop(AUDIT_QUEUE_KEY, count).await?;

        let mut entries = Vec::with_capacity(raw.len());
        for payload in raw {
            match serde_json::from_str::<AuditEntry>(&payload) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    // Recoverable data-quality issue: drop it, keep draining
                    warn!(%e, "Dropping malformed audit entry");
                }
            }
        }
        Ok(entries)
    }

    /// Current queue depth.
    pub async fn len(&self) -> CoordResult<i64> {
        self.store.list_len(AUDIT_QUEUE_KEY).await
    }

    pub async fn is_empty(&self) -> CoordResult<bool> {
        Ok(self.len().await? == 0)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn queue() -> (Arc<MemoryStore>, AuditQueue) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), AuditQueue::new(store))
    }

    #[tokio::test]
    async fn test_fifo_order_preserved() {
        let (_, queue) = queue();

        let e1 = AuditEntry::new("CREATE", "orders");
        let e2 = AuditEntry::new("UPDATE", "orders");
        let e3 = AuditEntry::new("DELETE", "orders");
        for entry in [&e1, &e2, &e3] {
            queue.enqueue(entry).await.unwrap();
        }
        assert_eq!(queue.len().await.unwrap(), 3);

        let drained = queue.dequeue(3).await.unwrap();
        assert_eq!(
            drained.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![e1.id, e2.id, e3.id]
        );
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_invalid_entry_rejected_at_enqueue() {
        let (_, queue) = queue();

        let entry = AuditEntry::new("  ", "orders");
        let err = queue.enqueue(&entry).await.unwrap_err();
        assert!(matches!(err, CoordError::MalformedEntry(_)));
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_dequeue_stops_at_empty() {
        let (_, queue) = queue();
        queue.enqueue(&AuditEntry::new("CREATE", "orders")).await.unwrap();

        let drained = queue.dequeue(100).await.unwrap();
        assert_eq!(drained.len(), 1);
        assert!(queue.dequeue(100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_entry_dropped_not_blocking() {
        let (store, queue) = queue();

        queue.enqueue(&AuditEntry::new("CREATE", "orders")).await.unwrap();
        // Inject garbage directly under the queue key
        store.list_push("audit:queue", "{not valid json").await.unwrap();
        queue.enqueue(&AuditEntry::new("UPDATE", "orders")).await.unwrap();

        let drained = queue.dequeue(3).await.unwrap();
        // The two valid entries survive, in order, garbage is gone
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].action, "CREATE");
        assert_eq!(drained[1].action, "UPDATE");
        assert!(queue.is_empty().await.unwrap());
    }
}
