//! # Queue Drain Worker
//!
//! Background task that moves audit entries from the Redis queue into
//! the durable sink.
//!
//! ## Drain Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      QueueDrainWorker Loop                              │
//! │                                                                         │
//! │            ┌────────┐   tick, queue empty    ┌────────┐                 │
//! │            │  Idle  │ ◄───────────────────── │  Idle  │                 │
//! │            └───┬────┘                        └────────┘                 │
//! │                │ tick, batch found                                      │
//! │                ▼                                                        │
//! │            ┌──────────┐  persist batch, more backlog                    │
//! │            │ Draining │ ───────────────┐                                │
//! │            └───┬──────┘ ◄──────────────┘   (drain-eagerly, no sleep)    │
//! │                │ queue empty / cycle error                              │
//! │                ▼                                                        │
//! │              Idle (sleep until next tick)                               │
//! │                                                                         │
//! │  TIMING:                                                               │
//! │  • Poll interval: 5 seconds (configurable)                             │
//! │  • Batch size: 100 entries (configurable)                              │
//! │                                                                         │
//! │  FAILURE:                                                              │
//! │  • A failed persist re-enqueues the batch best-effort and abandons     │
//! │    the cycle. One bad cycle never terminates the worker.               │
//! │  • A crash between RPOP and the durable write still loses that         │
//! │    in-flight batch (at-least-once caveat, see queue docs).             │
//! │                                                                         │
//! │  SHUTDOWN:                                                             │
//! │  • Cooperative: the sleep is interruptible via the handle; in-flight   │
//! │    store calls run to completion, then the loop exits.                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use meridian_core::AuditEntry;

use crate::error::{CoordError, CoordResult};
use crate::queue::AuditQueue;

// =============================================================================
// Durable Sink
// =============================================================================

/// Destination for drained audit entries (the system of record).
///
/// Implementations must tolerate duplicates: the queue is at-least-once
/// and a batch may be redelivered after a transient failure.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists a batch as a single write. Either the whole batch
    /// commits or the call errors.
    async fn persist_batch(&self, entries: Vec<AuditEntry>) -> CoordResult<()>;
}

// =============================================================================
// Worker State
// =============================================================================

/// Observable worker state, published on a watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainState {
    /// Sleeping until the next poll tick.
    Idle,
    /// Actively persisting a backlog.
    Draining,
}

// =============================================================================
// Drain Worker
// =============================================================================

/// Drains the audit queue into the durable sink on a fixed interval.
pub struct QueueDrainWorker {
    /// Source queue.
    queue: AuditQueue,

    /// Durable destination.
    sink: Arc<dyn AuditSink>,

    /// Max entries per drain batch.
    batch_size: usize,

    /// Sleep between cycles while the queue is empty.
    poll_interval: Duration,

    /// Shutdown receiver.
    shutdown_rx: mpsc::Receiver<()>,

    /// State publisher.
    state_tx: watch::Sender<DrainState>,
}

/// Handle for controlling and observing the drain worker.
#[derive(Clone)]
pub struct QueueDrainHandle {
    shutdown_tx: mpsc::Sender<()>,
    state_rx: watch::Receiver<DrainState>,
}

impl QueueDrainHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> CoordResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| CoordError::ChannelClosed("Shutdown channel closed".into()))
    }

    /// Most recently published worker state.
    pub fn state(&self) -> DrainState {
        *self.state_rx.borrow()
    }
}

impl QueueDrainWorker {
    /// Creates a new drain worker and returns a handle.
    pub fn new(
        queue: AuditQueue,
        sink: Arc<dyn AuditSink>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> (Self, QueueDrainHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let (state_tx, state_rx) = watch::channel(DrainState::Idle);

        let worker = QueueDrainWorker {
            queue,
            sink,
            batch_size,
            poll_interval,
            shutdown_rx,
            state_tx,
        };
        let handle = QueueDrainHandle {
            shutdown_tx,
            state_rx,
        };

        (worker, handle)
    }

    /// Runs the drain loop.
    ///
    /// This should be spawned as a background task. It loops until the
    /// handle requests shutdown; any error inside a cycle is logged and
    /// abandoned, never fatal.
    pub async fn run(mut self) {
        info!(
            batch_size = self.batch_size,
            poll_interval_secs = self.poll_interval.as_secs(),
            "Audit drain worker starting"
        );

        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.drain_backlog().await {
                        error!(?e, "Drain cycle failed; retrying next interval");
                    }
                    let _ = self.state_tx.send(DrainState::Idle);
                }

                _ = self.shutdown_rx.recv() => {
                    info!("Audit drain worker shutting down");
                    break;
                }
            }
        }

        info!("Audit drain worker stopped");
    }

    /// Persists batches until the queue empties (drain-eager: no sleep
    /// between full batches while a backlog exists).
    async fn drain_backlog(&mut self) -> CoordResult<()> {
        loop {
            let batch = self.queue.dequeue(self.batch_size).await?;
            if batch.is_empty() {
                return Ok(());
            }

            let _ = self.state_tx.send(DrainState::Draining);
            let batch_len = batch.len();
            debug!(count = batch_len, "Draining audit batch");

            if let Err(e) = self.sink.persist_batch(batch.clone()).await {
                // Best-effort redelivery: push the batch back so the
                // next cycle retries it. A crash right here still loses
                // it - the documented at-least-once gap. LPUSH lands
                // the retried batch behind anything enqueued since the
                // failure, so redelivery order is approximate, not
                // strict FIFO.
                warn!(?e, count = batch_len, "Persist failed; re-enqueueing batch");
                for entry in &batch {
                    if let Err(re) = self.queue.enqueue(entry).await {
                        error!(?re, entry_id = %entry.id, "Failed to re-enqueue audit entry");
                    }
                }
                return Err(e);
            }

            if batch_len < self.batch_size {
                // Short batch means the queue is (effectively) empty
                return Ok(());
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Test sink that records batches and can fail the first N calls.
    #[derive(Default)]
    struct RecordingSink {
        persisted: Mutex<Vec<AuditEntry>>,
        fail_remaining: AtomicUsize,
    }

    impl RecordingSink {
        fn failing(times: usize) -> Self {
            RecordingSink {
                persisted: Mutex::new(Vec::new()),
                fail_remaining: AtomicUsize::new(times),
            }
        }

        fn count(&self) -> usize {
            self.persisted.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl AuditSink for RecordingSink {
        async fn persist_batch(&self, entries: Vec<AuditEntry>) -> CoordResult<()> {
            if self
                .fail_remaining
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CoordError::Persistence("injected failure".into()));
            }
            self.persisted.lock().unwrap().extend(entries);
            Ok(())
        }
    }

    fn setup(
        sink: Arc<RecordingSink>,
        batch_size: usize,
    ) -> (AuditQueue, QueueDrainWorker, QueueDrainHandle) {
        let store = Arc::new(MemoryStore::new());
        let queue = AuditQueue::new(store);
        let (worker, handle) = QueueDrainWorker::new(
            queue.clone(),
            sink,
            batch_size,
            Duration::from_secs(5),
        );
        (queue, worker, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_drains_backlog_eagerly() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, worker, handle) = setup(sink.clone(), 100);

        // More than two full batches queued before the first tick
        for i in 0..250 {
            queue
                .enqueue(&AuditEntry::new(format!("A{i}"), "orders"))
                .await
                .unwrap();
        }

        let task = tokio::spawn(worker.run());

        // One poll interval is enough: full batches loop without sleeping
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sink.count(), 250);
        assert!(queue.is_empty().await.unwrap());
        assert_eq!(handle.state(), DrainState::Idle);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycle_retries_and_recovers() {
        let sink = Arc::new(RecordingSink::failing(1));
        let (queue, worker, handle) = setup(sink.clone(), 100);

        for i in 0..3 {
            queue
                .enqueue(&AuditEntry::new(format!("A{i}"), "orders"))
                .await
                .unwrap();
        }

        let task = tokio::spawn(worker.run());

        // First cycle (immediate tick) hits the injected failure; the
        // batch goes back
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.count(), 0);
        assert_eq!(queue.len().await.unwrap(), 3);

        // Failure condition cleared: the next cycle drains everything
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.count(), 3);
        assert!(queue.is_empty().await.unwrap());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    /// A sink that always rejects, with a variant the queue layer
    /// never produces itself.
    struct RejectingSink;

    #[async_trait]
    impl AuditSink for RejectingSink {
        async fn persist_batch(&self, _entries: Vec<AuditEntry>) -> CoordResult<()> {
            Err(CoordError::StoreUnavailable("sink connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_sink_error_variant_surfaces_unchanged() {
        let store = Arc::new(MemoryStore::new());
        let queue = AuditQueue::new(store);
        let (mut worker, _handle) = QueueDrainWorker::new(
            queue.clone(),
            Arc::new(RejectingSink),
            10,
            Duration::from_secs(5),
        );

        queue.enqueue(&AuditEntry::new("CREATE", "orders")).await.unwrap();

        let err = worker.drain_backlog().await.unwrap_err();
        assert!(matches!(err, CoordError::StoreUnavailable(_)));
        // The failed batch went back for the next cycle
        assert_eq!(queue.len().await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_enqueued_later_are_picked_up() {
        let sink = Arc::new(RecordingSink::default());
        let (queue, worker, handle) = setup(sink.clone(), 100);

        let task = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(sink.count(), 0);

        queue.enqueue(&AuditEntry::new("LATE", "orders")).await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(sink.count(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_is_prompt() {
        let sink = Arc::new(RecordingSink::default());
        let (_, worker, handle) = setup(sink, 100);

        let task = tokio::spawn(worker.run());
        handle.shutdown().await.unwrap();

        // The loop exits without waiting for the next poll tick
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("worker exits promptly")
            .unwrap();
    }
}
