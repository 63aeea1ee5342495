//! # Sibling Periodic Workers
//!
//! Two thin consumers of the same Idle/Active loop shape as the drain
//! worker, with different payloads and intervals:
//!
//! - [`SuspendedTxnSweeper`] periodically force-terminates suspended
//!   (parked) transactions past their expiry.
//! - [`ScheduledJobRunner`] periodically finds due scheduled jobs,
//!   executes them, and advances each job's next run time from its
//!   recurrence rule - after execution, success or failure, so a
//!   failing job never wedges its slot.
//!
//! Both inherit the crash-isolation property: one failing iteration is
//! logged and the loop continues; only a shutdown signal ends it.
//! The actual ERP-side work (which rows to expire, what a job does)
//! lives behind collaborator traits - these loops own only the
//! scheduling and failure isolation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use meridian_core::Recurrence;

use crate::error::{CoordError, CoordResult};

// =============================================================================
// Suspended Transaction Sweeper
// =============================================================================

/// ERP-side collaborator that owns the suspended-transaction records.
#[async_trait]
pub trait SuspendedTxnStore: Send + Sync {
    /// Force-terminates every suspended transaction whose expiry is at
    /// or before `now`. Returns how many were terminated.
    async fn terminate_expired(&self, now: DateTime<Utc>) -> CoordResult<u64>;
}

/// Periodically expires overdue parked transactions.
pub struct SuspendedTxnSweeper {
    store: Arc<dyn SuspendedTxnStore>,
    sweep_interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping the sweeper.
#[derive(Clone)]
pub struct SweeperHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl SweeperHandle {
    pub async fn shutdown(&self) -> CoordResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| CoordError::ChannelClosed("Shutdown channel closed".into()))
    }
}

impl SuspendedTxnSweeper {
    pub fn new(
        store: Arc<dyn SuspendedTxnStore>,
        sweep_interval: Duration,
    ) -> (Self, SweeperHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            SuspendedTxnSweeper {
                store,
                sweep_interval,
                shutdown_rx,
            },
            SweeperHandle { shutdown_tx },
        )
    }

    /// Runs the sweep loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Suspended-transaction sweeper starting"
        );

        let mut interval = tokio::time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.store.terminate_expired(Utc::now()).await {
                        Ok(0) => debug!("No expired suspended transactions"),
                        Ok(count) => info!(count, "Terminated expired suspended transactions"),
                        Err(e) => error!(?e, "Sweep cycle failed; retrying next interval"),
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Suspended-transaction sweeper shutting down");
                    break;
                }
            }
        }
    }
}

// =============================================================================
// Scheduled Job Runner
// =============================================================================

/// A due scheduled job as seen by the runner.
#[derive(Debug, Clone)]
pub struct ScheduledJob {
    pub id: String,
    pub name: String,
    pub recurrence: Recurrence,
    pub next_run_at: DateTime<Utc>,
}

/// ERP-side collaborator that owns job definitions and execution.
#[async_trait]
pub trait ScheduledJobStore: Send + Sync {
    /// Jobs whose `next_run_at` is at or before `now`.
    async fn due_jobs(&self, now: DateTime<Utc>) -> CoordResult<Vec<ScheduledJob>>;

    /// Executes one job.
    async fn execute(&self, job: &ScheduledJob) -> CoordResult<()>;

    /// Persists the job's advanced next run time.
    async fn reschedule(&self, job_id: &str, next_run_at: DateTime<Utc>) -> CoordResult<()>;
}

/// Periodically executes due scheduled jobs.
pub struct ScheduledJobRunner {
    store: Arc<dyn ScheduledJobStore>,
    check_interval: Duration,
    shutdown_rx: mpsc::Receiver<()>,
}

/// Handle for stopping the runner.
#[derive(Clone)]
pub struct JobRunnerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl JobRunnerHandle {
    pub async fn shutdown(&self) -> CoordResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| CoordError::ChannelClosed("Shutdown channel closed".into()))
    }
}

impl ScheduledJobRunner {
    pub fn new(
        store: Arc<dyn ScheduledJobStore>,
        check_interval: Duration,
    ) -> (Self, JobRunnerHandle) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        (
            ScheduledJobRunner {
                store,
                check_interval,
                shutdown_rx,
            },
            JobRunnerHandle { shutdown_tx },
        )
    }

    /// Runs the check loop. Spawn as a background task.
    pub async fn run(mut self) {
        info!(
            interval_secs = self.check_interval.as_secs(),
            "Scheduled-job runner starting"
        );

        let mut interval = tokio::time::interval(self.check_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_due_jobs().await {
                        error!(?e, "Job check cycle failed; retrying next interval");
                    }
                }
                _ = self.shutdown_rx.recv() => {
                    info!("Scheduled-job runner shutting down");
                    break;
                }
            }
        }
    }

    async fn run_due_jobs(&self) -> CoordResult<()> {
        let now = Utc::now();
        let due = self.store.due_jobs(now).await?;
        if due.is_empty() {
            return Ok(());
        }

        info!(count = due.len(), "Executing due scheduled jobs");
        for job in due {
            if let Err(e) = self.store.execute(&job).await {
                warn!(job_id = %job.id, job_name = %job.name, ?e, "Job execution failed");
            }

            // Advance the schedule whether the run succeeded or not
            let next = job.recurrence.next_run(now);
            if let Err(e) = self.store.reschedule(&job.id, next).await {
                error!(job_id = %job.id, ?e, "Failed to reschedule job");
            }
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    struct FlakyTxnStore {
        fail_first: AtomicU64,
        sweeps: AtomicU64,
    }

    #[async_trait]
    impl SuspendedTxnStore for FlakyTxnStore {
        async fn terminate_expired(&self, _now: DateTime<Utc>) -> CoordResult<u64> {
            if self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(CoordError::StoreUnavailable("injected".into()));
            }
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            Ok(2)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_survives_failing_iteration() {
        let store = Arc::new(FlakyTxnStore {
            fail_first: AtomicU64::new(1),
            sweeps: AtomicU64::new(0),
        });
        let (sweeper, handle) = SuspendedTxnSweeper::new(store.clone(), Duration::from_secs(60));

        let task = tokio::spawn(sweeper.run());

        // First tick fails, second succeeds: the loop kept going
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.sweeps.load(Ordering::SeqCst), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[derive(Default)]
    struct RecordingJobStore {
        jobs: Mutex<Vec<ScheduledJob>>,
        executed: Mutex<Vec<String>>,
        rescheduled: Mutex<Vec<(String, DateTime<Utc>)>>,
        fail_execution: bool,
    }

    #[async_trait]
    impl ScheduledJobStore for RecordingJobStore {
        async fn due_jobs(&self, now: DateTime<Utc>) -> CoordResult<Vec<ScheduledJob>> {
            Ok(self
                .jobs
                .lock()
                .unwrap()
                .iter()
                .filter(|j| j.next_run_at <= now)
                .cloned()
                .collect())
        }

        async fn execute(&self, job: &ScheduledJob) -> CoordResult<()> {
            self.executed.lock().unwrap().push(job.id.clone());
            if self.fail_execution {
                return Err(CoordError::Persistence("job blew up".into()));
            }
            Ok(())
        }

        async fn reschedule(&self, job_id: &str, next_run_at: DateTime<Utc>) -> CoordResult<()> {
            self.rescheduled
                .lock()
                .unwrap()
                .push((job_id.to_string(), next_run_at));
            let mut jobs = self.jobs.lock().unwrap();
            if let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) {
                job.next_run_at = next_run_at;
            }
            Ok(())
        }
    }

    fn daily_job(id: &str) -> ScheduledJob {
        ScheduledJob {
            id: id.to_string(),
            name: format!("job {id}"),
            recurrence: Recurrence::Daily,
            next_run_at: Utc::now() - chrono::Duration::minutes(1),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_jobs_execute_and_advance() {
        let store = Arc::new(RecordingJobStore::default());
        store.jobs.lock().unwrap().push(daily_job("j-1"));

        let (runner, handle) = ScheduledJobRunner::new(store.clone(), Duration::from_secs(60));
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(store.executed.lock().unwrap().as_slice(), ["j-1"]);
        let rescheduled = store.rescheduled.lock().unwrap().clone();
        assert_eq!(rescheduled.len(), 1);
        // Daily job: pushed roughly one day out
        assert!(rescheduled[0].1 > Utc::now() + chrono::Duration::hours(23));

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_still_rescheduled() {
        let store = Arc::new(RecordingJobStore {
            fail_execution: true,
            ..Default::default()
        });
        store.jobs.lock().unwrap().push(daily_job("j-err"));

        let (runner, handle) = ScheduledJobRunner::new(store.clone(), Duration::from_secs(60));
        let task = tokio::spawn(runner.run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        // Executed (and failed), but the schedule advanced anyway
        assert_eq!(store.executed.lock().unwrap().len(), 1);
        assert_eq!(store.rescheduled.lock().unwrap().len(), 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }
}
