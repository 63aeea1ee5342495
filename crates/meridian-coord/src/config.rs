//! Coordination layer configuration.
//!
//! Configuration is loaded from environment variables with fallback to
//! defaults, the same surface the rest of the deployment uses.

use std::env;
use std::time::Duration;

use meridian_core::{RateLimitPolicy, RateQuota};

use crate::error::{CoordError, CoordResult};

/// Coordination configuration.
#[derive(Debug, Clone)]
pub struct CoordConfig {
    /// Redis connection string.
    pub redis_url: String,

    /// Default requests per window for unclassified endpoints.
    pub default_limit: i64,
    /// Default window in seconds.
    pub default_window_secs: u64,

    /// Login endpoint limit (strictest).
    pub login_limit: i64,
    pub login_window_secs: u64,

    /// Export endpoint limit (long window, modest count).
    pub export_limit: i64,
    pub export_window_secs: u64,

    /// Report endpoint limit.
    pub report_limit: i64,
    pub report_window_secs: u64,

    /// Max audit entries drained per cycle.
    pub audit_batch_size: usize,

    /// Poll interval between drain cycles when the queue is empty.
    pub audit_poll_interval_secs: u64,

    /// Default lock TTL when the call site does not supply one.
    pub lock_default_ttl_secs: u64,

    /// Sleep between lock acquisition retries (jitter is added on top).
    pub lock_retry_interval_ms: u64,

    /// How long the waiting acquire variant keeps retrying.
    pub lock_wait_timeout_ms: u64,

    /// Interval between sweeps for expired suspended transactions.
    pub suspended_txn_sweep_interval_secs: u64,

    /// Interval between scheduled-job due checks.
    pub scheduled_job_check_interval_secs: u64,
}

impl CoordConfig {
    /// Load configuration from environment variables.
    pub fn load() -> CoordResult<Self> {
        Ok(CoordConfig {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),

            default_limit: parse_env("RATE_LIMIT_DEFAULT", 100)?,
            default_window_secs: parse_env("RATE_WINDOW_DEFAULT_SECS", 60)?,

            login_limit: parse_env("RATE_LIMIT_LOGIN", 5)?,
            login_window_secs: parse_env("RATE_WINDOW_LOGIN_SECS", 60)?,

            export_limit: parse_env("RATE_LIMIT_EXPORT", 10)?,
            export_window_secs: parse_env("RATE_WINDOW_EXPORT_SECS", 300)?,

            report_limit: parse_env("RATE_LIMIT_REPORT", 30)?,
            report_window_secs: parse_env("RATE_WINDOW_REPORT_SECS", 300)?,

            audit_batch_size: parse_env("AUDIT_BATCH_SIZE", 100)?,
            audit_poll_interval_secs: parse_env("AUDIT_POLL_INTERVAL_SECS", 5)?,

            lock_default_ttl_secs: parse_env("LOCK_DEFAULT_TTL_SECS", 30)?,
            lock_retry_interval_ms: parse_env("LOCK_RETRY_INTERVAL_MS", 50)?,
            lock_wait_timeout_ms: parse_env("LOCK_WAIT_TIMEOUT_MS", 5000)?,

            suspended_txn_sweep_interval_secs: parse_env("SUSPENDED_TXN_SWEEP_INTERVAL_SECS", 60)?,
            scheduled_job_check_interval_secs: parse_env("SCHEDULED_JOB_CHECK_INTERVAL_SECS", 60)?,
        })
    }

    /// Builds the per-class rate-limit policy from the configured values.
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        RateLimitPolicy {
            default: RateQuota::new(self.default_limit, Duration::from_secs(self.default_window_secs)),
            login: RateQuota::new(self.login_limit, Duration::from_secs(self.login_window_secs)),
            export: RateQuota::new(self.export_limit, Duration::from_secs(self.export_window_secs)),
            report: RateQuota::new(self.report_limit, Duration::from_secs(self.report_window_secs)),
        }
    }

    /// Default lock TTL as a [`Duration`].
    pub fn lock_default_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_default_ttl_secs)
    }

    /// Lock retry interval as a [`Duration`].
    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }

    /// Lock wait timeout as a [`Duration`].
    pub fn lock_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_wait_timeout_ms)
    }

    /// Drain poll interval as a [`Duration`].
    pub fn audit_poll_interval(&self) -> Duration {
        Duration::from_secs(self.audit_poll_interval_secs)
    }
}

impl Default for CoordConfig {
    fn default() -> Self {
        CoordConfig {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            default_limit: 100,
            default_window_secs: 60,
            login_limit: 5,
            login_window_secs: 60,
            export_limit: 10,
            export_window_secs: 300,
            report_limit: 30,
            report_window_secs: 300,
            audit_batch_size: 100,
            audit_poll_interval_secs: 5,
            lock_default_ttl_secs: 30,
            lock_retry_interval_ms: 50,
            lock_wait_timeout_ms: 5000,
            suspended_txn_sweep_interval_secs: 60,
            scheduled_job_check_interval_secs: 60,
        }
    }
}

/// Parses an env var, falling back to `default` when unset.
fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> CoordResult<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| CoordError::InvalidConfig(name.to_string())),
        Err(_) => Ok(default),
    }
}
