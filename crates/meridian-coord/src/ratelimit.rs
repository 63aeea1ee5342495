//! # Fixed-Window Rate Limiter
//!
//! Counts requests per `(identifier, endpoint)` pair inside fixed
//! windows using the store's atomic increment.
//!
//! ## Window Mechanics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  key = ratelimit:{identifier}:{endpoint}                                │
//! │                                                                         │
//! │  1. count = INCR key            (atomic; creates at 0 if absent)        │
//! │  2. count == 1 → PEXPIRE key window   (this call opened the window)     │
//! │  3. allowed = count <= limit                                            │
//! │                                                                         │
//! │  The counter resets by TTL expiry, never by explicit cleanup.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! This is a fixed-window counter: a burst straddling a window boundary
//! can reach up to 2x the limit across two adjacent windows. That is an
//! accepted trade-off for one atomic round trip per request; a sliding
//! window or token bucket would be a stricter drop-in replacement.
//!
//! Store failures propagate as `StoreUnavailable`. The HTTP interceptor
//! applies the documented fail-open policy (allow + warn) because rate
//! limiting is defense-in-depth, not a correctness control; callers
//! with stricter needs can fail closed on the same error.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use meridian_core::{RateLimitResult, RateQuota};

use crate::error::CoordResult;
use crate::store::KeyValueStore;

/// Key prefix for window counters.
const RATELIMIT_PREFIX: &str = "ratelimit:";

/// Fixed-window request counter over the shared store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        RateLimiter { store }
    }

    /// Counts this request against `(identifier, endpoint)` and decides
    /// whether it may proceed under `quota`.
    pub async fn check(
        &self,
        identifier: &str,
        endpoint: &str,
        quota: RateQuota,
    ) -> CoordResult<RateLimitResult> {
        let key = format!("{RATELIMIT_PREFIX}{identifier}:{endpoint}");

        let count = self.store.increment(&key, 1).await?;
        if count == 1 {
            // This call created the counter, so it owns starting the
            // window clock.
            self.store.expire(&key, quota.window).await?;
        }

        let result = RateLimitResult::from_count(count, quota, Utc::now());
        if !result.allowed {
            debug!(
                identifier,
                endpoint,
                count,
                limit = quota.limit,
                "Rate limit exceeded"
            );
        }
        Ok(result)
    }
}

// =============================================================================
// Tests
// =============================================================================
