//! # Rate-Limit Policy and Decision Types
//!
//! Pure rules for the fixed-window rate limiter: which quota applies to
//! a request path, which identifier a request is counted against, and
//! the decision shape returned to the HTTP interceptor.
//!
//! ## Endpoint Classes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Path                          Class      Typical quota                 │
//! │  ────────────────────────────  ─────────  ───────────────────────────── │
//! │  /api/auth/login, /refresh     Login      strictest (5 / 60s)           │
//! │  /api/export/...,  .../export  Export     long window (10 / 300s)       │
//! │  /api/reports/...              Report     long window (30 / 300s)       │
//! │  everything else               Default    100 / 60s                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Identifier resolution priority: authenticated principal, else first
//! IP of the `X-Forwarded-For` chain, else the direct connection
//! address.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A request budget: `limit` requests per `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateQuota {
    /// Maximum number of requests inside one window.
    pub limit: i64,

    /// Fixed window duration.
    pub window: Duration,
}

impl RateQuota {
    pub const fn new(limit: i64, window: Duration) -> Self {
        RateQuota { limit, window }
    }
}

/// Coarse endpoint classification used to pick a quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    /// Credential-bearing endpoints; strictest limit.
    Login,
    /// Bulk data export endpoints.
    Export,
    /// Report computation endpoints.
    Report,
    /// Everything else.
    Default,
}

impl EndpointClass {
    /// Classifies a request path by prefix matching.
    pub fn classify(path: &str) -> Self {
        const LOGIN_PREFIXES: &[&str] = &["/api/auth/login", "/api/auth/refresh"];
        const EXPORT_PREFIXES: &[&str] = &["/api/export"];
        const REPORT_PREFIXES: &[&str] = &["/api/reports"];

        if LOGIN_PREFIXES.iter().any(|p| path.starts_with(p)) {
            return EndpointClass::Login;
        }
        if EXPORT_PREFIXES.iter().any(|p| path.starts_with(p)) || path.ends_with("/export") {
            return EndpointClass::Export;
        }
        if REPORT_PREFIXES.iter().any(|p| path.starts_with(p)) {
            return EndpointClass::Report;
        }
        EndpointClass::Default
    }
}

/// Per-class quotas, resolved once from configuration.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    pub default: RateQuota,
    pub login: RateQuota,
    pub export: RateQuota,
    pub report: RateQuota,
}

impl RateLimitPolicy {
    /// Returns the quota that governs `path`.
    pub fn quota_for(&self, path: &str) -> RateQuota {
        match EndpointClass::classify(path) {
            EndpointClass::Login => self.login,
            EndpointClass::Export => self.export,
            EndpointClass::Report => self.report,
            EndpointClass::Default => self.default,
        }
    }
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        RateLimitPolicy {
            default: RateQuota::new(100, Duration::from_secs(60)),
            login: RateQuota::new(5, Duration::from_secs(60)),
            export: RateQuota::new(10, Duration::from_secs(300)),
            report: RateQuota::new(30, Duration::from_secs(300)),
        }
    }
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitResult {
    /// Whether the request may proceed.
    pub allowed: bool,

    /// Count observed in the current window, including this request.
    pub current: i64,

    /// The limit that applied.
    pub limit: i64,

    /// Requests left in this window (never negative).
    pub remaining: i64,

    /// Approximate instant the window resets.
    pub resets_at: DateTime<Utc>,

    /// Seconds the caller should wait before retrying; 0 when allowed.
    pub retry_after_secs: u64,
}

impl RateLimitResult {
    /// Builds a decision from an observed window count.
    ///
    /// `now` is passed in by the caller so this stays clock-free and
    /// deterministic under test.
    pub fn from_count(current: i64, quota: RateQuota, now: DateTime<Utc>) -> Self {
        let allowed = current <= quota.limit;
        RateLimitResult {
            allowed,
            current,
            limit: quota.limit,
            remaining: (quota.limit - current).max(0),
            resets_at: now
                + chrono::Duration::from_std(quota.window).unwrap_or(chrono::Duration::zero()),
            retry_after_secs: if allowed { 0 } else { quota.window.as_secs() },
        }
    }
}

/// Resolves the identifier a request is counted against.
///
/// Priority: authenticated principal, else the first (client-most) IP
/// of a forwarded-for chain, else the direct connection address.
pub fn resolve_identifier(
    principal: Option<&str>,
    forwarded_for: Option<&str>,
    remote_addr: &str,
) -> String {
    if let Some(p) = principal {
        if !p.is_empty() {
            return p.to_string();
        }
    }
    if let Some(chain) = forwarded_for {
        if let Some(first) = chain.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }
    remote_addr.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_classify_login_paths() {
        assert_eq!(EndpointClass::classify("/api/auth/login"), EndpointClass::Login);
        assert_eq!(EndpointClass::classify("/api/auth/refresh"), EndpointClass::Login);
        assert_eq!(EndpointClass::classify("/api/auth/logout"), EndpointClass::Default);
    }

    #[test]
    fn test_classify_export_and_report() {
        assert_eq!(EndpointClass::classify("/api/export/sales"), EndpointClass::Export);
        assert_eq!(EndpointClass::classify("/api/orders/export"), EndpointClass::Export);
        assert_eq!(EndpointClass::classify("/api/reports/daily"), EndpointClass::Report);
        assert_eq!(EndpointClass::classify("/api/orders"), EndpointClass::Default);
    }

    #[test]
    fn test_policy_resolution() {
        let policy = RateLimitPolicy::default();
        assert_eq!(policy.quota_for("/api/auth/login"), policy.login);
        assert_eq!(policy.quota_for("/api/reports/stock"), policy.report);
        assert_eq!(policy.quota_for("/api/customers"), policy.default);
    }

    #[test]
    fn test_decision_math() {
        let quota = RateQuota::new(5, Duration::from_secs(60));
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();

        let third = RateLimitResult::from_count(3, quota, now);
        assert!(third.allowed);
        assert_eq!(third.remaining, 2);
        assert_eq!(third.retry_after_secs, 0);

        let fifth = RateLimitResult::from_count(5, quota, now);
        assert!(fifth.allowed);
        assert_eq!(fifth.remaining, 0);

        let sixth = RateLimitResult::from_count(6, quota, now);
        assert!(!sixth.allowed);
        assert_eq!(sixth.remaining, 0);
        assert_eq!(sixth.retry_after_secs, 60);
        assert_eq!(sixth.resets_at, now + chrono::Duration::seconds(60));
    }

    #[test]
    fn test_identifier_priority() {
        assert_eq!(
            resolve_identifier(Some("user-42"), Some("1.2.3.4, 5.6.7.8"), "9.9.9.9"),
            "user-42"
        );
        assert_eq!(
            resolve_identifier(None, Some("1.2.3.4, 5.6.7.8"), "9.9.9.9"),
            "1.2.3.4"
        );
        assert_eq!(resolve_identifier(None, None, "9.9.9.9"), "9.9.9.9");
        // Empty principal and blank chain fall through
        assert_eq!(resolve_identifier(Some(""), Some("  "), "9.9.9.9"), "9.9.9.9");
    }
}
