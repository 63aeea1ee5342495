//! # meridian-core: Pure Business Rules for Meridian ERP
//!
//! This crate holds the I/O-free types and rules shared by the
//! coordination layer, the durable sink, and the HTTP gateway:
//!
//! - [`audit`] - The audit entry model carried through the queue
//! - [`ratelimit`] - Rate-limit policy, endpoint classes, decision type
//! - [`schedule`] - Recurrence rules for the scheduled-job runner
//! - [`error`] - Core validation errors
//!
//! ## Golden Rule: NO I/O
//!
//! Nothing in this crate touches Redis, PostgreSQL, the clock beyond
//! `Utc::now()` timestamps handed in by callers, or the network. That
//! keeps every rule here testable without mocks.

pub mod audit;
pub mod error;
pub mod ratelimit;
pub mod schedule;

pub use audit::AuditEntry;
pub use error::{CoreError, CoreResult};
pub use ratelimit::{
    resolve_identifier, EndpointClass, RateLimitPolicy, RateLimitResult, RateQuota,
};
pub use schedule::Recurrence;
