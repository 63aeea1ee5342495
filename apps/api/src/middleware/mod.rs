//! Request-pipeline interceptors.
//!
//! Ordering matters: revocation runs first (outermost) so the
//! authenticated principal is available when the rate limiter picks the
//! identifier to count against.

pub mod rate_limit;
pub mod revocation;
