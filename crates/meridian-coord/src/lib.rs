//! # meridian-coord: Redis Coordination Layer for Meridian ERP
//!
//! Distributed primitives shared by every API instance and background
//! process: mutual exclusion, request rate limiting, token revocation,
//! and an at-least-once audit queue with its drain worker.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Coordination Layer Data Flow                        │
//! │                                                                         │
//! │  HTTP request ──► RateLimiter ──► TokenRevocationStore ──► handler      │
//! │                       │                   │                  │           │
//! │                       │                   │                  ├─ LockManager
//! │                       │                   │                  │  (single-writer
//! │                       │                   │                  │   sections)
//! │                       │                   │                  │           │
//! │                       │                   │                  └─ AuditQueue
//! │                       ▼                   ▼                       │      │
//! │                  ┌──────────────────────────────────────────┐     │      │
//! │                  │        KeyValueStore (one trait)         │◄────┘      │
//! │                  │   RedisStore (prod) / MemoryStore (test) │            │
//! │                  └──────────────────────────────────────────┘            │
//! │                                      ▲                                   │
//! │                                      │ rpop batches                      │
//! │                  ┌───────────────────┴───────────┐                       │
//! │                  │       QueueDrainWorker        │──► AuditSink          │
//! │                  │  Idle ⇄ Draining, crash-safe  │    (PostgreSQL)       │
//! │                  └───────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The backing store is the only serialization point: every mutation
//! goes through an atomic primitive it exposes (SET NX, compare-and-
//! delete, INCR), never a read-modify-write from this side. No local
//! in-process state is kept, so any number of service instances can run
//! against the same Redis without extra coordination.
//!
//! ## Module Organization
//! - [`store`] - `KeyValueStore` trait, `RedisStore`, `MemoryStore`
//! - [`lock`] - `LockManager` / `LockGuard` mutual exclusion
//! - [`ratelimit`] - fixed-window `RateLimiter`
//! - [`revocation`] - `TokenRevocationStore` (blacklist + user sets)
//! - [`queue`] - `AuditQueue` (FIFO over Redis lists)
//! - [`worker`] - `QueueDrainWorker`, `AuditSink`
//! - [`jobs`] - `SuspendedTxnSweeper`, `ScheduledJobRunner`
//! - [`config`] - environment-driven `CoordConfig`
//! - [`error`] - `CoordError` taxonomy
//!
//! ## Usage
//! ```rust,ignore
//! use meridian_coord::{CoordConfig, LockManager, RedisStore};
//!
//! let config = CoordConfig::load()?;
//! let store = RedisStore::connect(&config.redis_url).await?;
//! let locks = LockManager::new(Arc::new(store));
//!
//! if let Some(guard) = locks.try_acquire("seq:ORDER", Duration::from_secs(30)).await? {
//!     // single-writer section
//!     guard.release().await?;
//! }
//! ```

pub mod config;
pub mod error;
pub mod jobs;
pub mod lock;
pub mod queue;
pub mod ratelimit;
pub mod revocation;
pub mod store;
pub mod worker;

pub use config::CoordConfig;
pub use error::{CoordError, CoordResult};
pub use jobs::{
    JobRunnerHandle, ScheduledJob, ScheduledJobRunner, ScheduledJobStore, SuspendedTxnStore,
    SuspendedTxnSweeper, SweeperHandle,
};
pub use lock::{LockGuard, LockManager};
pub use queue::AuditQueue;
pub use ratelimit::RateLimiter;
pub use revocation::TokenRevocationStore;
pub use store::{KeyValueStore, MemoryStore, RedisStore};
pub use worker::{AuditSink, DrainState, QueueDrainHandle, QueueDrainWorker};
