//! Repository implementations.
//!
//! One repository per table. Only the audit sink lives here; the wider
//! ERP schema has its own owners.

pub mod audit;
