//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to the sealing service:
//!     → per-call timeout (reqwest client)
//!     → On transient failure: retries.rs (retry with backoff.rs delay)
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every external call has a deadline
//! - Rejections (4xx) are final; transport errors and 5xx are retried

pub mod backoff;
pub mod retries;

pub use retries::{retry_with_backoff, Retryable};
