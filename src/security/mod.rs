//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → rate_limit.rs (per-client token bucket, when enabled)
//!     → body limit (tower-http, `security.max_body_size`)
//!     → bearer auth (http::middleware::auth)
//! ```
//!
//! # Design Decisions
//! - Rate limiting is off by default
//! - Rejections use the same JSON error envelope as handlers

pub mod rate_limit;

pub use rate_limit::{rate_limit_middleware, RateLimiterState};
