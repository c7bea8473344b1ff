//! Request middleware.
//!
//! # Order
//! ```text
//! request id → trace → timeout → metrics → [rate limit] → body limit
//!     → auth (protected routes only) → handler
//! ```

pub mod auth;
pub mod metrics;

pub use auth::auth_middleware;
pub use metrics::track_metrics;
