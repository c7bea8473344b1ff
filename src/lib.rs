//! IntegrityX: tamper-evident storage for loan documents.
//!
//! Documents are hashed, stored, sealed with an external ledger (Walacor)
//! and can later be verified, attested, linked by provenance and analysed.

pub mod auth;
pub mod config;
pub mod domain;
pub mod http;
pub mod integrity;
pub mod lifecycle;
pub mod observability;
pub mod resilience;
pub mod sealing;
pub mod security;
pub mod services;
pub mod storage;

pub use config::IntegrityConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
