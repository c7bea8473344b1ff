//! Sealing request/receipt types and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::resilience::Retryable;

/// How seals are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SealMode {
    /// Sealed by a remote Walacor instance.
    Walacor,
    /// Issued in-process; nothing leaves the service.
    Simulated,
}

/// What gets submitted for sealing. Only the hash and identifiers, never the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SealRequest {
    pub artifact_id: Uuid,
    pub loan_id: String,
    pub payload_sha256: String,
    pub kind: String,
    pub submitted_at: i64,
}

/// Proof that a hash was sealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealReceipt {
    /// Identifier of the sealed record.
    pub etid: String,
    /// Transaction identifier reported by the sealing service, if any.
    pub tx_id: Option<String>,
    pub sealed_at: i64,
}

/// A sealed record as stored by the sealing service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedRecord {
    pub etid: String,
    pub payload_sha256: String,
    pub artifact_id: Option<String>,
    pub sealed_at: Option<i64>,
}

/// Errors that can occur while talking to the sealing service.
#[derive(Debug, Error)]
pub enum SealError {
    /// Connection or protocol failure.
    #[error("sealing transport error: {0}")]
    Transport(String),

    /// Call exceeded its deadline.
    #[error("sealing request timed out after {0} seconds")]
    Timeout(u64),

    /// The service answered with a non-success status.
    #[error("sealing service returned {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Login failed or the token was refused twice.
    #[error("sealing service authentication failed: {0}")]
    Auth(String),

    /// The service answered with something we could not read.
    #[error("malformed sealing response: {0}")]
    Malformed(String),

    #[error("sealing service is disabled")]
    Disabled,
}

impl Retryable for SealError {
    fn is_retryable(&self) -> bool {
        match self {
            SealError::Transport(_) | SealError::Timeout(_) => true,
            SealError::Rejected { status, .. } => *status >= 500 || *status == 429,
            SealError::Auth(_) | SealError::Malformed(_) | SealError::Disabled => false,
        }
    }
}

pub type SealResult<T> = Result<T, SealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(SealError::Timeout(5).is_retryable());
        assert!(SealError::Transport("reset".into()).is_retryable());
        assert!(SealError::Rejected { status: 503, body: String::new() }.is_retryable());
        assert!(SealError::Rejected { status: 429, body: String::new() }.is_retryable());
        assert!(!SealError::Rejected { status: 400, body: String::new() }.is_retryable());
        assert!(!SealError::Auth("nope".into()).is_retryable());
        assert!(!SealError::Disabled.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SealError::Rejected {
            status: 422,
            body: "bad hash".into(),
        };
        assert_eq!(err.to_string(), "sealing service returned 422: bad hash");
        assert_eq!(
            SealError::Timeout(10).to_string(),
            "sealing request timed out after 10 seconds"
        );
    }
}
