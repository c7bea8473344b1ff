//! Errors surfaced by the service layer.

use thiserror::Error;

use crate::auth::AuthError;
use crate::domain::validation::FieldError;
use crate::sealing::SealError;
use crate::storage::RepoError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("validation failed: {}", join_fields(.0))]
    Validation(Vec<FieldError>),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("payload of {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error(transparent)]
    Sealing(#[from] SealError),

    #[error(transparent)]
    Storage(RepoError),
}

impl From<RepoError> for ServiceError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Conflict(message) => ServiceError::Conflict(message),
            other => ServiceError::Storage(other),
        }
    }
}

impl From<FieldError> for ServiceError {
    fn from(err: FieldError) -> Self {
        ServiceError::Validation(vec![err])
    }
}

impl ServiceError {
    /// Single-field validation error.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ServiceError::Validation(vec![FieldError {
            field: field.to_string(),
            message: message.into(),
        }])
    }

    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => "validation_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::Auth(AuthError::Forbidden { .. }) => "forbidden",
            ServiceError::Auth(_) => "unauthorized",
            ServiceError::PayloadTooLarge { .. } => "payload_too_large",
            ServiceError::Sealing(_) => "sealing_unavailable",
            ServiceError::Storage(_) => "storage_error",
        }
    }
}

fn join_fields(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type ServiceResult<T> = Result<T, ServiceError>;
