use thiserror::Error;

use crate::domain::PolicyId;

use super::document::DecodeError;
use super::validator::ValidationFailure;

/// Infrastructure faults. Retrying idempotent reads on these is reasonable.
#[derive(Error, Debug)]
pub enum SystemError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Lookups of missing policies are reported as system faults.
    #[error("policy {0} not found")]
    NotFound(PolicyId),

    #[error("storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

/// Outcome of a failed policy operation.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// Malformed identifier; storage was not touched.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Business-rule rejection of the candidate policy.
    #[error(transparent)]
    Validation(ValidationFailure),

    #[error(transparent)]
    System(#[from] SystemError),
}

impl PolicyError {
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyError::BadRequest(_) => "bad_request",
            PolicyError::Validation(_) => "validation",
            PolicyError::System(_) => "system",
        }
    }

    pub fn is_system(&self) -> bool {
        matches!(self, PolicyError::System(_))
    }
}

impl From<anyhow::Error> for PolicyError {
    fn from(e: anyhow::Error) -> Self {
        PolicyError::System(SystemError::Storage(e))
    }
}

impl From<DecodeError> for PolicyError {
    fn from(e: DecodeError) -> Self {
        PolicyError::System(SystemError::Decode(e))
    }
}

impl From<ValidationFailure> for PolicyError {
    fn from(failure: ValidationFailure) -> Self {
        PolicyError::Validation(failure)
    }
}
