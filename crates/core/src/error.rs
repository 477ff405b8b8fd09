use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Unknown job: {0}")]
    UnknownJob(JobId),

    #[error("Invalid state label: {0}")]
    InvalidState(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}
