//! Worker error types.

use thiserror::Error;
use validator::ValidationErrors;

use tribute_media::MediaError;
use tribute_models::{FailureKind, JobId, TransitionError};

pub type WorkerResult<T> = Result<T, WorkerError>;

/// Message recorded on jobs cancelled by the user.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Invalid tribute: {0}")]
    InvalidInput(String),

    #[error("Cancelled by user")]
    Cancelled,

    #[error("Job not found: {0}")]
    JobNotFound(JobId),

    #[error("Invalid job transition: {0}")]
    Transition(#[from] TransitionError),

    #[error("Job store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Worker is shutting down")]
    ShuttingDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Only field names and rule codes are kept; the rejected values can be large.
impl From<ValidationErrors> for WorkerError {
    fn from(errors: ValidationErrors) -> Self {
        let mut problems: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, rules)| {
                rules
                    .iter()
                    .map(move |rule| format!("{}: {}", field, rule.code))
            })
            .collect();
        problems.sort();
        Self::InvalidInput(problems.join(", "))
    }
}

impl WorkerError {
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// How a job failing with this error is classified.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            WorkerError::Media(e) => match e {
                MediaError::Timeout(_) => FailureKind::Timeout,
                MediaError::Cancelled => FailureKind::Cancelled,
                MediaError::FfmpegFailed { .. } => FailureKind::Encode,
                // Probe failures only happen on unreadable audio assets
                MediaError::FfprobeFailed { .. } => FailureKind::Input,
                e if e.is_input_error() => FailureKind::Input,
                e if e.is_resource_error() => FailureKind::Resource,
                MediaError::Image(_) => FailureKind::Resource,
                _ => FailureKind::Internal,
            },
            WorkerError::InvalidInput(_) => FailureKind::Input,
            WorkerError::Cancelled => FailureKind::Cancelled,
            WorkerError::Io(_) => FailureKind::Resource,
            WorkerError::JobNotFound(_)
            | WorkerError::Transition(_)
            | WorkerError::Store(_)
            | WorkerError::ConfigError(_)
            | WorkerError::ShuttingDown
            | WorkerError::Internal(_) => FailureKind::Internal,
        }
    }

    /// Environment problems worth surfacing in health checks.
    pub fn is_resource_error(&self) -> bool {
        self.failure_kind() == FailureKind::Resource
    }

    pub fn is_cancelled(&self) -> bool {
        self.failure_kind() == FailureKind::Cancelled
    }
}
