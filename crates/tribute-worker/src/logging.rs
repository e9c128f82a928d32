//! Structured job logging utilities.
//!
//! Provides consistent, structured logging for job processing with
//! tracing spans and contextual information.

use tracing::{error, info, warn, Span};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use tribute_models::{JobId, RenderStage};

/// Install the global subscriber: pretty output by default, JSON with `LOG_FORMAT=json`.
pub fn init_tracing() {
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tribute_media=info,tribute_worker=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
}

/// Job logger for structured logging with consistent formatting.
///
/// Every line carries the job ID, the owning tribute and the operation.
#[derive(Debug, Clone)]
pub struct JobLogger {
    job_id: String,
    tribute_id: u64,
    operation: String,
}

impl JobLogger {
    /// Create a new job logger for a specific job and operation.
    pub fn new(job_id: &JobId, tribute_id: u64, operation: &str) -> Self {
        Self {
            job_id: job_id.to_string(),
            tribute_id,
            operation: operation.to_string(),
        }
    }

    /// Log the start of a job operation.
    pub fn log_start(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            tribute_id = self.tribute_id,
            operation = %self.operation,
            "Job started: {}", message
        );
    }

    /// Log entry into a render stage.
    pub fn log_stage(&self, stage: RenderStage, progress: u8) {
        info!(
            job_id = %self.job_id,
            tribute_id = self.tribute_id,
            operation = %self.operation,
            stage = %stage,
            progress,
            "Job stage: {}", stage
        );
    }

    /// Log a warning during job execution.
    pub fn log_warning(&self, message: &str) {
        warn!(
            job_id = %self.job_id,
            tribute_id = self.tribute_id,
            operation = %self.operation,
            "Job warning: {}", message
        );
    }

    /// Log an error during job execution.
    pub fn log_error(&self, message: &str) {
        error!(
            job_id = %self.job_id,
            tribute_id = self.tribute_id,
            operation = %self.operation,
            "Job error: {}", message
        );
    }

    /// Log the completion of a job operation.
    pub fn log_completion(&self, message: &str) {
        info!(
            job_id = %self.job_id,
            tribute_id = self.tribute_id,
            operation = %self.operation,
            "Job completed: {}", message
        );
    }

    /// Create a tracing span for this job.
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "job",
            job_id = %self.job_id,
            tribute_id = self.tribute_id,
            operation = %self.operation
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_span_carries_job_fields() {
        let job_id = JobId::new();
        let logger = JobLogger::new(&job_id, 3, "render_tribute");

        tracing::subscriber::with_default(tracing_subscriber::registry(), || {
            let span = logger.create_span();
            let metadata = span.metadata().expect("span enabled under a subscriber");
            assert_eq!(metadata.name(), "job");
            for field in ["job_id", "tribute_id", "operation"] {
                assert!(metadata.fields().field(field).is_some(), "missing {}", field);
            }
            logger.log_stage(RenderStage::Encoding, 70);
        });
    }
}
