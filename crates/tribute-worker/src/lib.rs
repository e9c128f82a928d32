//! Tribute render worker.
//!
//! This crate provides:
//! - Job orchestration with a bounded FIFO worker pool
//! - The per-job render pipeline and progress reporting
//! - Job store abstraction with an in-memory implementation
//! - Health checks, structured logging and metrics

pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod orchestrator;
pub mod pipeline;
pub mod store;

pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use health::HealthReport;
pub use logging::JobLogger;
pub use orchestrator::{CancelOutcome, JobOrchestrator};
pub use pipeline::{CancelFlag, JobPipeline, RenderOutput};
pub use store::{update_job, CasOutcome, InMemoryJobStore, JobStore};
