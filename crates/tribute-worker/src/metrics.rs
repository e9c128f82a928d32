//! Prometheus metrics for the worker.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

use tribute_models::{FailureKind, RenderStage};

use crate::error::{WorkerError, WorkerResult};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "tribute_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "tribute_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "tribute_jobs_failed_total";
    pub const JOBS_CANCEL_REQUESTS_TOTAL: &str = "tribute_jobs_cancel_requests_total";
    pub const JOBS_IN_FLIGHT: &str = "tribute_jobs_in_flight";
    pub const JOBS_QUEUED: &str = "tribute_jobs_queued";

    pub const RENDER_DURATION_SECONDS: &str = "tribute_render_duration_seconds";
    pub const STAGE_DURATION_SECONDS: &str = "tribute_stage_duration_seconds";
    pub const VIDEO_DURATION_SECONDS: &str = "tribute_video_duration_seconds";
}

/// Serve `/metrics` on `addr`.
pub fn init_metrics(addr: SocketAddr) -> WorkerResult<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| WorkerError::config_error(format!("metrics exporter: {}", e)))
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

pub fn record_job_completed(render_secs: f64, video_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS).record(render_secs);
    histogram!(names::VIDEO_DURATION_SECONDS).record(video_secs);
}

pub fn record_job_failed(kind: FailureKind) {
    let labels = [("kind", kind.as_str().to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_cancel_request(outcome: &'static str) {
    let labels = [("outcome", outcome.to_string())];
    counter!(names::JOBS_CANCEL_REQUESTS_TOTAL, &labels).increment(1);
}

pub fn record_stage_duration(stage: RenderStage, secs: f64) {
    let labels = [("stage", stage.as_str().to_string())];
    histogram!(names::STAGE_DURATION_SECONDS, &labels).record(secs);
}

pub fn set_jobs_in_flight(count: usize) {
    gauge!(names::JOBS_IN_FLIGHT).set(count as f64);
}

pub fn set_jobs_queued(count: usize) {
    gauge!(names::JOBS_QUEUED).set(count as f64);
}
