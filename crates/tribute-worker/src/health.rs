//! Worker health checks.

use chrono::Utc;
use serde::Serialize;
use std::path::Path;

use tribute_media::title::resolve_font_path;
use tribute_media::{check_ffmpeg, check_ffprobe};

use crate::config::WorkerConfig;

/// Health report.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// `ok` or `degraded`
    pub status: String,
    pub version: String,
    pub timestamp: String,
    pub checks: HealthChecks,
    /// Most recent environment failure seen by a job
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_resource_error: Option<String>,
}

impl HealthReport {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub ffmpeg: CheckStatus,
    pub ffprobe: CheckStatus,
    pub music: CheckStatus,
    pub font: CheckStatus,
    pub temp_dir: CheckStatus,
    pub output_dir: CheckStatus,
}

impl HealthChecks {
    fn all(&self) -> [&CheckStatus; 6] {
        [
            &self.ffmpeg,
            &self.ffprobe,
            &self.music,
            &self.font,
            &self.temp_dir,
            &self.output_dir,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl CheckStatus {
    fn ok(detail: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
            detail: Some(detail.into()),
        }
    }

    /// Usable, with reduced output quality or coverage.
    fn warn(msg: impl Into<String>) -> Self {
        Self {
            status: "warn".to_string(),
            error: Some(msg.into()),
            detail: None,
        }
    }

    fn error(msg: impl Into<String>) -> Self {
        Self {
            status: "error".to_string(),
            error: Some(msg.into()),
            detail: None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.status == "error"
    }
}

/// Run every check against `config`.
pub async fn check(config: &WorkerConfig, last_resource_error: Option<String>) -> HealthReport {
    let ffmpeg = match check_ffmpeg(&config.ffmpeg_path) {
        Ok(path) => CheckStatus::ok(path.display().to_string()),
        Err(e) => CheckStatus::error(e.to_string()),
    };
    let ffprobe = match check_ffprobe(&config.ffprobe_path) {
        Ok(path) => CheckStatus::ok(path.display().to_string()),
        Err(e) => CheckStatus::error(e.to_string()),
    };

    let library = config.music_library();
    let missing = library.missing_builtin_tracks();
    let music = if missing.is_empty() {
        CheckStatus::ok(library.music_dir().display().to_string())
    } else {
        let names: Vec<&str> = missing.iter().map(|t| t.as_str()).collect();
        let msg = format!(
            "missing tracks in {}: {}",
            library.music_dir().display(),
            names.join(", ")
        );
        if missing.len() == tribute_models::MusicTrack::ALL.len() {
            CheckStatus::error(msg)
        } else {
            CheckStatus::warn(msg)
        }
    };

    let font = match resolve_font_path(config.font_path.as_deref()) {
        Some(path) => CheckStatus::ok(path.display().to_string()),
        None => CheckStatus::warn("no font found; title slides render without text"),
    };

    let checks = HealthChecks {
        ffmpeg,
        ffprobe,
        music,
        font,
        temp_dir: check_writable(&config.temp_dir).await,
        output_dir: check_writable(&config.output_dir).await,
    };

    let healthy = !checks.all().iter().any(|c| c.is_error()) && last_resource_error.is_none();

    HealthReport {
        status: if healthy { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
        checks,
        last_resource_error,
    }
}

async fn check_writable(dir: &Path) -> CheckStatus {
    if let Err(e) = tokio::fs::create_dir_all(dir).await {
        return CheckStatus::error(format!("cannot create {}: {}", dir.display(), e));
    }
    match tempfile::tempfile_in(dir) {
        Ok(_) => CheckStatus::ok(dir.display().to_string()),
        Err(e) => CheckStatus::error(format!("{} is not writable: {}", dir.display(), e)),
    }
}
