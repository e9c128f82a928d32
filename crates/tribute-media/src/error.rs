//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for media operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while rendering a tribute video.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Could not load image {path}: {reason}")]
    ImageLoad { path: PathBuf, reason: String },

    #[error("Image {path} is too small ({width}x{height})")]
    ImageDimension {
        path: PathBuf,
        width: u32,
        height: u32,
    },

    #[error("Cannot assemble a video from an empty sequence")]
    EmptySequence,

    #[error("Video would last {duration:.1}s, exceeding the {limit:.0}s limit")]
    DurationLimit { duration: f64, limit: f64 },

    #[error("Unknown music track: {0}")]
    UnknownTrack(String),

    #[error("Music file for track '{track}' not found at {path}")]
    MusicAssetMissing { track: String, path: PathBuf },

    #[error("Invalid audio file {path}: {reason}")]
    InvalidAudio { path: PathBuf, reason: String },

    #[error("FFmpeg not found: {0}")]
    FfmpegNotFound(String),

    #[error("FFprobe not found: {0}")]
    FfprobeNotFound(String),

    #[error("FFmpeg command failed: {message}")]
    FfmpegFailed {
        message: String,
        stderr: Option<String>,
        exit_code: Option<i32>,
    },

    #[error("FFprobe command failed: {message}")]
    FfprobeFailed {
        message: String,
        stderr: Option<String>,
    },

    #[error("Encoding timed out after {0} seconds")]
    Timeout(u64),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid render spec: {0}")]
    InvalidSpec(#[from] tribute_models::SpecError),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MediaError {
    /// Create an image load error.
    pub fn image_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ImageLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an FFmpeg failure error.
    pub fn ffmpeg_failed(
        message: impl Into<String>,
        stderr: Option<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Self::FfmpegFailed {
            message: message.into(),
            stderr,
            exit_code,
        }
    }

    /// Create an invalid audio error.
    pub fn invalid_audio(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::InvalidAudio {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Errors caused by the tribute's own data rather than the environment.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            MediaError::ImageLoad { .. }
                | MediaError::ImageDimension { .. }
                | MediaError::EmptySequence
                | MediaError::DurationLimit { .. }
                | MediaError::UnknownTrack(_)
                | MediaError::InvalidAudio { .. }
                | MediaError::FileNotFound(_)
        )
    }

    /// Errors that point at the host (missing binaries, assets, disk).
    pub fn is_resource_error(&self) -> bool {
        matches!(
            self,
            MediaError::FfmpegNotFound(_)
                | MediaError::FfprobeNotFound(_)
                | MediaError::MusicAssetMissing { .. }
                | MediaError::Io(_)
        )
    }
}
