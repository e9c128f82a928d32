//! Fixed render parameters shared by every pipeline stage.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::encoding::EncodingConfig;

pub const DEFAULT_WIDTH: u32 = 1920;
pub const DEFAULT_HEIGHT: u32 = 1080;
pub const DEFAULT_FRAME_RATE: u32 = 30;
pub const DEFAULT_SECONDS_PER_IMAGE: f64 = 4.0;
pub const DEFAULT_TRANSITION_SECS: f64 = 1.0;
pub const DEFAULT_VIGNETTE_EDGE: f32 = 0.6;
pub const DEFAULT_MAX_DURATION_SECS: f64 = 300.0;
pub const DEFAULT_AUDIO_LOOP_CROSSFADE: f64 = 1.5;
pub const DEFAULT_AUDIO_FADE_OUT: f64 = 2.0;

/// Invalid render configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SpecError {
    #[error("frame size must be positive and even, got {width}x{height}")]
    InvalidFrameSize { width: u32, height: u32 },

    #[error("frame rate must be positive")]
    InvalidFrameRate,

    #[error("seconds per image must be positive, got {0}")]
    InvalidImageDuration(f64),

    #[error("transition duration {transition}s must be >= 0 and shorter than seconds per image {per_image}s")]
    TransitionTooLong { transition: f64, per_image: f64 },

    #[error("vignette edge brightness must be within 0.0..=1.0, got {0}")]
    InvalidVignette(f32),

    #[error("invalid title style: {0}")]
    InvalidTitleStyle(String),
}

/// Title slide typography, expressed relative to the frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TitleStyle {
    /// Title font size as a fraction of frame height
    pub font_size_ratio: f32,
    /// Smallest title font size the layout may shrink to
    pub min_font_size_ratio: f32,
    /// Message font size relative to the title font size
    pub message_scale: f32,
    /// Horizontal and vertical safe margin as a fraction of the frame
    pub safe_margin_ratio: f32,
    /// Line height as a multiple of font size
    pub line_spacing: f32,
}

impl Default for TitleStyle {
    fn default() -> Self {
        Self {
            font_size_ratio: 0.08,
            min_font_size_ratio: 0.035,
            message_scale: 0.55,
            safe_margin_ratio: 0.10,
            line_spacing: 1.3,
        }
    }
}

/// Render parameters. Built once from configuration and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RenderSpec {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// How long each frame is on screen, including its transitions
    pub seconds_per_image: f64,
    /// Cross-fade length between consecutive frames
    pub transition_duration: f64,
    pub encoding: EncodingConfig,
    /// Brightness multiplier at the frame corners (1.0 = no vignette)
    pub vignette_edge_brightness: f32,
    pub title: TitleStyle,
    /// Crossfade used at audio loop points
    pub audio_loop_crossfade: f64,
    /// Maximum fade-out applied to the end of the soundtrack
    pub audio_fade_out: f64,
    /// Upper bound for the rendered video length
    pub max_duration_secs: f64,
}

impl Default for RenderSpec {
    fn default() -> Self {
        Self {
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frame_rate: DEFAULT_FRAME_RATE,
            seconds_per_image: DEFAULT_SECONDS_PER_IMAGE,
            transition_duration: DEFAULT_TRANSITION_SECS,
            encoding: EncodingConfig::default(),
            vignette_edge_brightness: DEFAULT_VIGNETTE_EDGE,
            title: TitleStyle::default(),
            audio_loop_crossfade: DEFAULT_AUDIO_LOOP_CROSSFADE,
            audio_fade_out: DEFAULT_AUDIO_FADE_OUT,
            max_duration_secs: DEFAULT_MAX_DURATION_SECS,
        }
    }
}

impl RenderSpec {
    /// Check the invariants every stage relies on.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.width == 0 || self.height == 0 || self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(SpecError::InvalidFrameSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.frame_rate == 0 {
            return Err(SpecError::InvalidFrameRate);
        }
        if !(self.seconds_per_image > 0.0) {
            return Err(SpecError::InvalidImageDuration(self.seconds_per_image));
        }
        if !(self.transition_duration >= 0.0) || self.transition_duration >= self.seconds_per_image {
            return Err(SpecError::TransitionTooLong {
                transition: self.transition_duration,
                per_image: self.seconds_per_image,
            });
        }
        if !(0.0..=1.0).contains(&self.vignette_edge_brightness) {
            return Err(SpecError::InvalidVignette(self.vignette_edge_brightness));
        }
        let title = &self.title;
        if !(title.min_font_size_ratio > 0.0 && title.min_font_size_ratio <= title.font_size_ratio) {
            return Err(SpecError::InvalidTitleStyle(
                "min_font_size_ratio must be in (0, font_size_ratio]".to_string(),
            ));
        }
        if !(title.message_scale > 0.0) {
            return Err(SpecError::InvalidTitleStyle(
                "message_scale must be positive".to_string(),
            ));
        }
        if !(title.line_spacing > 0.0) {
            return Err(SpecError::InvalidTitleStyle(
                "line_spacing must be positive".to_string(),
            ));
        }
        if !(0.0..0.5).contains(&title.safe_margin_ratio) {
            return Err(SpecError::InvalidTitleStyle(
                "safe_margin_ratio must be in [0, 0.5)".to_string(),
            ));
        }
        Ok(())
    }

    /// Duration of a single frame at the configured rate.
    pub fn frame_time(&self) -> f64 {
        1.0 / f64::from(self.frame_rate)
    }

    /// Total video length for `frame_count` frames.
    pub fn sequence_duration(&self, frame_count: usize) -> f64 {
        if frame_count == 0 {
            return 0.0;
        }
        let n = frame_count as f64;
        n * self.seconds_per_image - (n - 1.0) * self.transition_duration
    }
}
