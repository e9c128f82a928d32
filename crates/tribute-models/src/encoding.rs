//! Output encoding settings for rendered tributes.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
pub const DEFAULT_PRESET: &str = "fast";
pub const DEFAULT_CRF: u8 = 23;
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Pixel format accepted by every mainstream player
pub const DEFAULT_PIXEL_FORMAT: &str = "yuv420p";

/// Highest CRF x264/x265 accept.
pub const MAX_CRF: u8 = 51;

pub const THUMBNAIL_WIDTH: u32 = 320;
pub const THUMBNAIL_HEIGHT: u32 = 180;
pub const THUMBNAIL_JPEG_QUALITY: u8 = 85;

/// Every soundtrack is resampled to this before mixing.
pub const AUDIO_SAMPLE_RATE: u32 = 44_100;
pub const AUDIO_CHANNEL_LAYOUT: &str = "stereo";
pub const AUDIO_CHANNELS: u32 = 2;

/// Codec settings for the final MP4.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// x264 speed/size trade-off ("fast", "medium", ...)
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Constant Rate Factor, 0-51, lower is better
    #[serde(default = "default_crf")]
    pub crf: u8,

    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Appended after the generated output arguments
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_crf() -> u8 {
    DEFAULT_CRF
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            codec: default_video_codec(),
            preset: default_preset(),
            crf: DEFAULT_CRF,
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            extra_args: Vec::new(),
        }
    }
}

impl EncodingConfig {
    /// Output arguments for a video at `frame_rate`: video codec, pixel
    /// format and rate, then audio codec and layout, then `extra_args`.
    pub fn output_args(&self, frame_rate: u32) -> Vec<String> {
        let crf = self.crf.to_string();
        let rate = frame_rate.to_string();
        let sample_rate = AUDIO_SAMPLE_RATE.to_string();
        let channels = AUDIO_CHANNELS.to_string();

        let args: [&str; 18] = [
            "-c:v",
            &self.codec,
            "-preset",
            &self.preset,
            "-crf",
            &crf,
            "-pix_fmt",
            DEFAULT_PIXEL_FORMAT,
            "-r",
            &rate,
            "-c:a",
            &self.audio_codec,
            "-b:a",
            &self.audio_bitrate,
            "-ar",
            &sample_rate,
            "-ac",
            &channels,
        ];

        args.iter()
            .map(|s| s.to_string())
            .chain(self.extra_args.iter().cloned())
            .collect()
    }
}
