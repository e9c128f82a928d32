#![deny(unreachable_patterns)]
//! Rendering stages for tribute videos.
//!
//! This crate provides:
//! - Photo preparation (EXIF orientation, crop, resize, vignette)
//! - Title slide rendering with wrapped, centered text
//! - Timeline assembly with cross-fades
//! - Soundtrack resolution, looping and fading
//! - Type-safe FFmpeg command building, progress parsing and timeouts
//! - Thumbnails and cross-device file moves

pub mod audio;
pub mod command;
pub mod encoder;
pub mod error;
pub mod filters;
pub mod frame;
pub mod fs_utils;
pub mod image_prep;
pub mod orientation;
pub mod probe;
pub mod progress;
pub mod sequence;
pub mod text;
pub mod thumbnail;
pub mod title;
pub mod vignette;

pub use audio::{AudioMixer, MixedAudio, MusicLibrary, ResolvedTrack};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegInput, FfmpegRunner};
pub use encoder::{FfmpegEncoder, RenderBackend};
pub use error::{MediaError, MediaResult};
pub use frame::PreparedFrame;
pub use fs_utils::{move_file, remove_file_if_exists};
pub use image_prep::prepare_image;
pub use probe::{probe_media, DurationProbe, FfprobeDurationProbe, MediaInfo};
pub use progress::{noop_progress, FfmpegProgress, ProgressCallback};
pub use sequence::{assemble, AssembledSequence, Segment};
pub use thumbnail::{generate_thumbnail, thumbnail_path_for};
pub use title::TitleRenderer;
