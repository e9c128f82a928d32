//! Shared data models for the tribute video backend.
//!
//! This crate provides Serde-serializable types for:
//! - Generation jobs and their state machine
//! - Tribute inputs handed over by the surrounding application
//! - Render and encoding configuration
//! - Built-in music tracks

pub mod encoding;
pub mod job;
pub mod music;
pub mod render_spec;
pub mod tribute;

// Re-export common types
pub use encoding::EncodingConfig;
pub use job::{FailureKind, GenerationJob, JobId, JobState, JobStatus, RenderStage, TransitionError};
pub use music::{MusicTrack, CUSTOM_TRACK_ID};
pub use render_spec::{RenderSpec, SpecError, TitleStyle};
pub use tribute::TributeInput;
