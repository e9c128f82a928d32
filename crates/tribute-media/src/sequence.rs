//! Sequence assembly: lay frames out on a timeline with cross-fades.

use serde::{Deserialize, Serialize};

use tribute_models::RenderSpec;

use crate::command::FfmpegInput;
use crate::error::{MediaError, MediaResult};
use crate::filters::{concat_chain, normalize_video, xfade_chain};
use crate::frame::PreparedFrame;

/// One frame on the timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub frame: PreparedFrame,
    /// Start time in seconds
    pub start: f64,
    /// Time on screen, including both fades
    pub duration: f64,
    pub fade_in: bool,
    pub fade_out: bool,
}

impl Segment {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// The silent video stream, described as FFmpeg inputs plus a filter graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssembledSequence {
    pub segments: Vec<Segment>,
    pub transition: f64,
    pub total_duration: f64,
    pub frame_count: u64,
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
}

impl AssembledSequence {
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// One looped-image input per segment, in timeline order.
    pub fn inputs(&self) -> Vec<FfmpegInput> {
        self.segments
            .iter()
            .map(|s| FfmpegInput::looped_image(&s.frame.path, self.frame_rate, s.duration))
            .collect()
    }

    /// Filter graph producing `[vout]` from inputs `0..len()`.
    pub fn filter_graph(&self) -> String {
        let mut parts: Vec<String> = (0..self.len())
            .map(|i| normalize_video(i, self.width, self.height, self.frame_rate))
            .collect();

        let segment = self.segments.first().map(|s| s.duration).unwrap_or_default();
        if self.transition > 0.0 {
            parts.push(xfade_chain(self.len(), segment, self.transition));
        } else {
            parts.push(concat_chain(self.len()));
        }

        parts.join(";")
    }
}

/// Build the timeline for `frames` (title slide first).
pub fn assemble(frames: Vec<PreparedFrame>, spec: &RenderSpec) -> MediaResult<AssembledSequence> {
    if frames.is_empty() {
        return Err(MediaError::EmptySequence);
    }

    if let Some(frame) = frames
        .iter()
        .find(|f| f.width != spec.width || f.height != spec.height)
    {
        return Err(MediaError::internal(format!(
            "frame {} is {}x{}, expected {}x{}",
            frame.path.display(),
            frame.width,
            frame.height,
            spec.width,
            spec.height
        )));
    }

    let total_duration = spec.sequence_duration(frames.len());
    if total_duration > spec.max_duration_secs {
        return Err(MediaError::DurationLimit {
            duration: total_duration,
            limit: spec.max_duration_secs,
        });
    }

    let step = spec.seconds_per_image - spec.transition_duration;
    let has_fades = spec.transition_duration > 0.0;
    let last = frames.len() - 1;

    let segments = frames
        .into_iter()
        .enumerate()
        .map(|(k, frame)| Segment {
            frame,
            start: k as f64 * step,
            duration: spec.seconds_per_image,
            fade_in: has_fades && k > 0,
            fade_out: has_fades && k < last,
        })
        .collect();

    Ok(AssembledSequence {
        segments,
        transition: spec.transition_duration,
        total_duration,
        frame_count: (total_duration * f64::from(spec.frame_rate)).round() as u64,
        frame_rate: spec.frame_rate,
        width: spec.width,
        height: spec.height,
    })
}
