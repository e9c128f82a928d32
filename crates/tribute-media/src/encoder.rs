//! Final render: video sequence plus soundtrack into one MP4.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use tribute_models::RenderSpec;

use crate::audio::MixedAudio;
use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::{MediaError, MediaResult};
use crate::filters::{AUDIO_OUT, VIDEO_OUT};
use crate::progress::ProgressCallback;
use crate::sequence::AssembledSequence;

/// Something that can turn a planned sequence and soundtrack into a video file.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Render to `output` and return the written path.
    async fn render(
        &self,
        spec: &RenderSpec,
        sequence: &AssembledSequence,
        audio: &MixedAudio,
        output: &Path,
        progress: ProgressCallback,
    ) -> MediaResult<PathBuf>;
}

/// [`RenderBackend`] that shells out to FFmpeg.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    runner: FfmpegRunner,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, timeout_secs: u64) -> Self {
        Self {
            runner: FfmpegRunner::new()
                .with_binary(ffmpeg_path)
                .with_timeout(timeout_secs),
        }
    }

    /// The single FFmpeg invocation for a render.
    pub fn build_command(
        spec: &RenderSpec,
        sequence: &AssembledSequence,
        audio: &MixedAudio,
        output: &Path,
    ) -> FfmpegCommand {
        let filter = format!(
            "{};{}",
            sequence.filter_graph(),
            audio.filter_graph(sequence.len())
        );

        FfmpegCommand::new(output)
            .inputs(sequence.inputs())
            .inputs(audio.inputs())
            .filter_complex(filter)
            .map(VIDEO_OUT)
            .map(AUDIO_OUT)
            .output_args(spec.encoding.output_args(spec.frame_rate))
            .faststart()
            .duration(sequence.total_duration)
    }
}

#[async_trait]
impl RenderBackend for FfmpegEncoder {
    async fn render(
        &self,
        spec: &RenderSpec,
        sequence: &AssembledSequence,
        audio: &MixedAudio,
        output: &Path,
        progress: ProgressCallback,
    ) -> MediaResult<PathBuf> {
        if sequence.is_empty() {
            return Err(MediaError::EmptySequence);
        }

        let cmd = Self::build_command(spec, sequence, audio, output);
        info!(
            segments = sequence.len(),
            duration = sequence.total_duration,
            output = %output.display(),
            "Encoding tribute video"
        );

        self.runner.run_with_progress(&cmd, progress).await?;

        if !output.is_file() {
            return Err(MediaError::ffmpeg_failed(
                "FFmpeg finished without writing the output file",
                None,
                None,
            ));
        }

        Ok(output.to_path_buf())
    }
}
