//! One tribute render, stage by stage.
//!
//! The pipeline owns the job's scratch directory and reports progress into
//! the job store. Terminal states are written by the orchestrator.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use validator::Validate;

use tribute_media::{
    assemble, generate_thumbnail, move_file, prepare_image, remove_file_if_exists,
    thumbnail_path_for, AudioMixer, FfmpegProgress, MediaError, PreparedFrame, ProgressCallback,
    RenderBackend, TitleRenderer,
};
use tribute_models::{JobId, RenderStage, TributeInput};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::store::{update_job, JobStore};

/// Cooperative cancellation signal for one job.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Checkpoint between work units.
    pub fn check(&self) -> WorkerResult<()> {
        if self.is_cancelled() {
            Err(WorkerError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Files produced by a successful render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub output_path: PathBuf,
    pub thumbnail_path: Option<PathBuf>,
    /// Length of the rendered video in seconds
    pub video_duration: f64,
}

/// Runs the render stages for a job.
pub struct JobPipeline {
    config: Arc<WorkerConfig>,
    store: Arc<dyn JobStore>,
    backend: Arc<dyn RenderBackend>,
    mixer: AudioMixer,
    title: TitleRenderer,
}

impl JobPipeline {
    pub fn new(
        config: Arc<WorkerConfig>,
        store: Arc<dyn JobStore>,
        backend: Arc<dyn RenderBackend>,
        mixer: AudioMixer,
        title: TitleRenderer,
    ) -> Self {
        Self {
            config,
            store,
            backend,
            mixer,
            title,
        }
    }

    pub fn title_renderer(&self) -> &TitleRenderer {
        &self.title
    }

    /// Render `input` for a job that is already processing.
    pub async fn run(
        &self,
        job_id: &JobId,
        input: &TributeInput,
        cancel: &CancelFlag,
    ) -> WorkerResult<RenderOutput> {
        let logger = JobLogger::new(job_id, input.tribute_id, "render_tribute");
        let spec = &self.config.render;
        cancel.check()?;

        input.validate()?;
        if input.images.is_empty() {
            return Err(MediaError::EmptySequence.into());
        }

        // Cheap checks first so bad input fails before any image work
        let track = self
            .mixer
            .resolve(&input.music_track, input.custom_music_path.as_deref())?;
        let expected = spec.sequence_duration(input.images.len() + 1);
        if expected > spec.max_duration_secs {
            return Err(MediaError::DurationLimit {
                duration: expected,
                limit: spec.max_duration_secs,
            }
            .into());
        }

        tokio::fs::create_dir_all(&self.config.temp_dir).await?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("job-{}-", job_id))
            .tempdir_in(&self.config.temp_dir)?;
        logger.log_start(&format!(
            "{} images, track '{}', scratch {}",
            input.images.len(),
            track.id,
            scratch.path().display()
        ));

        // Photos
        let stage_started = Instant::now();
        self.enter(&logger, job_id, RenderStage::PreparingImages, 0).await?;
        let mut frames = Vec::with_capacity(input.images.len() + 1);
        let total = input.images.len();
        for (i, source) in input.images.iter().enumerate() {
            cancel.check()?;
            let frame = self.prepare(source, i + 1, scratch.path()).await?;
            frames.push(frame);
            let progress = RenderStage::PreparingImages.progress_at((i + 1) as f64 / total as f64);
            self.report(job_id, RenderStage::PreparingImages, progress).await?;
        }
        metrics::record_stage_duration(RenderStage::PreparingImages, stage_started.elapsed().as_secs_f64());

        // Title slide
        cancel.check()?;
        let stage_started = Instant::now();
        self.enter(&logger, job_id, RenderStage::BuildingTitle, 30).await?;
        let title_frame = self.render_title(input, scratch.path()).await?;
        frames.insert(0, title_frame.clone());
        self.report(job_id, RenderStage::BuildingTitle, 40).await?;
        metrics::record_stage_duration(RenderStage::BuildingTitle, stage_started.elapsed().as_secs_f64());

        // Timeline and soundtrack
        cancel.check()?;
        let stage_started = Instant::now();
        self.enter(&logger, job_id, RenderStage::AssemblingSequence, 40).await?;
        let sequence = assemble(frames, spec)?;
        self.report(job_id, RenderStage::AssemblingSequence, 55).await?;
        let audio = self.mixer.mix(track, sequence.total_duration, spec).await?;
        self.report(job_id, RenderStage::AssemblingSequence, 70).await?;
        metrics::record_stage_duration(
            RenderStage::AssemblingSequence,
            stage_started.elapsed().as_secs_f64(),
        );

        // Encode. Cancellation from here on is honored once the encoder returns.
        cancel.check()?;
        let stage_started = Instant::now();
        self.enter(&logger, job_id, RenderStage::Encoding, 70).await?;
        let rendered = scratch.path().join("render.mp4");
        let total_duration = sequence.total_duration;

        let (tx, mut rx) = mpsc::unbounded_channel::<u8>();
        let progress: ProgressCallback = Arc::new(move |p: FfmpegProgress| {
            let overall = RenderStage::Encoding.progress_at(p.fraction(total_duration)).min(99);
            let _ = tx.send(overall);
        });

        let timeout = self.config.encode_timeout;
        let render = tokio::time::timeout(
            timeout,
            self.backend
                .render(spec, &sequence, &audio, &rendered, progress),
        );
        tokio::pin!(render);

        let mut last_reported = 70;
        let result = loop {
            tokio::select! {
                result = &mut render => break result,
                Some(progress) = rx.recv() => {
                    if progress > last_reported {
                        last_reported = self.report(job_id, RenderStage::Encoding, progress).await?;
                    }
                }
            }
        };

        let written = match result {
            Ok(written) => written?,
            Err(_) => {
                remove_file_if_exists(&rendered).await;
                return Err(MediaError::Timeout(timeout.as_secs()).into());
            }
        };
        metrics::record_stage_duration(RenderStage::Encoding, stage_started.elapsed().as_secs_f64());

        if cancel.is_cancelled() {
            logger.log_warning("Cancelled during encoding, discarding rendered video");
            remove_file_if_exists(&written).await;
            return Err(WorkerError::Cancelled);
        }

        let output_path = self.config.output_path(input.tribute_id, job_id.as_str());
        move_file(&written, &output_path).await?;
        let thumbnail_path = self
            .write_thumbnail(&title_frame.path, &output_path, &logger)
            .await;

        Ok(RenderOutput {
            output_path,
            thumbnail_path,
            video_duration: total_duration,
        })
    }

    async fn prepare(&self, source: &Path, index: usize, dir: &Path) -> WorkerResult<PreparedFrame> {
        let config = Arc::clone(&self.config);
        let source = source.to_path_buf();
        let dir = dir.to_path_buf();

        tokio::task::spawn_blocking(move || prepare_image(&source, index, &config.render, &dir))
            .await
            .map_err(|e| WorkerError::internal(format!("image preparation task failed: {}", e)))?
            .map_err(Into::into)
    }

    async fn render_title(&self, input: &TributeInput, dir: &Path) -> WorkerResult<PreparedFrame> {
        let config = Arc::clone(&self.config);
        let renderer = self.title.clone();
        let title = input.slide_title().to_string();
        let message = input.slide_message().to_string();
        let dir = dir.to_path_buf();

        tokio::task::spawn_blocking(move || renderer.render(&title, &message, &config.render, &dir))
            .await
            .map_err(|e| WorkerError::internal(format!("title slide task failed: {}", e)))?
            .map_err(Into::into)
    }

    /// Thumbnails are best effort; a failure leaves the job without one.
    async fn write_thumbnail(
        &self,
        frame: &Path,
        video: &Path,
        logger: &JobLogger,
    ) -> Option<PathBuf> {
        let frame = frame.to_path_buf();
        let thumbnail = thumbnail_path_for(video);
        let target = thumbnail.clone();

        match tokio::task::spawn_blocking(move || generate_thumbnail(&frame, &target)).await {
            Ok(Ok(())) => Some(thumbnail),
            Ok(Err(e)) => {
                logger.log_warning(&format!("Thumbnail generation failed: {}", e));
                None
            }
            Err(e) => {
                logger.log_warning(&format!("Thumbnail task failed: {}", e));
                None
            }
        }
    }

    async fn enter(
        &self,
        logger: &JobLogger,
        job_id: &JobId,
        stage: RenderStage,
        progress: u8,
    ) -> WorkerResult<()> {
        let recorded = self.report(job_id, stage, progress).await?;
        logger.log_stage(stage, recorded);
        Ok(())
    }

    /// Record progress; returns the value stored after clamping.
    async fn report(&self, job_id: &JobId, stage: RenderStage, progress: u8) -> WorkerResult<u8> {
        let (_, recorded) =
            update_job(self.store.as_ref(), job_id, |job| Ok(job.advance(stage, progress)?)).await?;
        Ok(recorded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_flag() {
        let flag = CancelFlag::default();
        assert!(flag.check().is_ok());

        let shared = flag.clone();
        shared.cancel();
        assert!(flag.is_cancelled());
        assert!(matches!(flag.check(), Err(WorkerError::Cancelled)));
    }
}
