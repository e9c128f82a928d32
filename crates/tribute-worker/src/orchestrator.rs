//! Job orchestrator.
//!
//! Jobs are queued FIFO on an unbounded channel. A dispatcher task takes a
//! permit from a semaphore sized to `max_concurrent_jobs` before starting
//! each job, so jobs start in submission order and at most N run at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument};

use tribute_media::{
    AudioMixer, DurationProbe, FfmpegEncoder, FfprobeDurationProbe, MusicLibrary, RenderBackend,
    TitleRenderer,
};
use tribute_models::{FailureKind, GenerationJob, JobId, JobState, RenderStage, TributeInput};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult, CANCELLED_MESSAGE};
use crate::health::{self, HealthReport};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline::{CancelFlag, JobPipeline, RenderOutput};
use crate::store::{update_job, CasOutcome, InMemoryJobStore, JobStore};

const MAX_CANCEL_ATTEMPTS: usize = 16;

/// What a cancel request did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job had not started and is now failed as cancelled.
    Cancelled,
    /// The job is running; it stops at the next checkpoint.
    Requested,
    /// The job is encoding; it fails as cancelled once the encoder returns.
    Deferred,
    /// The job had already completed or failed.
    AlreadyFinished,
}

impl CancelOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelOutcome::Cancelled => "cancelled",
            CancelOutcome::Requested => "requested",
            CancelOutcome::Deferred => "deferred",
            CancelOutcome::AlreadyFinished => "already_finished",
        }
    }
}

#[derive(Debug)]
struct QueuedJob {
    id: JobId,
    input: TributeInput,
}

struct Inner {
    config: Arc<WorkerConfig>,
    store: Arc<dyn JobStore>,
    pipeline: JobPipeline,
    semaphore: Arc<Semaphore>,
    cancel_flags: Mutex<HashMap<JobId, CancelFlag>>,
    accepting: AtomicBool,
    queued: AtomicUsize,
    in_flight: AtomicUsize,
    last_resource_error: Mutex<Option<String>>,
}

/// Accepts tribute renders and runs them on a bounded worker pool.
///
/// Must be created inside a tokio runtime.
pub struct JobOrchestrator {
    inner: Arc<Inner>,
    sender: Mutex<Option<mpsc::UnboundedSender<QueuedJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl JobOrchestrator {
    /// Build an orchestrator with explicit collaborators.
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn JobStore>,
        backend: Arc<dyn RenderBackend>,
        probe: Arc<dyn DurationProbe>,
        library: MusicLibrary,
    ) -> WorkerResult<Self> {
        config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| WorkerError::config_error("JobOrchestrator requires a tokio runtime"))?;

        let config = Arc::new(config);
        let title = TitleRenderer::new(config.font_path.as_deref());
        let pipeline = JobPipeline::new(
            Arc::clone(&config),
            Arc::clone(&store),
            backend,
            AudioMixer::new(library, probe),
            title,
        );

        let inner = Arc::new(Inner {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent_jobs)),
            config,
            store,
            pipeline,
            cancel_flags: Mutex::new(HashMap::new()),
            accepting: AtomicBool::new(true),
            queued: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            last_resource_error: Mutex::new(None),
        });

        let (sender, receiver) = mpsc::unbounded_channel();
        let dispatcher = runtime.spawn(dispatch(Arc::clone(&inner), receiver));

        info!(
            "Job orchestrator started with {} max concurrent jobs",
            inner.config.max_concurrent_jobs
        );

        Ok(Self {
            inner,
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// FFmpeg-backed orchestrator with an in-memory job store.
    pub fn from_config(config: WorkerConfig) -> WorkerResult<Self> {
        let backend = Arc::new(FfmpegEncoder::new(
            config.ffmpeg_path.clone(),
            config.encode_timeout.as_secs().max(1),
        ));
        let probe = Arc::new(FfprobeDurationProbe::new(config.ffprobe_path.clone()));
        let library = config.music_library();
        Self::new(
            config,
            Arc::new(InMemoryJobStore::new()),
            backend,
            probe,
            library,
        )
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.inner.config
    }

    /// Record a pending job and queue it. Returns without waiting for any work.
    pub async fn submit(&self, input: TributeInput) -> WorkerResult<JobId> {
        if !self.inner.accepting.load(Ordering::SeqCst) {
            return Err(WorkerError::ShuttingDown);
        }
        let sender = lock(&self.sender).clone().ok_or(WorkerError::ShuttingDown)?;

        let job = GenerationJob::new(input.tribute_id);
        let id = job.id.clone();
        let tribute_id = input.tribute_id;
        self.inner.store.insert(job).await?;
        lock(&self.inner.cancel_flags).insert(id.clone(), CancelFlag::default());

        if sender
            .send(QueuedJob {
                id: id.clone(),
                input,
            })
            .is_err()
        {
            // The dispatcher is gone; do not leave a pending record behind
            self.inner.forget(&id);
            let reason = WorkerError::ShuttingDown.to_string();
            let failed = update_job(self.inner.store.as_ref(), &id, |job| {
                Ok(job.fail(FailureKind::Internal, reason.clone())?)
            })
            .await;
            if let Err(e) = failed {
                error!(job_id = %id, "Could not fail unqueued job: {}", e);
            }
            return Err(WorkerError::ShuttingDown);
        }

        let queued = self.inner.queued.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::record_job_submitted();
        metrics::set_jobs_queued(queued);
        info!(job_id = %id, tribute_id, "Job submitted");
        Ok(id)
    }

    /// Snapshot of a job record.
    pub async fn get_status(&self, id: &JobId) -> WorkerResult<Option<GenerationJob>> {
        self.inner.store.get(id).await
    }

    /// Cancel a job. See [`CancelOutcome`] for what happens in each state.
    pub async fn cancel(&self, id: &JobId) -> WorkerResult<CancelOutcome> {
        let outcome = self.inner.cancel(id).await?;
        metrics::record_cancel_request(outcome.as_str());
        info!(job_id = %id, outcome = outcome.as_str(), "Cancel requested");
        Ok(outcome)
    }

    /// Jobs for one tribute, newest first.
    pub async fn jobs_for_tribute(&self, tribute_id: u64) -> WorkerResult<Vec<GenerationJob>> {
        let mut jobs = self.inner.store.list_for_tribute(tribute_id).await?;
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    /// Health of the environment plus the last resource failure seen by a job.
    pub async fn health(&self) -> HealthReport {
        let last = lock(&self.inner.last_resource_error).clone();
        health::check(&self.inner.config, last).await
    }

    pub fn last_resource_error(&self) -> Option<String> {
        lock(&self.inner.last_resource_error).clone()
    }

    /// Stop accepting work and wait, up to the shutdown timeout, for running jobs.
    ///
    /// Jobs still queued are left pending.
    pub async fn shutdown(&self) {
        self.inner.accepting.store(false, Ordering::SeqCst);
        drop(lock(&self.sender).take());

        let handle = lock(&self.dispatcher).take();
        let Some(handle) = handle else {
            return;
        };

        info!("Waiting for in-flight jobs to complete...");
        match tokio::time::timeout(self.inner.config.shutdown_timeout, handle).await {
            Ok(_) => info!("Job orchestrator stopped"),
            Err(_) => warn!(
                "Shutdown timed out after {:?} with {} jobs still running",
                self.inner.config.shutdown_timeout,
                self.inner.in_flight.load(Ordering::SeqCst)
            ),
        }
    }
}

/// Start queued jobs in order, at most `max_concurrent_jobs` at a time.
async fn dispatch(inner: Arc<Inner>, mut receiver: mpsc::UnboundedReceiver<QueuedJob>) {
    while let Some(queued) = receiver.recv().await {
        let permit = match Arc::clone(&inner.semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let remaining = inner.queued.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_jobs_queued(remaining);

        if !inner.accepting.load(Ordering::SeqCst) {
            debug!(job_id = %queued.id, "Shutting down, leaving job pending");
            inner.forget(&queued.id);
            continue;
        }

        let job_inner = Arc::clone(&inner);
        tokio::spawn(async move {
            let _permit = permit;
            job_inner.run_job(queued).await;
        });
    }

    // Every permit back means every started job has finished
    let all = u32::try_from(inner.config.max_concurrent_jobs).unwrap_or(u32::MAX);
    let _ = inner.semaphore.acquire_many(all).await;
}

impl Inner {
    async fn run_job(self: Arc<Self>, queued: QueuedJob) {
        let id = queued.id.clone();
        let logger = JobLogger::new(&id, queued.input.tribute_id, "render_tribute");

        match update_job(self.store.as_ref(), &id, |job| Ok(job.start()?)).await {
            Ok(_) => {}
            Err(WorkerError::Transition(e)) => {
                // Cancelled while queued
                debug!(job_id = %id, "Skipping job that is no longer pending: {}", e);
                self.forget(&id);
                return;
            }
            Err(e) => {
                logger.log_error(&format!("Could not start job: {}", e));
                self.forget(&id);
                return;
            }
        }

        let in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::set_jobs_in_flight(in_flight);
        let started = Instant::now();
        let flag = self.register_flag(&id);

        // Separate task so a panic is caught at the join boundary
        let task_inner = Arc::clone(&self);
        let span = logger.create_span();
        let handle = tokio::spawn(
            async move {
                task_inner
                    .pipeline
                    .run(&queued.id, &queued.input, &flag)
                    .await
            }
            .instrument(span),
        );

        let result = match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(WorkerError::internal("render task panicked")),
            Err(e) => Err(WorkerError::internal(format!("render task aborted: {}", e))),
        };

        self.finish(&id, result, started, &logger).await;

        let in_flight = self.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::set_jobs_in_flight(in_flight);
        self.forget(&id);
    }

    async fn finish(
        &self,
        id: &JobId,
        result: WorkerResult<RenderOutput>,
        started: Instant,
        logger: &JobLogger,
    ) {
        match result {
            Ok(output) => {
                // A successful render means the environment recovered
                lock(&self.last_resource_error).take();

                let written = update_job(self.store.as_ref(), id, |job| {
                    Ok(job.complete(output.output_path.clone(), output.thumbnail_path.clone())?)
                })
                .await;

                match written {
                    Ok(_) => {
                        metrics::record_job_completed(
                            started.elapsed().as_secs_f64(),
                            output.video_duration,
                        );
                        logger.log_completion(&format!(
                            "{} ({:.1}s video) in {:.1}s",
                            output.output_path.display(),
                            output.video_duration,
                            started.elapsed().as_secs_f64()
                        ));
                    }
                    Err(e) => logger.log_error(&format!("Could not record completion: {}", e)),
                }
            }
            Err(e) => {
                let kind = e.failure_kind();
                let message = e.to_string();

                if e.is_resource_error() {
                    *lock(&self.last_resource_error) = Some(message.clone());
                }

                match kind {
                    FailureKind::Cancelled => logger.log_warning(&message),
                    _ => logger.log_error(&format!("{} ({})", message, kind)),
                }

                let written =
                    update_job(self.store.as_ref(), id, |job| Ok(job.fail(kind, message.clone())?))
                        .await;
                if let Err(e) = written {
                    error!(job_id = %id, "Could not record failure: {}", e);
                }
                metrics::record_job_failed(kind);
            }
        }
    }

    async fn cancel(&self, id: &JobId) -> WorkerResult<CancelOutcome> {
        for _ in 0..MAX_CANCEL_ATTEMPTS {
            let mut job = self
                .store
                .get(id)
                .await?
                .ok_or_else(|| WorkerError::JobNotFound(id.clone()))?;

            match job.state {
                JobState::Pending => {
                    job.fail(FailureKind::Cancelled, CANCELLED_MESSAGE)?;
                    match self.store.compare_and_set(job).await? {
                        CasOutcome::Applied(_) => {
                            self.signal_cancel(id);
                            metrics::record_job_failed(FailureKind::Cancelled);
                            return Ok(CancelOutcome::Cancelled);
                        }
                        // The worker picked it up in the meantime
                        CasOutcome::Conflict(_) => continue,
                    }
                }
                JobState::Processing { stage, .. } => {
                    self.signal_cancel(id);
                    return Ok(if stage == RenderStage::Encoding {
                        CancelOutcome::Deferred
                    } else {
                        CancelOutcome::Requested
                    });
                }
                JobState::Completed { .. } | JobState::Failed { .. } => {
                    return Ok(CancelOutcome::AlreadyFinished);
                }
            }
        }

        Err(WorkerError::store(format!(
            "gave up cancelling job {} after {} conflicting writes",
            id, MAX_CANCEL_ATTEMPTS
        )))
    }

    /// Flag for a job about to run. Removed again by [`Inner::forget`].
    fn register_flag(&self, id: &JobId) -> CancelFlag {
        lock(&self.cancel_flags).entry(id.clone()).or_default().clone()
    }

    /// Raise the flag of a live job. Finished jobs have no flag and get none.
    fn signal_cancel(&self, id: &JobId) -> bool {
        match lock(&self.cancel_flags).get(id) {
            Some(flag) => {
                flag.cancel();
                true
            }
            None => false,
        }
    }

    fn forget(&self, id: &JobId) {
        lock(&self.cancel_flags).remove(id);
    }
}

/// Lock a mutex, recovering the data if a previous holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::{Rgb, RgbImage};
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use tempfile::TempDir;
    use tribute_media::{
        AssembledSequence, MediaError, MediaResult, MixedAudio, ProgressCallback,
    };
    use tribute_models::{JobStatus, RenderSpec};

    /// One rendered call as seen by the fake backend.
    #[derive(Debug, Clone)]
    struct RenderCall {
        segments: usize,
        duration: f64,
        output: PathBuf,
        audio_duration: f64,
    }

    #[derive(Default)]
    struct FakeBackend {
        delay: Duration,
        panic: bool,
        calls: Mutex<Vec<RenderCall>>,
        active: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FakeBackend {
        fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<RenderCall> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RenderBackend for FakeBackend {
        async fn render(
            &self,
            _spec: &RenderSpec,
            sequence: &AssembledSequence,
            audio: &MixedAudio,
            output: &Path,
            progress: ProgressCallback,
        ) -> MediaResult<PathBuf> {
            if self.panic {
                panic!("encoder exploded");
            }
            self.calls.lock().unwrap().push(RenderCall {
                segments: sequence.len(),
                duration: sequence.total_duration,
                output: output.to_path_buf(),
                audio_duration: audio.duration,
            });

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);

            progress(tribute_media::FfmpegProgress {
                out_time_ms: (sequence.total_duration * 500.0) as i64,
                ..Default::default()
            });
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            tokio::fs::write(output, format!("video {:.3}s", sequence.total_duration))
                .await
                .map_err(MediaError::from)?;
            Ok(output.to_path_buf())
        }
    }

    struct FixedProbe;

    /// Holds the soundtrack probe until the test opens the gate.
    struct GatedProbe {
        gate: Arc<Semaphore>,
    }

    #[async_trait]
    impl DurationProbe for GatedProbe {
        async fn duration(&self, _path: &Path) -> MediaResult<f64> {
            let _pass = self
                .gate
                .acquire()
                .await
                .map_err(|_| MediaError::internal("gate closed"))?;
            Ok(95.0)
        }
    }

    #[async_trait]
    impl DurationProbe for FixedProbe {
        async fn duration(&self, _path: &Path) -> MediaResult<f64> {
            Ok(95.0)
        }
    }

    /// Store wrapper that records the progress of every successful write.
    #[derive(Default)]
    struct RecordingStore {
        inner: InMemoryJobStore,
        writes: Mutex<Vec<(JobId, JobStatus, u8)>>,
    }

    #[async_trait]
    impl JobStore for RecordingStore {
        async fn insert(&self, job: GenerationJob) -> WorkerResult<()> {
            self.writes
                .lock()
                .unwrap()
                .push((job.id.clone(), job.status(), job.progress()));
            self.inner.insert(job).await
        }

        async fn get(&self, id: &JobId) -> WorkerResult<Option<GenerationJob>> {
            self.inner.get(id).await
        }

        async fn compare_and_set(&self, job: GenerationJob) -> WorkerResult<CasOutcome> {
            let outcome = self.inner.compare_and_set(job).await?;
            if let CasOutcome::Applied(job) = &outcome {
                self.writes
                    .lock()
                    .unwrap()
                    .push((job.id.clone(), job.status(), job.progress()));
            }
            Ok(outcome)
        }

        async fn list_for_tribute(&self, tribute_id: u64) -> WorkerResult<Vec<GenerationJob>> {
            self.inner.list_for_tribute(tribute_id).await
        }
    }

    struct Harness {
        dir: TempDir,
        orchestrator: JobOrchestrator,
        backend: Arc<FakeBackend>,
        store: Arc<RecordingStore>,
    }

    impl Harness {
        fn new(max_jobs: usize, backend: FakeBackend) -> Self {
            Self::with_timeout(max_jobs, backend, Duration::from_secs(30))
        }

        fn with_timeout(max_jobs: usize, backend: FakeBackend, timeout: Duration) -> Self {
            Self::build(max_jobs, backend, timeout, Arc::new(FixedProbe))
        }

        fn with_probe(max_jobs: usize, probe: Arc<dyn DurationProbe>) -> Self {
            Self::build(max_jobs, FakeBackend::default(), Duration::from_secs(30), probe)
        }

        fn build(
            max_jobs: usize,
            backend: FakeBackend,
            timeout: Duration,
            probe: Arc<dyn DurationProbe>,
        ) -> Self {
            let dir = TempDir::new().unwrap();
            let music_dir = dir.path().join("music");
            std::fs::create_dir_all(&music_dir).unwrap();
            std::fs::write(music_dir.join("sad_piano.mp3"), b"not really mp3").unwrap();

            let config = WorkerConfig {
                max_concurrent_jobs: max_jobs,
                encode_timeout: timeout,
                temp_dir: dir.path().join("tmp"),
                output_dir: dir.path().join("videos"),
                music_dir: music_dir.clone(),
                render: RenderSpec {
                    width: 64,
                    height: 36,
                    ..Default::default()
                },
                ..Default::default()
            };

            let backend = Arc::new(backend);
            let store = Arc::new(RecordingStore::default());
            let orchestrator = JobOrchestrator::new(
                config,
                store.clone(),
                backend.clone(),
                probe,
                MusicLibrary::new(music_dir),
            )
            .unwrap();

            Self {
                dir,
                orchestrator,
                backend,
                store,
            }
        }

        fn images(&self, count: usize) -> Vec<PathBuf> {
            let photos = self.dir.path().join("photos");
            std::fs::create_dir_all(&photos).unwrap();
            (0..count)
                .map(|i| {
                    let path = photos.join(format!("photo_{}.jpg", i));
                    RgbImage::from_fn(80, 60, |x, y| Rgb([(x * 3) as u8, (y * 4) as u8, 120 + i as u8]))
                        .save(&path)
                        .unwrap();
                    path
                })
                .collect()
        }

        fn input(&self, images: usize, track: &str) -> TributeInput {
            TributeInput::new(
                1,
                "In Memory",
                "Forever in our hearts",
                self.images(images),
                track,
            )
        }

        async fn wait_terminal(&self, id: &JobId) -> GenerationJob {
            for _ in 0..1000 {
                let job = self.orchestrator.get_status(id).await.unwrap().unwrap();
                if job.is_terminal() {
                    return job;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            panic!("job {} did not finish", id);
        }

        async fn wait_stage(&self, id: &JobId, stage: RenderStage) {
            for _ in 0..1000 {
                let job = self.orchestrator.get_status(id).await.unwrap().unwrap();
                if job.stage() == Some(stage) {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("job {} never reached {}", id, stage);
        }

        /// Job ids in the order they first entered processing.
        fn start_order(&self) -> Vec<JobId> {
            let mut order: Vec<JobId> = Vec::new();
            for (id, status, _) in self.store.writes.lock().unwrap().iter() {
                if *status == JobStatus::Processing && !order.contains(id) {
                    order.push(id.clone());
                }
            }
            order
        }

        /// Most jobs ever processing at the same time, replayed from the store.
        fn peak_processing(&self) -> usize {
            let mut processing: Vec<JobId> = Vec::new();
            let mut peak = 0;
            for (id, status, _) in self.store.writes.lock().unwrap().iter() {
                match status {
                    JobStatus::Processing => {
                        if !processing.contains(id) {
                            processing.push(id.clone());
                        }
                    }
                    _ => processing.retain(|p| p != id),
                }
                peak = peak.max(processing.len());
            }
            peak
        }

        fn output_files(&self) -> Vec<PathBuf> {
            match std::fs::read_dir(self.dir.path().join("videos")) {
                Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
                Err(_) => Vec::new(),
            }
        }

        fn scratch_dirs(&self) -> usize {
            std::fs::read_dir(self.dir.path().join("tmp"))
                .map(|entries| entries.count())
                .unwrap_or(0)
        }
    }

    #[tokio::test]
    async fn test_end_to_end_render() {
        let h = Harness::new(1, FakeBackend::default());
        let id = h.orchestrator.submit(h.input(3, "sad_piano")).await.unwrap();

        let pending = h.orchestrator.get_status(&id).await.unwrap().unwrap();
        assert_eq!(pending.status(), JobStatus::Pending);

        let job = h.wait_terminal(&id).await;
        assert_eq!(job.status(), JobStatus::Completed, "{:?}", job.error_message());
        assert_eq!(job.progress(), 100);

        let output = job.output_path().unwrap();
        assert!(output.is_file());
        assert_eq!(
            output.file_name().unwrap().to_string_lossy(),
            format!("tribute_1_{}.mp4", id)
        );
        let thumbnail = job.thumbnail_path().unwrap();
        assert!(thumbnail.is_file());

        let calls = h.backend.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].segments, 4);
        let spec = RenderSpec::default();
        let expected = 4.0 * spec.seconds_per_image - 3.0 * spec.transition_duration;
        assert!((calls[0].duration - expected).abs() < spec.frame_time());
        assert!((calls[0].audio_duration - calls[0].duration).abs() < 1e-9);

        // Saw pending -> processing -> completed
        let statuses: Vec<JobStatus> = h
            .store
            .writes
            .lock()
            .unwrap()
            .iter()
            .map(|(_, status, _)| *status)
            .collect();
        assert_eq!(statuses.first(), Some(&JobStatus::Pending));
        assert!(statuses.contains(&JobStatus::Processing));
        assert_eq!(statuses.last(), Some(&JobStatus::Completed));

        // Scratch space is cleaned up
        assert_eq!(h.scratch_dirs(), 0);
        h.orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_unknown_track_fails_without_output() {
        let h = Harness::new(1, FakeBackend::default());
        let id = h.orchestrator.submit(h.input(2, "polka")).await.unwrap();

        let job = h.wait_terminal(&id).await;
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.failure_kind(), Some(FailureKind::Input));
        assert!(job.error_message().unwrap().contains("Unknown music track"));
        assert!(job.output_path().is_none());
        assert!(h.output_files().is_empty());
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_images_fails() {
        let h = Harness::new(1, FakeBackend::default());
        let id = h.orchestrator.submit(h.input(0, "sad_piano")).await.unwrap();

        let job = h.wait_terminal(&id).await;
        assert_eq!(job.failure_kind(), Some(FailureKind::Input));
        assert!(job.error_message().unwrap().contains("empty sequence"));
    }

    #[tokio::test]
    async fn test_corrupt_image_fails_job() {
        let h = Harness::new(1, FakeBackend::default());
        let mut input = h.input(2, "sad_piano");
        let corrupt = h.dir.path().join("corrupt.jpg");
        std::fs::write(&corrupt, b"garbage").unwrap();
        input.images.push(corrupt);

        let id = h.orchestrator.submit(input).await.unwrap();
        let job = h.wait_terminal(&id).await;
        assert_eq!(job.failure_kind(), Some(FailureKind::Input));
        assert!(job.error_message().unwrap().contains("corrupt.jpg"));
        assert_eq!(h.scratch_dirs(), 0);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let h = Harness::new(1, FakeBackend::default());
        let id = h.orchestrator.submit(h.input(4, "sad_piano")).await.unwrap();
        h.wait_terminal(&id).await;

        let progress: Vec<u8> = h
            .store
            .writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(job, _, _)| job == &id)
            .map(|(_, _, progress)| *progress)
            .collect();

        assert!(progress.len() > 5);
        assert!(progress.windows(2).all(|w| w[0] <= w[1]), "{:?}", progress);
        assert_eq!(progress.last(), Some(&100));
    }

    #[tokio::test]
    async fn test_cancel_pending_job() {
        let h = Harness::new(1, FakeBackend::with_delay(Duration::from_millis(300)));
        let first = h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap();
        let second = h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap();

        let outcome = h.orchestrator.cancel(&second).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled);

        let job = h.orchestrator.get_status(&second).await.unwrap().unwrap();
        assert_eq!(job.status(), JobStatus::Failed);
        assert_eq!(job.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(job.error_message(), Some("Cancelled by user"));
        assert!(job.started_at.is_none());
        assert_eq!(job.progress(), 0);

        assert_eq!(h.wait_terminal(&first).await.status(), JobStatus::Completed);
        // The cancelled job never reached the encoder
        assert_eq!(h.backend.calls().len(), 1);
        assert_eq!(
            h.orchestrator.cancel(&first).await.unwrap(),
            CancelOutcome::AlreadyFinished
        );
    }

    #[tokio::test]
    async fn test_cancel_during_encoding_is_deferred() {
        let h = Harness::new(1, FakeBackend::with_delay(Duration::from_millis(300)));
        let id = h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap();

        h.wait_stage(&id, RenderStage::Encoding).await;
        assert_eq!(h.orchestrator.cancel(&id).await.unwrap(), CancelOutcome::Deferred);

        let job = h.wait_terminal(&id).await;
        assert_eq!(job.failure_kind(), Some(FailureKind::Cancelled));
        assert!(h.output_files().is_empty());
        assert_eq!(h.backend.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_same_input_twice_gives_two_jobs() {
        let h = Harness::new(2, FakeBackend::default());
        let input = h.input(2, "sad_piano");
        let a = h.orchestrator.submit(input.clone()).await.unwrap();
        let b = h.orchestrator.submit(input).await.unwrap();
        assert_ne!(a, b);

        let job_a = h.wait_terminal(&a).await;
        let job_b = h.wait_terminal(&b).await;
        assert_eq!(job_a.status(), JobStatus::Completed);
        assert_eq!(job_b.status(), JobStatus::Completed);
        assert_ne!(job_a.output_path(), job_b.output_path());
        assert!(job_a.output_path().unwrap().is_file());
        assert!(job_b.output_path().unwrap().is_file());

        let listed = h.orchestrator.jobs_for_tribute(1).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].created_at >= listed[1].created_at);
    }

    #[tokio::test]
    async fn test_concurrent_jobs_use_separate_scratch_dirs() {
        let h = Harness::new(2, FakeBackend::with_delay(Duration::from_millis(100)));
        let a = h.orchestrator.submit(h.input(2, "sad_piano")).await.unwrap();
        let b = h.orchestrator.submit(h.input(2, "sad_piano")).await.unwrap();
        h.wait_terminal(&a).await;
        h.wait_terminal(&b).await;

        let calls = h.backend.calls();
        assert_eq!(calls.len(), 2);
        let dir_a = calls[0].output.parent().unwrap();
        let dir_b = calls[1].output.parent().unwrap();
        assert_ne!(dir_a, dir_b);
        assert_eq!(h.scratch_dirs(), 0);
    }

    #[tokio::test]
    async fn test_encode_timeout_fails_job() {
        let h = Harness::with_timeout(
            1,
            FakeBackend::with_delay(Duration::from_secs(30)),
            Duration::from_secs(1),
        );
        let id = h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap();

        let job = h.wait_terminal(&id).await;
        assert_eq!(job.failure_kind(), Some(FailureKind::Timeout));
        assert!(job.error_message().unwrap().contains("timed out"));
        assert!(h.output_files().is_empty());
        assert_eq!(h.scratch_dirs(), 0);
    }

    #[tokio::test]
    async fn test_panicking_backend_is_contained() {
        let h = Harness::new(
            1,
            FakeBackend {
                panic: true,
                ..Default::default()
            },
        );
        let first = h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap();
        let job = h.wait_terminal(&first).await;
        assert_eq!(job.failure_kind(), Some(FailureKind::Internal));

        // The pool keeps accepting and running work
        let second = h.orchestrator.submit(h.input(1, "polka")).await.unwrap();
        assert_eq!(h.wait_terminal(&second).await.failure_kind(), Some(FailureKind::Input));
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_rejected() {
        let h = Harness::new(1, FakeBackend::default());
        h.orchestrator.shutdown().await;
        let err = h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap_err();
        assert!(matches!(err, WorkerError::ShuttingDown));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let h = Harness::new(1, FakeBackend::default());
        let err = h.orchestrator.cancel(&JobId::new()).await.unwrap_err();
        assert!(matches!(err, WorkerError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn test_long_message_still_completes() {
        let h = Harness::new(1, FakeBackend::default());
        let mut input = h.input(1, "sad_piano");
        input.message = "we remember you always ".repeat(100);

        let id = h.orchestrator.submit(input).await.unwrap();
        let job = h.wait_terminal(&id).await;
        assert_eq!(job.status(), JobStatus::Completed, "{:?}", job.error_message());
        assert!(job.output_path().unwrap().is_file());
    }

    #[tokio::test]
    async fn test_invalid_input_message_names_field_only() {
        let h = Harness::new(1, FakeBackend::default());
        let mut input = h.input(1, "sad_piano");
        input.title = String::new();
        input.message = "we remember you always ".repeat(100);

        let id = h.orchestrator.submit(input).await.unwrap();
        let job = h.wait_terminal(&id).await;
        assert_eq!(job.failure_kind(), Some(FailureKind::Input));
        assert_eq!(job.error_message(), Some("Invalid tribute: title: length"));
    }

    #[tokio::test]
    async fn test_jobs_start_in_submission_order() {
        let h = Harness::new(1, FakeBackend::with_delay(Duration::from_millis(20)));
        let mut submitted = Vec::new();
        for _ in 0..4 {
            submitted.push(h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap());
        }
        for id in &submitted {
            assert_eq!(h.wait_terminal(id).await.status(), JobStatus::Completed);
        }

        assert_eq!(h.start_order(), submitted);
        assert_eq!(h.peak_processing(), 1);
    }

    #[tokio::test]
    async fn test_pool_never_exceeds_max_jobs() {
        let h = Harness::new(2, FakeBackend::with_delay(Duration::from_millis(100)));
        let mut submitted = Vec::new();
        for _ in 0..5 {
            submitted.push(h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap());
        }
        for id in &submitted {
            assert_eq!(h.wait_terminal(id).await.status(), JobStatus::Completed);
        }

        assert_eq!(h.backend.peak.load(Ordering::SeqCst), 2);
        assert!(h.peak_processing() <= 2);
        assert_eq!(h.backend.calls().len(), 5);
    }

    #[tokio::test]
    async fn test_cancel_before_encoding_stops_job() {
        let gate = Arc::new(Semaphore::new(0));
        let h = Harness::with_probe(
            1,
            Arc::new(GatedProbe {
                gate: Arc::clone(&gate),
            }),
        );
        let id = h.orchestrator.submit(h.input(2, "sad_piano")).await.unwrap();

        h.wait_stage(&id, RenderStage::AssemblingSequence).await;
        assert_eq!(h.orchestrator.cancel(&id).await.unwrap(), CancelOutcome::Requested);
        gate.add_permits(1);

        let job = h.wait_terminal(&id).await;
        assert_eq!(job.failure_kind(), Some(FailureKind::Cancelled));
        assert_eq!(job.error_message(), Some("Cancelled by user"));
        assert!(job.output_path().is_none());
        assert!(h.output_files().is_empty());
        assert!(h.backend.calls().is_empty());
    }

    #[tokio::test]
    async fn test_cancel_of_finished_job_leaves_no_flag() {
        let h = Harness::new(1, FakeBackend::default());
        let id = h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap();
        h.wait_terminal(&id).await;

        // The worker drops the flag right after recording the result
        for _ in 0..100 {
            if lock(&h.orchestrator.inner.cancel_flags).is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert!(!h.orchestrator.inner.signal_cancel(&id));
        assert_eq!(
            h.orchestrator.cancel(&id).await.unwrap(),
            CancelOutcome::AlreadyFinished
        );
        assert!(lock(&h.orchestrator.inner.cancel_flags).is_empty());
    }

    #[tokio::test]
    async fn test_unqueued_submit_is_not_left_pending() {
        let h = Harness::new(1, FakeBackend::default());
        let dispatcher = lock(&h.orchestrator.dispatcher).take().unwrap();
        dispatcher.abort();
        let _ = dispatcher.await;

        let err = h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap_err();
        assert!(matches!(err, WorkerError::ShuttingDown));

        let jobs = h.orchestrator.jobs_for_tribute(1).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].status(), JobStatus::Failed);
        assert!(lock(&h.orchestrator.inner.cancel_flags).is_empty());
    }

    #[tokio::test]
    async fn test_resource_error_clears_after_success() {
        let h = Harness::new(1, FakeBackend::default());

        // Known track whose file is missing from the music dir
        let id = h.orchestrator.submit(h.input(1, "calm_guitar")).await.unwrap();
        let job = h.wait_terminal(&id).await;
        assert_eq!(job.failure_kind(), Some(FailureKind::Resource));
        assert!(h.orchestrator.last_resource_error().is_some());

        let id = h.orchestrator.submit(h.input(1, "sad_piano")).await.unwrap();
        assert_eq!(h.wait_terminal(&id).await.status(), JobStatus::Completed);
        assert!(h.orchestrator.last_resource_error().is_none());
    }
}
