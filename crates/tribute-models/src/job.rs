//! Generation job records and their state machine.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

/// Unique identifier for a generation job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coarse job status, as exposed to pollers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pipeline stage currently executing for a job.
///
/// Ordering follows execution order, so a job never moves to a smaller stage.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum RenderStage {
    PreparingImages,
    BuildingTitle,
    AssemblingSequence,
    Encoding,
}

impl RenderStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderStage::PreparingImages => "preparing_images",
            RenderStage::BuildingTitle => "building_title",
            RenderStage::AssemblingSequence => "assembling_sequence",
            RenderStage::Encoding => "encoding",
        }
    }

    /// Progress band `(start, end)` owned by this stage.
    pub fn band(&self) -> (u8, u8) {
        match self {
            RenderStage::PreparingImages => (0, 30),
            RenderStage::BuildingTitle => (30, 40),
            RenderStage::AssemblingSequence => (40, 70),
            RenderStage::Encoding => (70, 100),
        }
    }

    /// Map a fraction of this stage's work (0.0..=1.0) to overall progress.
    pub fn progress_at(&self, fraction: f64) -> u8 {
        let (start, end) = self.band();
        let fraction = if fraction.is_finite() {
            fraction.clamp(0.0, 1.0)
        } else {
            0.0
        };
        start + (f64::from(end - start) * fraction).floor() as u8
    }
}

impl fmt::Display for RenderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Bad input: missing/corrupt image, unknown track, empty image list.
    Input,
    /// Environment problem likely affecting every job (encoder missing, disk full).
    Resource,
    /// Encoder exceeded the configured timeout.
    Timeout,
    /// Cancelled by the user.
    Cancelled,
    /// Encoder ran and failed.
    Encode,
    /// Anything else (bugs, panics).
    Internal,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Input => "input",
            FailureKind::Resource => "resource",
            FailureKind::Timeout => "timeout",
            FailureKind::Cancelled => "cancelled",
            FailureKind::Encode => "encode",
            FailureKind::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit job state. Each variant carries only the data valid in that state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Processing {
        stage: RenderStage,
        progress: u8,
    },
    Completed {
        output_path: PathBuf,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thumbnail_path: Option<PathBuf>,
        completed_at: DateTime<Utc>,
    },
    Failed {
        error: String,
        kind: FailureKind,
        progress: u8,
        completed_at: DateTime<Utc>,
    },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Processing { .. } => JobStatus::Processing,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("cannot {action} a job in state '{from}'")]
    InvalidTransition { from: JobStatus, action: &'static str },

    #[error("stage '{to}' cannot follow stage '{from}'")]
    StageRegression { from: RenderStage, to: RenderStage },
}

/// One render attempt for a tribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    /// Unique job ID
    pub id: JobId,

    /// Owning tribute
    pub tribute_id: u64,

    /// Current state
    #[serde(flatten)]
    pub state: JobState,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// When a worker picked the job up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// Record revision, bumped by the store on every successful write
    #[serde(default)]
    pub revision: u64,
}

impl GenerationJob {
    /// Create a new pending job for a tribute.
    pub fn new(tribute_id: u64) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            tribute_id,
            state: JobState::Pending,
            created_at: now,
            started_at: None,
            updated_at: now,
            revision: 0,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    /// Progress percentage (0-100).
    pub fn progress(&self) -> u8 {
        match &self.state {
            JobState::Pending => 0,
            JobState::Processing { progress, .. } => *progress,
            JobState::Completed { .. } => 100,
            JobState::Failed { progress, .. } => *progress,
        }
    }

    /// Stage currently running, if processing.
    pub fn stage(&self) -> Option<RenderStage> {
        match &self.state {
            JobState::Processing { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.state {
            JobState::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn output_path(&self) -> Option<&Path> {
        match &self.state {
            JobState::Completed { output_path, .. } => Some(output_path),
            _ => None,
        }
    }

    pub fn thumbnail_path(&self) -> Option<&Path> {
        match &self.state {
            JobState::Completed { thumbnail_path, .. } => thumbnail_path.as_deref(),
            _ => None,
        }
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            JobState::Completed { completed_at, .. } | JobState::Failed { completed_at, .. } => {
                Some(*completed_at)
            }
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    /// Start processing the job.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        if !matches!(self.state, JobState::Pending) {
            return Err(self.invalid("start"));
        }
        let now = Utc::now();
        self.state = JobState::Processing {
            stage: RenderStage::PreparingImages,
            progress: 0,
        };
        self.started_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    /// Move to `stage` with the given overall progress.
    ///
    /// Progress is clamped into the stage's band and never decreases.
    /// Returns the progress actually recorded.
    pub fn advance(&mut self, stage: RenderStage, progress: u8) -> Result<u8, TransitionError> {
        let JobState::Processing {
            stage: current_stage,
            progress: current,
        } = self.state
        else {
            return Err(self.invalid("advance"));
        };

        if stage < current_stage {
            return Err(TransitionError::StageRegression {
                from: current_stage,
                to: stage,
            });
        }

        let (start, end) = stage.band();
        let next = progress.clamp(start, end).max(current);
        self.state = JobState::Processing {
            stage,
            progress: next,
        };
        self.updated_at = Utc::now();
        Ok(next)
    }

    /// Mark job as completed with its rendered output.
    pub fn complete(
        &mut self,
        output_path: PathBuf,
        thumbnail_path: Option<PathBuf>,
    ) -> Result<(), TransitionError> {
        if !matches!(self.state, JobState::Processing { .. }) {
            return Err(self.invalid("complete"));
        }
        let now = Utc::now();
        self.state = JobState::Completed {
            output_path,
            thumbnail_path,
            completed_at: now,
        };
        self.updated_at = now;
        Ok(())
    }

    /// Mark job as failed. Allowed from pending (cancellation) and processing.
    pub fn fail(&mut self, kind: FailureKind, error: impl Into<String>) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(self.invalid("fail"));
        }
        let now = Utc::now();
        self.state = JobState::Failed {
            error: error.into(),
            kind,
            progress: self.progress(),
            completed_at: now,
        };
        self.updated_at = now;
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> TransitionError {
        TransitionError::InvalidTransition {
            from: self.status(),
            action,
        }
    }
}
