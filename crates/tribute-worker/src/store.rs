//! Job record storage.
//!
//! Records are written with compare-and-set on [`GenerationJob::revision`],
//! so the worker and a concurrent cancel never overwrite each other.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use tribute_models::{GenerationJob, JobId};

use crate::error::{WorkerError, WorkerResult};

/// Attempts before a contended update gives up.
const MAX_UPDATE_ATTEMPTS: usize = 16;

/// Result of a conditional write.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// Written; carries the stored record with its new revision.
    Applied(GenerationJob),
    /// Someone else wrote first; carries the current record.
    Conflict(GenerationJob),
}

/// Durable job records. The surrounding application can back this with its own database.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Store a new record. Fails if the id already exists.
    async fn insert(&self, job: GenerationJob) -> WorkerResult<()>;

    async fn get(&self, id: &JobId) -> WorkerResult<Option<GenerationJob>>;

    /// Replace the record if its stored revision equals `job.revision`.
    /// The stored copy gets `revision + 1`.
    async fn compare_and_set(&self, job: GenerationJob) -> WorkerResult<CasOutcome>;

    async fn list_for_tribute(&self, tribute_id: u64) -> WorkerResult<Vec<GenerationJob>>;
}

/// Process-local [`JobStore`].
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, GenerationJob>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn insert(&self, job: GenerationJob) -> WorkerResult<()> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(WorkerError::store(format!("job {} already exists", job.id)));
        }
        jobs.insert(job.id.clone(), job);
        Ok(())
    }

    async fn get(&self, id: &JobId) -> WorkerResult<Option<GenerationJob>> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn compare_and_set(&self, mut job: GenerationJob) -> WorkerResult<CasOutcome> {
        let mut jobs = self.jobs.write().await;
        let current = jobs
            .get(&job.id)
            .ok_or_else(|| WorkerError::JobNotFound(job.id.clone()))?;

        if current.revision != job.revision {
            return Ok(CasOutcome::Conflict(current.clone()));
        }

        job.revision += 1;
        jobs.insert(job.id.clone(), job.clone());
        Ok(CasOutcome::Applied(job))
    }

    async fn list_for_tribute(&self, tribute_id: u64) -> WorkerResult<Vec<GenerationJob>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| job.tribute_id == tribute_id)
            .cloned()
            .collect())
    }
}

/// Apply `mutate` to the latest record and write it back, retrying on conflicts.
///
/// `mutate` may run more than once and must only touch the record it is given.
pub async fn update_job<T, F>(
    store: &dyn JobStore,
    id: &JobId,
    mut mutate: F,
) -> WorkerResult<(GenerationJob, T)>
where
    F: FnMut(&mut GenerationJob) -> WorkerResult<T> + Send,
    T: Send,
{
    for attempt in 1..=MAX_UPDATE_ATTEMPTS {
        let mut job = store
            .get(id)
            .await?
            .ok_or_else(|| WorkerError::JobNotFound(id.clone()))?;
        let value = mutate(&mut job)?;

        match store.compare_and_set(job).await? {
            CasOutcome::Applied(job) => return Ok((job, value)),
            CasOutcome::Conflict(current) => {
                debug!(
                    job_id = %id,
                    attempt,
                    revision = current.revision,
                    "Job record changed concurrently, retrying"
                );
            }
        }
    }

    Err(WorkerError::store(format!(
        "gave up updating job {} after {} conflicting writes",
        id, MAX_UPDATE_ATTEMPTS
    )))
}
