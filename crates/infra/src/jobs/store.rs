//! Job storage abstraction and the in-memory implementation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use jobgate_core::{JobId, UserId};

use super::types::{JobRecord, JobStatus, NewJob};

/// Job store abstraction.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert exactly one `pending` record and return it as stored.
    async fn create_job(&self, new: NewJob) -> Result<JobRecord, JobStoreError>;

    /// Get a job owned by `owner_id`. Jobs of other owners read as absent.
    async fn get(&self, owner_id: UserId, job_id: JobId) -> Result<Option<JobRecord>, JobStoreError>;

    /// Pending jobs created strictly before `created_before`, oldest first.
    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, JobStoreError>;
}

/// Job store error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobStoreError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("constraint violated: {0}")]
    Constraint(String),
    #[error("corrupt job row: {0}")]
    Corrupt(String),
}

impl JobStoreError {
    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, JobRecord>>,
    fail_writes: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `create_job` fail (simulates a storage outage).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Overwrite a job's status, as the external worker pool would.
    pub fn set_status(&self, job_id: JobId, status: JobStatus) -> Result<(), JobStoreError> {
        let mut jobs = self.write()?;
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| JobStoreError::persistence(format!("job {job_id} not found")))?;
        job.status = status;
        Ok(())
    }

    /// Snapshot of every stored job, oldest first.
    pub fn all(&self) -> Vec<JobRecord> {
        let Ok(jobs) = self.jobs.read() else {
            return Vec::new();
        };
        let mut all: Vec<_> = jobs.values().cloned().collect();
        all.sort_by_key(|j| (j.created_at, j.id));
        all
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<JobId, JobRecord>>, JobStoreError> {
        self.jobs
            .write()
            .map_err(|_| JobStoreError::persistence("job map lock poisoned"))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create_job(&self, new: NewJob) -> Result<JobRecord, JobStoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(JobStoreError::persistence("storage unavailable"));
        }
        if new.job_type.is_empty() {
            return Err(JobStoreError::Constraint("job_type must not be empty".into()));
        }

        let record = JobRecord::pending(JobId::new(), new, Utc::now());

        let mut jobs = self.write()?;
        if jobs.contains_key(&record.id) {
            return Err(JobStoreError::Constraint(format!("duplicate job id {}", record.id)));
        }
        jobs.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get(&self, owner_id: UserId, job_id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| JobStoreError::persistence("job map lock poisoned"))?;
        Ok(jobs
            .get(&job_id)
            .filter(|j| j.owner_id == owner_id)
            .cloned())
    }

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|_| JobStoreError::persistence("job map lock poisoned"))?;

        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.created_at < created_before)
            .cloned()
            .collect();

        result.sort_by_key(|j| (j.created_at, j.id));
        result.truncate(limit);
        Ok(result)
    }
}
