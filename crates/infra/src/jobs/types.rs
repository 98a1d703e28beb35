//! Job record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use jobgate_core::{DomainError, JobId, UserId};

/// Job lifecycle status.
///
/// Submission only ever writes `Pending`; the other states belong to the
/// worker pool that consumes the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Persisted, waiting for a worker
    Pending,
    /// Picked up by a worker
    Processing,
    /// Finished successfully
    Completed,
    /// Finished with an error
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
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(DomainError::unknown_state(format!("job status '{other}'"))),
        }
    }
}

/// Insert payload for a new job. The store assigns id, status and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub owner_id: UserId,
    pub job_type: String,
    pub parameters: Map<String, JsonValue>,
}

impl NewJob {
    pub fn new(owner_id: UserId, job_type: impl Into<String>) -> Self {
        Self {
            owner_id,
            job_type: job_type.into(),
            parameters: Map::new(),
        }
    }

    pub fn with_parameters(mut self, parameters: Map<String, JsonValue>) -> Self {
        self.parameters = parameters;
        self
    }
}

/// A durably stored job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub owner_id: UserId,
    pub job_type: String,
    pub parameters: Map<String, JsonValue>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    /// Materialize a freshly inserted record (always `Pending`).
    pub fn pending(id: JobId, new: NewJob, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: new.owner_id,
            job_type: new.job_type,
            parameters: new.parameters,
            status: JobStatus::Pending,
            created_at,
        }
    }
}
