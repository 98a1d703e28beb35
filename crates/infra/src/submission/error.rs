use serde::Serialize;
use thiserror::Error;

use jobgate_core::JobId;

use crate::jobs::{JobStatus, JobStoreError};
use crate::queue::QueueError;

use super::request::ValidationIssue;

/// States of one submission attempt, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStage {
    Unauthenticated,
    Validated,
    Persisted,
    Enqueued,
    Acknowledged,
}

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("request body is not valid JSON: {0}")]
    MalformedBody(String),

    #[error("invalid request ({} issue(s))", .0.len())]
    InvalidRequest(Vec<ValidationIssue>),

    #[error("failed to create job: {0}")]
    JobCreationFailed(#[source] JobStoreError),

    /// The record exists (`pending`) but its id never reached the queue.
    #[error("job {job_id} created but not queued: {cause}")]
    QueueingFailed {
        job_id: JobId,
        #[source]
        cause: QueueError,
    },

    #[error("job {0} not found")]
    JobNotFound(JobId),

    #[error("job {job_id} is {status} and cannot be requeued")]
    NotRequeueable { job_id: JobId, status: JobStatus },

    #[error("unexpected failure after {stage:?}: {detail}")]
    Unclassified {
        stage: SubmissionStage,
        detail: String,
    },
}

impl SubmissionError {
    pub fn unclassified(stage: SubmissionStage, detail: impl Into<String>) -> Self {
        Self::Unclassified {
            stage,
            detail: detail.into(),
        }
    }

    /// Last state the attempt reached before failing.
    pub fn stage(&self) -> SubmissionStage {
        match self {
            SubmissionError::Unauthorized(_)
            | SubmissionError::MalformedBody(_)
            | SubmissionError::InvalidRequest(_) => SubmissionStage::Unauthenticated,
            SubmissionError::JobCreationFailed(_)
            | SubmissionError::JobNotFound(_)
            | SubmissionError::NotRequeueable { .. } => SubmissionStage::Validated,
            SubmissionError::QueueingFailed { .. } => SubmissionStage::Persisted,
            SubmissionError::Unclassified { stage, .. } => *stage,
        }
    }

    /// Job id of a record this attempt left behind, if any.
    pub fn orphaned_job(&self) -> Option<JobId> {
        match self {
            SubmissionError::QueueingFailed { job_id, .. } => Some(*job_id),
            _ => None,
        }
    }
}
