//! Infrastructure layer: job persistence, the work queue, and the submission
//! handoff that ties them together.

pub mod jobs;
pub mod queue;
pub mod reconcile;
pub mod submission;

pub use jobs::{InMemoryJobStore, JobRecord, JobStatus, JobStore, JobStoreError, NewJob, PostgresJobStore};
pub use queue::{ConnectionSlot, ConnectionState, InMemoryJobQueue, JobQueue, QueueAddress, QueueError};
pub use reconcile::{Reconciler, ReconcilerHandle, SweepReport};
pub use submission::{
    JobRequest, SubmissionError, SubmissionOrchestrator, SubmissionReceipt, SubmissionStage,
    ValidationIssue,
};
