//! Job submission handoff: authenticate → validate → persist → enqueue → acknowledge.
//!
//! Persist-then-enqueue is a two-step saga without a shared transaction:
//!
//! 1. `create_job` commits the authoritative record (`pending`).
//! 2. `enqueue` pushes the record's id. If it fails the record is kept as is
//!    and the failure is reported with the job id (`QueueingFailed`), so the
//!    caller can retry the push with [`SubmissionOrchestrator::requeue`]
//!    instead of submitting a duplicate.
//!
//! Every step fails fast; nothing is retried here.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{Span, error, info, instrument, warn};

use jobgate_auth::{AuthError, Identity, IdentityVerifier, extract_bearer};
use jobgate_core::JobId;

use crate::jobs::{JobRecord, JobStatus, JobStore, NewJob};
use crate::queue::JobQueue;

pub mod error;
pub mod request;

pub use error::{SubmissionError, SubmissionStage};
pub use request::{JobRequest, ValidationIssue};

/// What a successful submission (or requeue) hands back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
    pub queue_length: u64,
}

#[derive(Clone)]
pub struct SubmissionOrchestrator {
    verifier: Arc<dyn IdentityVerifier>,
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl SubmissionOrchestrator {
    pub fn new(
        verifier: Arc<dyn IdentityVerifier>,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            verifier,
            store,
            queue,
        }
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Run one submission attempt.
    ///
    /// `authorization` is the raw `Authorization` header value; `body` the raw
    /// request body.
    #[instrument(skip_all, fields(user_id, job_id))]
    pub async fn submit(
        &self,
        authorization: Option<&str>,
        body: &[u8],
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let identity = self.authenticate(authorization).await?;
        Span::current().record("user_id", tracing::field::display(identity.user_id));

        let body: JsonValue = serde_json::from_slice(body).map_err(|e| {
            warn!(error = %e, "request body is not valid JSON");
            SubmissionError::MalformedBody(e.to_string())
        })?;

        let request = JobRequest::from_json(&body).map_err(|issues| {
            warn!(?issues, "request body failed validation");
            SubmissionError::InvalidRequest(issues)
        })?;
        info!(job_type = %request.job_type, "validated submission");

        let new = NewJob::new(identity.user_id, request.job_type).with_parameters(request.parameters);
        let job = self.store.create_job(new).await.map_err(|e| {
            error!(error = %e, "job record could not be created");
            SubmissionError::JobCreationFailed(e)
        })?;
        Span::current().record("job_id", tracing::field::display(job.id));
        info!("job record persisted");

        let queue_length = self.push(&job).await?;

        info!(queue_length, "job acknowledged");
        Ok(SubmissionReceipt {
            job_id: job.id,
            status: job.status,
            queue_length,
        })
    }

    /// Push an existing `pending` job of the caller onto the queue again.
    ///
    /// This is the retry path for `QueueingFailed`: it never creates a record.
    #[instrument(skip(self, authorization), fields(user_id))]
    pub async fn requeue(
        &self,
        authorization: Option<&str>,
        job_id: JobId,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let job = self.lookup(authorization, job_id).await?;

        if job.status != JobStatus::Pending {
            return Err(SubmissionError::NotRequeueable {
                job_id,
                status: job.status,
            });
        }

        let queue_length = self.push(&job).await?;
        info!(%job_id, queue_length, "job requeued");
        Ok(SubmissionReceipt {
            job_id,
            status: job.status,
            queue_length,
        })
    }

    /// Load one of the caller's jobs.
    pub async fn lookup(
        &self,
        authorization: Option<&str>,
        job_id: JobId,
    ) -> Result<JobRecord, SubmissionError> {
        let identity = self.authenticate(authorization).await?;
        Span::current().record("user_id", tracing::field::display(identity.user_id));

        self.store
            .get(identity.user_id, job_id)
            .await
            .map_err(|e| SubmissionError::unclassified(SubmissionStage::Validated, e.to_string()))?
            .ok_or(SubmissionError::JobNotFound(job_id))
    }

    async fn authenticate(&self, authorization: Option<&str>) -> Result<Identity, SubmissionError> {
        let result = match extract_bearer(authorization) {
            Ok(token) => self.verifier.verify(token).await,
            Err(e) => Err(e),
        };

        result.map_err(|e| match e {
            AuthError::Unavailable(detail) => {
                error!(%detail, "identity provider unavailable");
                SubmissionError::unclassified(SubmissionStage::Unauthenticated, detail)
            }
            other => {
                warn!(reason = %other, "authentication failed");
                SubmissionError::Unauthorized(other.to_string())
            }
        })
    }

    async fn push(&self, job: &JobRecord) -> Result<u64, SubmissionError> {
        self.queue.enqueue(job.id).await.map_err(|cause| {
            // The record stays pending; it is reported, not rolled back.
            error!(
                job_id = %job.id,
                queue = %self.queue.name(),
                error = %cause,
                "CRITICAL: job persisted but not queued"
            );
            SubmissionError::QueueingFailed {
                job_id: job.id,
                cause,
            }
        })
    }
}

impl std::fmt::Debug for SubmissionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubmissionOrchestrator")
            .field("queue", &self.queue.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use async_trait::async_trait;
    use serde_json::json;

    use jobgate_core::UserId;

    use crate::jobs::InMemoryJobStore;
    use crate::queue::InMemoryJobQueue;

    use super::*;

    const TOKEN: &str = "valid-token";

    /// Accepts exactly one token.
    struct StaticVerifier {
        user: UserId,
    }

    #[async_trait]
    impl IdentityVerifier for StaticVerifier {
        async fn verify(&self, bearer_token: &str) -> Result<Identity, AuthError> {
            if bearer_token == TOKEN {
                Ok(Identity::new(self.user))
            } else {
                Err(AuthError::rejected("User not found"))
            }
        }
    }

    struct DownVerifier;

    #[async_trait]
    impl IdentityVerifier for DownVerifier {
        async fn verify(&self, _: &str) -> Result<Identity, AuthError> {
            Err(AuthError::Unavailable("connection reset".into()))
        }
    }

    struct Harness {
        user: UserId,
        store: Arc<InMemoryJobStore>,
        queue: Arc<InMemoryJobQueue>,
        orchestrator: SubmissionOrchestrator,
    }

    fn harness() -> Harness {
        let user = UserId::new();
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryJobQueue::default());
        let orchestrator = SubmissionOrchestrator::new(
            Arc::new(StaticVerifier { user }),
            store.clone(),
            queue.clone(),
        );
        Harness {
            user,
            store,
            queue,
            orchestrator,
        }
    }

    fn bearer() -> Option<&'static str> {
        Some("Bearer valid-token")
    }

    fn body(value: JsonValue) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[tokio::test]
    async fn success_persists_pending_record_and_pushes_its_id() {
        let h = harness();
        let receipt = h
            .orchestrator
            .submit(
                bearer(),
                &body(json!({ "job_type": "sales_summary", "parameters": { "q": 3 } })),
            )
            .await
            .unwrap();

        assert_eq!(receipt.status, JobStatus::Pending);
        assert_eq!(receipt.queue_length, 1);

        let jobs = h.store.all();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, receipt.job_id);
        assert_eq!(jobs[0].owner_id, h.user);
        assert_eq!(jobs[0].job_type, "sales_summary");
        assert_eq!(JsonValue::Object(jobs[0].parameters.clone()), json!({ "q": 3 }));
        assert_eq!(h.queue.items(), vec![receipt.job_id.to_string()]);
    }

    #[tokio::test]
    async fn failed_authentication_has_no_side_effects() {
        let h = harness();
        let valid = body(json!({ "job_type": "sales_summary" }));

        for header in [None, Some("Bearer wrong"), Some("Token valid-token")] {
            let err = h.orchestrator.submit(header, &valid).await.unwrap_err();
            assert!(matches!(err, SubmissionError::Unauthorized(_)), "{header:?}: {err:?}");
            assert_eq!(err.stage(), SubmissionStage::Unauthenticated);
        }

        assert!(h.store.is_empty());
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn authentication_runs_before_body_parsing() {
        let h = harness();
        let err = h.orchestrator.submit(None, b"{not json").await.unwrap_err();
        assert!(matches!(err, SubmissionError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn invalid_bodies_create_nothing() {
        let h = harness();

        let err = h.orchestrator.submit(bearer(), b"{not json").await.unwrap_err();
        assert!(matches!(err, SubmissionError::MalformedBody(_)));

        for invalid in [json!({}), json!({ "job_type": "" }), json!({ "job_type": "x", "parameters": 1 })] {
            let err = h.orchestrator.submit(bearer(), &body(invalid)).await.unwrap_err();
            assert!(matches!(err, SubmissionError::InvalidRequest(_)));
        }

        assert!(h.store.is_empty());
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn persistence_failure_skips_the_queue() {
        let h = harness();
        h.store.set_fail_writes(true);

        let err = h
            .orchestrator
            .submit(bearer(), &body(json!({ "job_type": "sales_summary" })))
            .await
            .unwrap_err();

        assert!(matches!(err, SubmissionError::JobCreationFailed(_)));
        assert_eq!(err.orphaned_job(), None);
        assert!(h.queue.is_empty());
    }

    #[tokio::test]
    async fn queue_failure_keeps_the_pending_record_and_reports_its_id() {
        let h = harness();
        h.queue.set_available(false);

        let err = h
            .orchestrator
            .submit(bearer(), &body(json!({ "job_type": "sales_summary" })))
            .await
            .unwrap_err();

        let SubmissionError::QueueingFailed { job_id, cause } = &err else {
            panic!("expected QueueingFailed, got {err:?}");
        };
        assert!(cause.is_connection_error());
        assert_eq!(err.stage(), SubmissionStage::Persisted);

        let jobs = h.store.all();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, *job_id);
        assert_eq!(jobs[0].status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn requeue_recovers_an_orphaned_job_without_duplicating_it() {
        let h = harness();
        h.queue.set_available(false);
        let err = h
            .orchestrator
            .submit(bearer(), &body(json!({ "job_type": "sales_summary" })))
            .await
            .unwrap_err();
        let job_id = err.orphaned_job().unwrap();

        h.queue.set_available(true);
        let receipt = h.orchestrator.requeue(bearer(), job_id).await.unwrap();

        assert_eq!(receipt.job_id, job_id);
        assert_eq!(h.store.len(), 1);
        assert_eq!(h.queue.items(), vec![job_id.to_string()]);
    }

    #[tokio::test]
    async fn requeue_refuses_foreign_and_started_jobs() {
        let h = harness();
        assert!(matches!(
            h.orchestrator.requeue(bearer(), JobId::new()).await,
            Err(SubmissionError::JobNotFound(_))
        ));

        let receipt = h
            .orchestrator
            .submit(bearer(), &body(json!({ "job_type": "sales_summary" })))
            .await
            .unwrap();
        h.store.set_status(receipt.job_id, JobStatus::Processing).unwrap();

        assert!(matches!(
            h.orchestrator.requeue(bearer(), receipt.job_id).await,
            Err(SubmissionError::NotRequeueable {
                status: JobStatus::Processing,
                ..
            })
        ));
        assert_eq!(h.queue.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_identity_provider_is_not_reported_as_unauthorized() {
        let store = Arc::new(InMemoryJobStore::new());
        let orchestrator = SubmissionOrchestrator::new(
            Arc::new(DownVerifier),
            store.clone(),
            Arc::new(InMemoryJobQueue::default()),
        );

        let err = orchestrator
            .submit(bearer(), &body(json!({ "job_type": "x" })))
            .await
            .unwrap_err();
        assert!(matches!(err, SubmissionError::Unclassified { .. }));
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_submissions_get_distinct_ids() {
        let h = harness();
        let orchestrator = Arc::new(h.orchestrator);

        let mut handles = Vec::new();
        for i in 0..50 {
            let orchestrator = orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orchestrator
                    .submit(bearer(), &body(json!({ "job_type": format!("t{i}") })))
                    .await
                    .unwrap()
                    .job_id
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            assert!(ids.insert(handle.await.unwrap()));
        }
        assert_eq!(h.store.len(), 50);
        assert_eq!(h.queue.len(), 50);
    }
}
