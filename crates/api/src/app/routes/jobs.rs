use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use jobgate_core::JobId;
use jobgate_infra::{SubmissionError, SubmissionReceipt, SubmissionStage};

use crate::app::errors::{json_error, submission_error_to_response};
use crate::app::services::AppServices;

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}

fn parse_job_id(raw: &str) -> Result<JobId, Response> {
    raw.parse()
        .map_err(|e: jobgate_core::DomainError| json_error(StatusCode::BAD_REQUEST, "Invalid job id", e.to_string()))
}

fn receipt_response(status: StatusCode, message: String, receipt: SubmissionReceipt) -> Response {
    (
        status,
        Json(json!({
            "message": message,
            "jobId": receipt.job_id,
            "status": receipt.status,
        })),
    )
        .into_response()
}

/// `POST /jobs`
///
/// The submission runs on its own task: once started it completes even if the
/// client goes away, so a persisted record is never left half-handled.
pub async fn create(
    Extension(services): Extension<Arc<AppServices>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let orchestrator = services.orchestrator.clone();
    let credential = authorization(&headers);

    let outcome = tokio::spawn(async move { orchestrator.submit(credential.as_deref(), &body).await })
        .await
        .unwrap_or_else(|e| {
            Err(SubmissionError::unclassified(
                SubmissionStage::Unauthenticated,
                format!("submission task failed: {e}"),
            ))
        });

    match outcome {
        Ok(receipt) => receipt_response(
            StatusCode::CREATED,
            format!(
                "Job successfully created with ID: {} and queued for processing.",
                receipt.job_id
            ),
            receipt,
        ),
        Err(err) => submission_error_to_response(err),
    }
}

/// `GET /jobs/:id`
pub async fn get(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let job_id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match services
        .orchestrator
        .lookup(authorization(&headers).as_deref(), job_id)
        .await
    {
        Ok(job) => (StatusCode::OK, Json(json!({ "job": job }))).into_response(),
        Err(err) => submission_error_to_response(err),
    }
}

/// `POST /jobs/:id/requeue`
pub async fn requeue(
    Extension(services): Extension<Arc<AppServices>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let job_id = match parse_job_id(&id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let orchestrator = services.orchestrator.clone();
    let credential = authorization(&headers);

    let outcome = tokio::spawn(async move { orchestrator.requeue(credential.as_deref(), job_id).await })
        .await
        .unwrap_or_else(|e| {
            Err(SubmissionError::unclassified(
                SubmissionStage::Validated,
                format!("requeue task failed: {e}"),
            ))
        });

    match outcome {
        Ok(receipt) => receipt_response(
            StatusCode::OK,
            format!("Job {} queued for processing.", receipt.job_id),
            receipt,
        ),
        Err(err) => submission_error_to_response(err),
    }
}
