use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{SecondsFormat, Utc};
use serde_json::{Map, Value as JsonValue, json};

use jobgate_infra::{SubmissionError, ValidationIssue};

pub const INVALID_JSON: &str = "Invalid JSON body";
pub const INVALID_REQUEST: &str = "Invalid request body";
pub const CREATE_FAILED: &str = "Failed to create job";
pub const QUEUE_FAILED: &str = "Job created but failed to queue for processing. Please try again.";

/// HTTP mapping for [`SubmissionError`].
///
/// Internal detail of unclassified failures is logged and replaced by a
/// generic message.
pub fn submission_error_to_response(err: SubmissionError) -> Response {
    match err {
        SubmissionError::Unauthorized(reason) => (
            StatusCode::UNAUTHORIZED,
            axum::Json(json!({ "error": format!("Unauthorized: {reason}") })),
        )
            .into_response(),
        SubmissionError::MalformedBody(_) => {
            (StatusCode::BAD_REQUEST, axum::Json(json!({ "error": INVALID_JSON }))).into_response()
        }
        SubmissionError::InvalidRequest(issues) => json_error(
            StatusCode::BAD_REQUEST,
            INVALID_REQUEST,
            flatten_issues(&issues),
        ),
        SubmissionError::JobCreationFailed(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, CREATE_FAILED, e.to_string())
        }
        SubmissionError::QueueingFailed { job_id, cause } => (
            StatusCode::INTERNAL_SERVER_ERROR,
            axum::Json(json!({
                "error": QUEUE_FAILED,
                "details": cause.to_string(),
                "jobId": job_id,
            })),
        )
            .into_response(),
        SubmissionError::JobNotFound(job_id) => json_error(
            StatusCode::NOT_FOUND,
            "Job not found",
            format!("no job {job_id} for this user"),
        ),
        SubmissionError::NotRequeueable { job_id, status } => json_error(
            StatusCode::CONFLICT,
            "Job cannot be requeued",
            format!("job {job_id} is {status}; only pending jobs can be requeued"),
        ),
        SubmissionError::Unclassified { stage, detail } => {
            tracing::error!(?stage, %detail, "unhandled submission failure");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                axum::Json(json!({
                    "error": "Internal Server Error",
                    "details": "An unexpected error occurred. Please try again.",
                    "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                })),
            )
                .into_response()
        }
    }
}

pub fn json_error(
    status: StatusCode,
    error: &'static str,
    details: impl Into<JsonValue>,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": error,
            "details": details.into(),
        })),
    )
        .into_response()
}

/// `{ formErrors: [..], fieldErrors: { field: [..] } }`.
fn flatten_issues(issues: &[ValidationIssue]) -> JsonValue {
    let mut form_errors = Vec::new();
    let mut field_errors: Map<String, JsonValue> = Map::new();

    for issue in issues {
        if issue.field == "body" {
            form_errors.push(JsonValue::String(issue.message.clone()));
            continue;
        }
        let entry = field_errors
            .entry(issue.field.clone())
            .or_insert_with(|| JsonValue::Array(Vec::new()));
        if let JsonValue::Array(messages) = entry {
            messages.push(JsonValue::String(issue.message.clone()));
        }
    }

    json!({ "formErrors": form_errors, "fieldErrors": field_errors })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issues_are_grouped_by_field() {
        let flat = flatten_issues(&[
            ValidationIssue::new("job_type", "required", "Job type is required"),
            ValidationIssue::new("parameters", "invalid_type", "Parameters must be a JSON object"),
        ]);

        assert_eq!(flat["formErrors"], json!([]));
        assert_eq!(flat["fieldErrors"]["job_type"], json!(["Job type is required"]));
        assert_eq!(
            flat["fieldErrors"]["parameters"],
            json!(["Parameters must be a JSON object"])
        );
    }

    #[test]
    fn body_issues_are_form_errors() {
        let flat = flatten_issues(&[ValidationIssue::new("body", "invalid_type", "Request body must be a JSON object")]);
        assert_eq!(flat["formErrors"], json!(["Request body must be a JSON object"]));
    }

    #[test]
    fn status_codes() {
        use jobgate_core::JobId;
        use jobgate_infra::{JobStatus, JobStoreError, QueueError, SubmissionStage};

        let cases = [
            (SubmissionError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (SubmissionError::MalformedBody("x".into()), StatusCode::BAD_REQUEST),
            (SubmissionError::InvalidRequest(vec![]), StatusCode::BAD_REQUEST),
            (
                SubmissionError::JobCreationFailed(JobStoreError::persistence("x")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                SubmissionError::QueueingFailed {
                    job_id: JobId::new(),
                    cause: QueueError::ConnectionFailed("x".into()),
                },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (SubmissionError::JobNotFound(JobId::new()), StatusCode::NOT_FOUND),
            (
                SubmissionError::NotRequeueable {
                    job_id: JobId::new(),
                    status: JobStatus::Completed,
                },
                StatusCode::CONFLICT,
            ),
            (
                SubmissionError::unclassified(SubmissionStage::Persisted, "x"),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(submission_error_to_response(err).status(), status);
        }
    }
}
