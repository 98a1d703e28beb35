//! Inbound job request validation.

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

/// One problem found in a request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub field: String,
    pub code: String,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        field: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code: code.into(),
            message: message.into(),
        }
    }
}

/// A validated submission body.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    pub job_type: String,
    pub parameters: Map<String, JsonValue>,
}

impl JobRequest {
    /// Validate `{ job_type: non-empty string, parameters?: object }`.
    ///
    /// `job_type` is taken as is (whitespace counts as content). An absent
    /// `parameters` defaults to `{}`; an explicit `null` is a type error.
    /// Reports every issue found, not just the first. Unknown fields are ignored.
    pub fn from_json(body: &JsonValue) -> Result<Self, Vec<ValidationIssue>> {
        let Some(object) = body.as_object() else {
            return Err(vec![ValidationIssue::new(
                "body",
                "invalid_type",
                "Request body must be a JSON object",
            )]);
        };

        let mut issues = Vec::new();

        let job_type = match object.get("job_type") {
            None => {
                issues.push(ValidationIssue::new("job_type", "required", "Job type is required"));
                None
            }
            Some(JsonValue::String(s)) if s.is_empty() => {
                issues.push(ValidationIssue::new("job_type", "too_small", "Job type is required"));
                None
            }
            Some(JsonValue::String(s)) => Some(s.clone()),
            Some(_) => {
                issues.push(ValidationIssue::new(
                    "job_type",
                    "invalid_type",
                    "Job type must be a string",
                ));
                None
            }
        };

        let parameters = match object.get("parameters") {
            None => Some(Map::new()),
            Some(JsonValue::Object(map)) => Some(map.clone()),
            Some(_) => {
                issues.push(ValidationIssue::new(
                    "parameters",
                    "invalid_type",
                    "Parameters must be a JSON object",
                ));
                None
            }
        };

        match (job_type, parameters) {
            (Some(job_type), Some(parameters)) if issues.is_empty() => Ok(Self {
                job_type,
                parameters,
            }),
            _ => Err(issues),
        }
    }
}
