//! Postgres-backed job store.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | JobStoreError |
//! |------------|----------------------|---------------|
//! | Database (unique violation) | `23505` | `Constraint` |
//! | Database (check / not-null violation) | `23514` / `23502` | `Constraint` |
//! | Database (other) | Any other | `Persistence` |
//! | PoolClosed, Io, Tls, ... | N/A | `Persistence` |
//!
//! Every variant is a persistence failure from the submitter's point of view;
//! the split only sharpens logs.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{instrument, warn};
use uuid::Uuid;

use async_trait::async_trait;
use jobgate_core::{JobId, UserId};

use super::store::{JobStore, JobStoreError};
use super::types::{JobRecord, JobStatus, NewJob};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS report_jobs (
    id          UUID PRIMARY KEY,
    user_id     UUID NOT NULL,
    job_type    TEXT NOT NULL CHECK (job_type <> ''),
    parameters  JSONB NOT NULL DEFAULT '{}'::jsonb,
    status      TEXT NOT NULL DEFAULT 'pending'
                CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_PENDING_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS report_jobs_pending_created_at
    ON report_jobs (created_at)
    WHERE status = 'pending'
"#;

/// Postgres-backed job store over the `report_jobs` table.
///
/// `PgPool` is internally reference counted, so clones share one pool.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the jobs table and its pending index if they do not exist.
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        for statement in [CREATE_TABLE, CREATE_PENDING_INDEX] {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, new), fields(owner_id = %new.owner_id, job_type = %new.job_type), err)]
    async fn create_job(&self, new: NewJob) -> Result<JobRecord, JobStoreError> {
        let id = JobId::new();

        let row = sqlx::query(
            r#"
            INSERT INTO report_jobs (id, user_id, job_type, parameters, status)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING created_at
            "#,
        )
        .bind(id.as_uuid())
        .bind(new.owner_id.as_uuid())
        .bind(&new.job_type)
        .bind(Json(&new.parameters))
        .bind(JobStatus::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("create_job", e))?;

        // The row is committed at this point; only the timestamp comes back.
        Ok(inserted_record(id, new, row.try_get("created_at")))
    }

    #[instrument(skip(self), err)]
    async fn get(&self, owner_id: UserId, job_id: JobId) -> Result<Option<JobRecord>, JobStoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, job_type, parameters, status, created_at
            FROM report_jobs
            WHERE id = $1 AND user_id = $2
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(owner_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("get", e))?;

        row.as_ref().map(record_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<JobRecord>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, job_type, parameters, status, created_at
            FROM report_jobs
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
        .bind(created_before)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_stale_pending", e))?;

        rows.iter().map(record_from_row).collect()
    }
}

/// Build the record for a row this store just inserted.
///
/// A committed row must be reported as created, so an unreadable
/// `created_at` falls back to the local clock instead of failing the call.
fn inserted_record(
    id: JobId,
    new: NewJob,
    created_at: Result<DateTime<Utc>, sqlx::Error>,
) -> JobRecord {
    let created_at = created_at.unwrap_or_else(|e| {
        warn!(job_id = %id, error = %e, "could not read created_at of inserted job");
        Utc::now()
    });

    JobRecord {
        id,
        owner_id: new.owner_id,
        job_type: new.job_type,
        parameters: new.parameters,
        status: JobStatus::Pending,
        created_at,
    }
}

fn record_from_row(row: &PgRow) -> Result<JobRecord, JobStoreError> {
    let corrupt = |field: &str, e: sqlx::Error| JobStoreError::Corrupt(format!("{field}: {e}"));

    let id: Uuid = row.try_get("id").map_err(|e| corrupt("id", e))?;
    let user_id: Uuid = row.try_get("user_id").map_err(|e| corrupt("user_id", e))?;
    let job_type: String = row.try_get("job_type").map_err(|e| corrupt("job_type", e))?;
    let parameters: Json<JsonValue> = row.try_get("parameters").map_err(|e| corrupt("parameters", e))?;
    let status: String = row.try_get("status").map_err(|e| corrupt("status", e))?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(|e| corrupt("created_at", e))?;

    let parameters = match parameters.0 {
        JsonValue::Object(map) => map,
        JsonValue::Null => Map::new(),
        other => {
            return Err(JobStoreError::Corrupt(format!(
                "parameters: expected object, got {other}"
            )));
        }
    };

    Ok(JobRecord {
        id: JobId::from_uuid(id),
        owner_id: UserId::from_uuid(user_id),
        job_type,
        parameters,
        status: status
            .parse()
            .map_err(|e: jobgate_core::DomainError| JobStoreError::Corrupt(e.to_string()))?,
        created_at,
    })
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23514") | Some("23502") => JobStoreError::Constraint(msg),
                _ => JobStoreError::Persistence(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            JobStoreError::Persistence(format!("connection pool closed in {}", operation))
        }
        other => {
            warn!(operation, error = %other, "job store query failed");
            JobStoreError::Persistence(format!("sqlx error in {}: {}", operation, other))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;

    fn new_job() -> NewJob {
        let mut parameters = Map::new();
        parameters.insert("region".into(), json!("emea"));
        NewJob {
            owner_id: UserId::new(),
            job_type: "sales_summary".into(),
            parameters,
        }
    }

    #[test]
    fn inserted_record_uses_returned_timestamp() {
        let id = JobId::new();
        let new = new_job();
        let owner = new.owner_id;
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        let record = inserted_record(id, new, Ok(at));

        assert_eq!(record.id, id);
        assert_eq!(record.owner_id, owner);
        assert_eq!(record.job_type, "sales_summary");
        assert_eq!(record.parameters.get("region"), Some(&json!("emea")));
        assert_eq!(record.status, JobStatus::Pending);
        assert_eq!(record.created_at, at);
    }

    #[test]
    fn unreadable_timestamp_still_reports_the_committed_job() {
        let id = JobId::new();
        let before = Utc::now();

        let record = inserted_record(
            id,
            new_job(),
            Err(sqlx::Error::ColumnNotFound("created_at".into())),
        );

        assert_eq!(record.id, id);
        assert_eq!(record.status, JobStatus::Pending);
        assert!(record.created_at >= before);
    }
}
