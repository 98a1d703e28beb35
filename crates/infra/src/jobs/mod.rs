//! Durable job records.
//!
//! - `JobRecord`: a persisted job (id, owner, type, parameters, status)
//! - `JobStore`: persistence boundary (in-memory or Postgres)
//!
//! Records are written `pending` and never updated here; status transitions
//! belong to the worker pool.

pub mod postgres;
pub mod store;
pub mod types;

pub use postgres::PostgresJobStore;
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{JobRecord, JobStatus, NewJob};
