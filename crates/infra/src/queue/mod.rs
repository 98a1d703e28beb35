//! Work queue boundary.
//!
//! The queue carries job *references* (stringified job ids) pushed onto the
//! head of a named list. The worker pool pops from the other end.
//!
//! ## Components
//!
//! - `JobQueue`: enqueue / lookup primitive
//! - `ConnectionSlot`: the one shared, lazily established broker connection
//! - `QueueAddress`: parsed broker address (host, port, optional credential)
//! - `RedisJobQueue` (feature `redis`) and `InMemoryJobQueue`

use async_trait::async_trait;

use jobgate_core::JobId;

pub mod address;
pub mod connection;
pub mod in_memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use address::QueueAddress;
pub use connection::{ConnectionSlot, ConnectionState, Connector};
pub use in_memory::InMemoryJobQueue;
#[cfg(feature = "redis")]
pub use self::redis::{RedisConnector, RedisJobQueue};

/// Default list the submission endpoint pushes to.
pub const DEFAULT_QUEUE_NAME: &str = "new_report_jobs";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("queue connection to {address} timed out")]
    ConnectionTimeout { address: String },

    #[error("queue connection to {address} refused")]
    ConnectionRefused { address: String },

    #[error("queue connection failed: {0}")]
    ConnectionFailed(String),

    #[error("{command} on '{list}' failed: {cause}")]
    Command {
        command: &'static str,
        list: String,
        cause: String,
    },

    #[error("invalid queue address: {0}")]
    InvalidAddress(String),
}

impl QueueError {
    /// True for failures that happened before any command reached the broker.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            QueueError::ConnectionTimeout { .. }
                | QueueError::ConnectionRefused { .. }
                | QueueError::ConnectionFailed(_)
        )
    }
}

/// Enqueue primitive over a named list.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push the job id onto the head of the list once. Returns the new list length.
    async fn enqueue(&self, job_id: JobId) -> Result<u64, QueueError>;

    /// Whether the job id is currently sitting in the list.
    async fn contains(&self, job_id: JobId) -> Result<bool, QueueError>;

    /// Name of the list this queue pushes to.
    fn name(&self) -> &str;

    fn connection_state(&self) -> ConnectionState;

    /// Release broker resources on shutdown. Queues without any hold nothing.
    async fn close(&self) {}
}
