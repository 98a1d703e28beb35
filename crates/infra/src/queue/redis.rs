//! Redis list-backed queue.
//!
//! - **Push**: `LPUSH <list> <job_id>`, one attempt per call
//! - **Lookup**: `LPOS <list> <job_id>` (Redis >= 6.0.6)
//! - **Connection**: one multiplexed connection in a [`ConnectionSlot`],
//!   discarded after any failed command

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, IntoConnectionInfo, RedisError};
use tracing::{error, info, instrument};

use jobgate_core::JobId;

use super::address::QueueAddress;
use super::connection::{ConnectionSlot, ConnectionState, Connector};
use super::{JobQueue, QueueError};

#[derive(Debug, Clone)]
pub struct RedisConnector {
    client: redis::Client,
    address: QueueAddress,
}

impl RedisConnector {
    pub fn new(address: QueueAddress) -> Result<Self, QueueError> {
        let mut info = (address.host.as_str(), address.port)
            .into_connection_info()
            .map_err(|e| QueueError::InvalidAddress(e.to_string()))?;
        info.redis.db = address.db;
        info.redis.username = address.username.clone();
        info.redis.password = address.password.clone();

        let client =
            redis::Client::open(info).map_err(|e| QueueError::InvalidAddress(e.to_string()))?;

        Ok(Self { client, address })
    }
}

#[async_trait]
impl Connector for RedisConnector {
    type Connection = MultiplexedConnection;

    fn address(&self) -> String {
        self.address.to_string()
    }

    async fn establish(&self) -> Result<MultiplexedConnection, QueueError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| classify_connect_error(&self.address, e))
    }

    async fn is_healthy(&self, conn: &MultiplexedConnection) -> bool {
        let mut conn = conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }
}

fn classify_connect_error(address: &QueueAddress, err: RedisError) -> QueueError {
    if err.is_timeout() {
        QueueError::ConnectionTimeout {
            address: address.to_string(),
        }
    } else if err.is_connection_refusal() {
        QueueError::ConnectionRefused {
            address: address.to_string(),
        }
    } else {
        QueueError::ConnectionFailed(err.to_string())
    }
}

/// Job queue over a Redis list.
#[derive(Debug)]
pub struct RedisJobQueue {
    slot: ConnectionSlot<RedisConnector>,
    list: String,
}

impl RedisJobQueue {
    pub fn new(
        address: QueueAddress,
        list: impl Into<String>,
        connect_timeout: Duration,
    ) -> Result<Self, QueueError> {
        Ok(Self {
            slot: ConnectionSlot::new(RedisConnector::new(address)?, connect_timeout),
            list: list.into(),
        })
    }

    async fn command_failed(&self, command: &'static str, err: RedisError) -> QueueError {
        // A connection that failed a command is not trusted again.
        self.slot.reset().await;
        QueueError::Command {
            command,
            list: self.list.clone(),
            cause: err.to_string(),
        }
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    #[instrument(skip(self), fields(list = %self.list), err)]
    async fn enqueue(&self, job_id: JobId) -> Result<u64, QueueError> {
        let mut conn = self.slot.connect().await?;

        let pushed: Result<u64, RedisError> = conn.lpush(&self.list, job_id.to_string()).await;
        match pushed {
            Ok(length) => {
                info!(%job_id, queue_length = length, "job id pushed to queue");
                Ok(length)
            }
            Err(e) => {
                error!(%job_id, error = %e, "LPUSH failed");
                Err(self.command_failed("LPUSH", e).await)
            }
        }
    }

    #[instrument(skip(self), fields(list = %self.list), err)]
    async fn contains(&self, job_id: JobId) -> Result<bool, QueueError> {
        let mut conn = self.slot.connect().await?;

        let position: Result<Option<i64>, RedisError> = redis::cmd("LPOS")
            .arg(&self.list)
            .arg(job_id.to_string())
            .query_async(&mut conn)
            .await;

        match position {
            Ok(position) => Ok(position.is_some()),
            Err(e) => Err(self.command_failed("LPOS", e).await),
        }
    }

    fn name(&self) -> &str {
        &self.list
    }

    fn connection_state(&self) -> ConnectionState {
        self.slot.state()
    }

    async fn close(&self) {
        self.slot.reset().await;
        info!(list = %self.list, "queue connection closed");
    }
}
