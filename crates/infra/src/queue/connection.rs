//! The shared broker connection.
//!
//! One `ConnectionSlot` is created at startup and shared by every request
//! (`Arc`). It holds at most one live connection:
//!
//! - `connect()` hands out a clone of the held connection once it answers a
//!   health check, or performs a handshake when none is held (or the held
//!   one is dead).
//! - Each caller gets one deadline of `connect_timeout`. Waiting for the
//!   lock, the health check and the handshake all count against it.
//! - Handshakes are serialized behind an async mutex, so concurrent callers
//!   that find the slot empty wait for one handshake instead of racing.
//! - Any failed handshake leaves the slot `Disconnected`; `reset()` does the
//!   same for a connection that failed mid-command. The next `connect()`
//!   starts over. There is no background reconnect loop.
//! - Dropping the slot closes the connection.

use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};

use super::QueueError;

/// Default upper bound on a single handshake.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Performs one handshake with the broker.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Clone + Send + Sync + 'static;

    /// Printable address for logs and errors (never includes credentials).
    fn address(&self) -> String;

    async fn establish(&self) -> Result<Self::Connection, QueueError>;

    /// Cheap liveness check on a connection handed out earlier.
    async fn is_healthy(&self, conn: &Self::Connection) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            ConnectionState::Disconnected => 0,
            ConnectionState::Connecting => 1,
            ConnectionState::Connected => 2,
        }
    }
}

pub struct ConnectionSlot<C: Connector> {
    connector: C,
    connect_timeout: Duration,
    held: Mutex<Option<C::Connection>>,
    // Mirrors `held` so state can be read without awaiting the lock.
    state: AtomicU8,
    handshakes: AtomicU64,
}

impl<C: Connector> ConnectionSlot<C> {
    pub fn new(connector: C, connect_timeout: Duration) -> Self {
        Self {
            connector,
            connect_timeout,
            held: Mutex::new(None),
            state: AtomicU8::new(ConnectionState::Disconnected.as_u8()),
            handshakes: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Number of handshakes attempted so far (successful or not).
    pub fn handshakes(&self) -> u64 {
        self.handshakes.load(Ordering::SeqCst)
    }

    pub fn address(&self) -> String {
        self.connector.address()
    }

    /// Return a healthy connection, establishing one if needed.
    ///
    /// The whole call, including time spent queued behind other callers, is
    /// bounded by `connect_timeout`.
    pub async fn connect(&self) -> Result<C::Connection, QueueError> {
        let deadline = Instant::now() + self.connect_timeout;
        let address = self.connector.address();
        let timed_out = || QueueError::ConnectionTimeout {
            address: address.clone(),
        };

        let mut held = timeout_at(deadline, self.held.lock())
            .await
            .map_err(|_| timed_out())?;

        if let Some(conn) = held.as_ref().cloned() {
            if let Ok(true) = timeout_at(deadline, self.connector.is_healthy(&conn)).await {
                debug!("reusing existing queue connection");
                return Ok(conn);
            }
            warn!(%address, "held queue connection failed its health check; reconnecting");
            *held = None;
            self.set_state(ConnectionState::Disconnected);
        }

        // The lock can be won in the same tick the deadline fires.
        if Instant::now() >= deadline {
            return Err(timed_out());
        }

        self.set_state(ConnectionState::Connecting);
        self.handshakes.fetch_add(1, Ordering::SeqCst);
        info!(%address, timeout_ms = self.connect_timeout.as_millis() as u64, "connecting to queue broker");

        let outcome = match timeout_at(deadline, self.connector.establish()).await {
            Ok(result) => result,
            Err(_) => Err(timed_out()),
        };

        match outcome {
            Ok(conn) => {
                *held = Some(conn.clone());
                self.set_state(ConnectionState::Connected);
                info!(%address, "queue connection established");
                Ok(conn)
            }
            Err(err) => {
                *held = None;
                self.set_state(ConnectionState::Disconnected);
                warn!(%address, error = %err, "queue connection failed");
                Err(err)
            }
        }
    }

    /// Drop the held connection; the next `connect()` performs a fresh handshake.
    pub async fn reset(&self) {
        let mut held = self.held.lock().await;
        if held.take().is_some() {
            debug!(address = %self.connector.address(), "queue connection discarded");
        }
        self.set_state(ConnectionState::Disconnected);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }
}

impl<C: Connector> std::fmt::Debug for ConnectionSlot<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSlot")
            .field("address", &self.connector.address())
            .field("connect_timeout", &self.connect_timeout)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, AtomicU32};

    use super::*;

    #[derive(Debug, Clone, Copy)]
    enum Step {
        Succeed,
        Hang,
        Refuse,
        Fail,
    }

    /// Connector that plays a script of handshake outcomes.
    struct Scripted {
        steps: std::sync::Mutex<VecDeque<Step>>,
        next_conn: AtomicU32,
        delay: Duration,
        healthy: AtomicBool,
    }

    impl Scripted {
        fn new(steps: &[Step]) -> Self {
            Self {
                steps: std::sync::Mutex::new(steps.iter().copied().collect()),
                next_conn: AtomicU32::new(1),
                delay: Duration::ZERO,
                healthy: AtomicBool::new(true),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl Connector for Scripted {
        type Connection = u32;

        fn address(&self) -> String {
            "broker.test:6379".to_string()
        }

        async fn establish(&self) -> Result<u32, QueueError> {
            let step = self.steps.lock().unwrap().pop_front().unwrap_or(Step::Succeed);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match step {
                Step::Succeed => Ok(self.next_conn.fetch_add(1, Ordering::SeqCst)),
                Step::Hang => std::future::pending().await,
                Step::Refuse => Err(QueueError::ConnectionRefused {
                    address: self.address(),
                }),
                Step::Fail => Err(QueueError::ConnectionFailed("handshake garbled".into())),
            }
        }

        async fn is_healthy(&self, _conn: &u32) -> bool {
            self.healthy.load(Ordering::SeqCst)
        }
    }

    #[tokio::test]
    async fn healthy_connection_is_reused_without_new_handshake() {
        let slot = ConnectionSlot::new(Scripted::new(&[]), DEFAULT_CONNECT_TIMEOUT);

        let first = slot.connect().await.unwrap();
        let second = slot.connect().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(slot.handshakes(), 1);
        assert_eq!(slot.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_handshake_fails_as_timeout_and_slot_stays_usable() {
        let slot = ConnectionSlot::new(Scripted::new(&[Step::Hang]), DEFAULT_CONNECT_TIMEOUT);

        let err = slot.connect().await.unwrap_err();
        assert_eq!(
            err,
            QueueError::ConnectionTimeout {
                address: "broker.test:6379".into()
            }
        );
        assert_eq!(slot.state(), ConnectionState::Disconnected);

        // Next call does a fresh handshake instead of replaying the failure.
        let conn = slot.connect().await.unwrap();
        assert_eq!(conn, 1);
        assert_eq!(slot.handshakes(), 2);
    }

    #[tokio::test]
    async fn refusal_and_other_failures_keep_their_classification() {
        let slot = ConnectionSlot::new(
            Scripted::new(&[Step::Refuse, Step::Fail]),
            DEFAULT_CONNECT_TIMEOUT,
        );

        assert!(matches!(
            slot.connect().await,
            Err(QueueError::ConnectionRefused { .. })
        ));
        assert!(matches!(
            slot.connect().await,
            Err(QueueError::ConnectionFailed(_))
        ));
        assert!(slot.connect().await.is_ok());
        assert_eq!(slot.handshakes(), 3);
    }

    #[tokio::test]
    async fn reset_forces_a_new_handshake() {
        let slot = ConnectionSlot::new(Scripted::new(&[]), DEFAULT_CONNECT_TIMEOUT);

        assert_eq!(slot.connect().await.unwrap(), 1);
        slot.reset().await;
        assert_eq!(slot.state(), ConnectionState::Disconnected);
        assert_eq!(slot.connect().await.unwrap(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_handshake() {
        let slot = Arc::new(ConnectionSlot::new(
            Scripted::new(&[]).with_delay(Duration::from_millis(50)),
            DEFAULT_CONNECT_TIMEOUT,
        ));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let slot = slot.clone();
            handles.push(tokio::spawn(async move { slot.connect().await.unwrap() }));
        }
        for h in handles {
            assert_eq!(h.await.unwrap(), 1);
        }
        assert_eq!(slot.handshakes(), 1);
    }

    #[tokio::test]
    async fn dead_connection_is_replaced_on_next_connect() {
        let slot = ConnectionSlot::new(Scripted::new(&[]), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(slot.connect().await.unwrap(), 1);

        slot.connector.healthy.store(false, Ordering::SeqCst);
        let replaced = slot.connect().await.unwrap();

        assert_eq!(replaced, 2);
        assert_eq!(slot.handshakes(), 2);
        assert_eq!(slot.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_callers_share_the_connect_deadline() {
        let timeout = Duration::from_secs(5);
        let slot = Arc::new(ConnectionSlot::new(
            Scripted::new(&[Step::Hang, Step::Hang, Step::Hang, Step::Hang]),
            timeout,
        ));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let slot = slot.clone();
            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let result = slot.connect().await;
                (started.elapsed(), result)
            }));
        }

        for h in handles {
            let (elapsed, result) = h.await.unwrap();
            assert!(elapsed <= timeout, "caller waited {elapsed:?}");
            assert!(matches!(result, Err(QueueError::ConnectionTimeout { .. })));
        }
        assert_eq!(slot.handshakes(), 1);
        assert_eq!(slot.state(), ConnectionState::Disconnected);
    }
}
