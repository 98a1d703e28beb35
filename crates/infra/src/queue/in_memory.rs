//! In-memory queue for tests/dev.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use jobgate_core::JobId;

use super::{ConnectionState, JobQueue, QueueError};

/// List-backed queue living in process memory.
///
/// `set_available(false)` simulates the broker going away: every call then
/// fails with `ConnectionRefused`, as the Redis queue would.
#[derive(Debug)]
pub struct InMemoryJobQueue {
    name: String,
    items: Mutex<VecDeque<String>>,
    available: AtomicBool,
}

impl InMemoryJobQueue {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            items: Mutex::new(VecDeque::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Current list contents, head first.
    pub fn items(&self) -> Vec<String> {
        self.items
            .lock()
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.items.lock().map(|items| items.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pop from the tail, the way a worker consumes the list.
    pub fn pop_oldest(&self) -> Option<String> {
        self.items.lock().ok()?.pop_back()
    }

    fn check_available(&self) -> Result<(), QueueError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(QueueError::ConnectionRefused {
                address: format!("memory/{}", self.name),
            })
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, VecDeque<String>>, QueueError> {
        self.items.lock().map_err(|_| QueueError::Command {
            command: "LOCK",
            list: self.name.clone(),
            cause: "queue lock poisoned".into(),
        })
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new(super::DEFAULT_QUEUE_NAME)
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, job_id: JobId) -> Result<u64, QueueError> {
        self.check_available()?;
        let mut items = self.lock()?;
        items.push_front(job_id.to_string());
        Ok(items.len() as u64)
    }

    async fn contains(&self, job_id: JobId) -> Result<bool, QueueError> {
        self.check_available()?;
        let needle = job_id.to_string();
        Ok(self.lock()?.iter().any(|item| *item == needle))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn connection_state(&self) -> ConnectionState {
        if self.available.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn pushes_to_head_and_reports_length() {
        let queue = InMemoryJobQueue::default();
        let a = JobId::new();
        let b = JobId::new();

        assert_eq!(queue.enqueue(a).await.unwrap(), 1);
        assert_eq!(queue.enqueue(b).await.unwrap(), 2);

        assert_eq!(queue.items(), vec![b.to_string(), a.to_string()]);
        assert_eq!(queue.pop_oldest(), Some(a.to_string()));
        assert!(queue.contains(b).await.unwrap());
        assert!(!queue.contains(a).await.unwrap());
    }

    #[tokio::test]
    async fn unavailable_queue_refuses_without_side_effects() {
        let queue = InMemoryJobQueue::default();
        queue.set_available(false);

        let err = queue.enqueue(JobId::new()).await.unwrap_err();
        assert!(err.is_connection_error());
        assert!(queue.is_empty());
        assert_eq!(queue.connection_state(), ConnectionState::Disconnected);
    }
}
