use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("job queue is closed")]
    Closed,
    #[error("job queue is full")]
    Full,
}

/// FIFO of job ids waiting for a worker.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job_id: String) -> Result<(), QueueError>;

    /// Next job id, or `None` once the queue is closed and drained.
    async fn dequeue(&self) -> Option<String>;

    async fn close(&self);
}

/// Bounded in-process queue over an mpsc channel. Workers share the receiver.
pub struct ChannelQueue {
    tx: mpsc::Sender<String>,
    rx: Mutex<mpsc::Receiver<String>>,
}

impl ChannelQueue {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }
}

#[async_trait]
impl JobQueue for ChannelQueue {
    async fn enqueue(&self, job_id: String) -> Result<(), QueueError> {
        self.tx.try_send(job_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })
    }

    async fn dequeue(&self) -> Option<String> {
        self.rx.lock().await.recv().await
    }

    async fn close(&self) {
        self.rx.lock().await.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fifo_order() {
        let q = ChannelQueue::new(4);
        q.enqueue("a".into()).await.unwrap();
        q.enqueue("b".into()).await.unwrap();
        assert_eq!(q.dequeue().await.as_deref(), Some("a"));
        assert_eq!(q.dequeue().await.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn full_and_closed_are_reported() {
        let q = ChannelQueue::new(1);
        q.enqueue("a".into()).await.unwrap();
        assert_eq!(q.enqueue("b".into()).await, Err(QueueError::Full));

        q.close().await;
        assert_eq!(q.enqueue("c".into()).await, Err(QueueError::Closed));
        // already-queued work still drains
        assert_eq!(q.dequeue().await.as_deref(), Some("a"));
        assert_eq!(q.dequeue().await, None);
    }
}
