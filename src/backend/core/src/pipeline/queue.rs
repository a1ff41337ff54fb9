//! Bounded hand-off between request handlers and write-back workers.

use crate::distribution::Distribution;
use crate::error::{ForgetError, Result};
use metrics::counter;
use std::time::Duration;
use tokio::sync::mpsc;

/// Producer side of the update queue.
///
/// Cloning is cheap; every clone feeds the same bounded channel.
#[derive(Debug, Clone)]
pub struct UpdateQueue {
    sender: mpsc::Sender<Distribution>,
    enqueue_timeout: Duration,
}

impl UpdateQueue {
    /// Create a queue holding at most `capacity` pending distributions.
    pub fn bounded(capacity: usize, enqueue_timeout: Duration) -> (Self, mpsc::Receiver<Distribution>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender,
                enqueue_timeout,
            },
            receiver,
        )
    }

    /// Hand a distribution to the workers, waiting at most `enqueue_timeout`
    /// for a free slot.
    pub async fn enqueue(&self, dist: Distribution) -> Result<()> {
        let name = dist.name.clone();

        match tokio::time::timeout(self.enqueue_timeout, self.sender.send(dist)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ForgetError::pipeline_closed().for_distribution(name)),
            Err(_) => {
                counter!("forget_enqueue_rejected_total").increment(1);
                Err(ForgetError::queue_full(&name))
            }
        }
    }

    /// Number of distributions waiting for a worker.
    pub fn depth(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    pub fn capacity(&self) -> usize {
        self.sender.max_capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    #[tokio::test]
    async fn test_enqueue_and_depth() {
        let (queue, mut rx) = UpdateQueue::bounded(2, Duration::from_millis(10));

        queue.enqueue(Distribution::new("a", 0.5, false)).await.unwrap();
        assert_eq!(queue.depth(), 1);
        assert_eq!(queue.capacity(), 2);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.name, "a");
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_full_queue_times_out() {
        let (queue, _rx) = UpdateQueue::bounded(1, Duration::from_millis(10));

        queue.enqueue(Distribution::new("a", 0.5, false)).await.unwrap();
        let err = queue
            .enqueue(Distribution::new("b", 0.5, false))
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::QueueFull);
        assert_eq!(err.details().distribution.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let (queue, rx) = UpdateQueue::bounded(1, Duration::from_millis(10));
        drop(rx);

        assert!(queue.is_closed());
        let err = queue
            .enqueue(Distribution::new("a", 0.5, false))
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::PipelineClosed);
    }
}
