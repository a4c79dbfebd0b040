//! Cross-process notification of the last-committed block index.
//!
//! One channel is live per configuration epoch: the supervisor closes the
//! previous instance before opening a new one. Consumers subscribe to
//! receive "caught up to index N" notifications in commit order.

use tokio::sync::{broadcast, Mutex};
use tracing::debug;

/// Broadcast channel carrying the most recently applied block index.
pub struct ProcessedIndexChannel {
    sender: Mutex<Option<broadcast::Sender<u64>>>,
}

impl ProcessedIndexChannel {
    /// Open a channel buffering up to `capacity` unread notifications
    /// per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Mutex::new(Some(sender)),
        }
    }

    /// Publish a newly applied block index.
    ///
    /// Returns the number of subscribers reached; zero when nobody is
    /// listening or the channel is closed. Publishing never fails.
    pub async fn publish(&self, index: u64) -> usize {
        let sender = self.sender.lock().await;
        match sender.as_ref() {
            Some(tx) => tx.send(index).unwrap_or(0),
            None => {
                debug!(index, "Publish on closed index channel dropped");
                0
            }
        }
    }

    /// Subscribe to index notifications.
    ///
    /// Returns `None` once the channel is closed.
    pub async fn subscribe(&self) -> Option<broadcast::Receiver<u64>> {
        let sender = self.sender.lock().await;
        sender.as_ref().map(|tx| tx.subscribe())
    }

    /// Close the channel. Existing subscribers observe the close after
    /// draining buffered notifications; later publishes are dropped.
    pub async fn close(&self) {
        let mut sender = self.sender.lock().await;
        *sender = None;
    }

    pub async fn is_closed(&self) -> bool {
        self.sender.lock().await.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn subscribers_receive_indices_in_order() {
        let channel = ProcessedIndexChannel::new(16);
        let mut rx = channel.subscribe().await.unwrap();

        for index in 0..4u64 {
            assert_eq!(channel.publish(index).await, 1);
        }

        for expected in 0..4u64 {
            assert_eq!(rx.recv().await.unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let channel = ProcessedIndexChannel::new(16);
        assert_eq!(channel.publish(7).await, 0);
    }

    #[tokio::test]
    async fn close_ends_subscriptions() {
        let channel = ProcessedIndexChannel::new(16);
        let mut rx = channel.subscribe().await.unwrap();

        channel.publish(0).await;
        channel.close().await;

        // Les notifications en attente sont encore lisibles, puis le
        // canal est fermé
        assert_eq!(rx.recv().await.unwrap(), 0);
        assert!(matches!(rx.recv().await, Err(RecvError::Closed)));

        assert!(channel.is_closed().await);
        assert!(channel.subscribe().await.is_none());
        assert_eq!(channel.publish(1).await, 0);
    }
}
