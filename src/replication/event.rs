//! Replication events and the queue carrying them from detector to executor

use std::fmt;
use tokio::sync::mpsc;

/// A tag to copy from the source registry to the destination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReplicationEvent {
    pub repository: String,
    pub tag: String,
}

impl ReplicationEvent {
    pub fn new(repository: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            tag: tag.into(),
        }
    }
}

impl fmt::Display for ReplicationEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repository, self.tag)
    }
}

/// Returned by [`EventSender::send`] once the executor has gone away
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueClosed(pub ReplicationEvent);

impl fmt::Display for QueueClosed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "event queue closed, dropping {}", self.0)
    }
}

impl std::error::Error for QueueClosed {}

/// Producer half of the event queue
#[derive(Debug, Clone)]
pub enum EventSender {
    Bounded(mpsc::Sender<ReplicationEvent>),
    Unbounded(mpsc::UnboundedSender<ReplicationEvent>),
}

/// Consumer half of the event queue
#[derive(Debug)]
pub enum EventReceiver {
    Bounded(mpsc::Receiver<ReplicationEvent>),
    Unbounded(mpsc::UnboundedReceiver<ReplicationEvent>),
}

/// Creates the event queue. `None` or `Some(0)` means unbounded.
pub fn event_queue(capacity: Option<usize>) -> (EventSender, EventReceiver) {
    match capacity {
        Some(capacity) if capacity > 0 => {
            let (tx, rx) = mpsc::channel(capacity);
            (EventSender::Bounded(tx), EventReceiver::Bounded(rx))
        }
        _ => {
            let (tx, rx) = mpsc::unbounded_channel();
            (EventSender::Unbounded(tx), EventReceiver::Unbounded(rx))
        }
    }
}

impl EventSender {
    /// Enqueues an event, waiting for room when the queue is bounded and full
    pub async fn send(&self, event: ReplicationEvent) -> Result<(), QueueClosed> {
        match self {
            EventSender::Bounded(tx) => tx.send(event).await.map_err(|e| QueueClosed(e.0)),
            EventSender::Unbounded(tx) => tx.send(event).map_err(|e| QueueClosed(e.0)),
        }
    }
}

impl EventReceiver {
    /// Next event in emission order, `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<ReplicationEvent> {
        match self {
            EventReceiver::Bounded(rx) => rx.recv().await,
            EventReceiver::Unbounded(rx) => rx.recv().await,
        }
    }

    pub fn try_recv(&mut self) -> Option<ReplicationEvent> {
        match self {
            EventReceiver::Bounded(rx) => rx.try_recv().ok(),
            EventReceiver::Unbounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Drains whatever is queued right now
    pub fn drain(&mut self) -> Vec<ReplicationEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_display() {
        assert_eq!(ReplicationEvent::new("app/web", "v2").to_string(), "app/web:v2");
    }

    #[tokio::test]
    async fn test_unbounded_queue_keeps_order() {
        let (tx, mut rx) = event_queue(None);
        for tag in ["v1", "v2", "v3"] {
            tx.send(ReplicationEvent::new("app/web", tag)).await.unwrap();
        }
        let tags: Vec<_> = rx.drain().into_iter().map(|e| e.tag).collect();
        assert_eq!(tags, vec!["v1", "v2", "v3"]);
    }

    #[tokio::test]
    async fn test_bounded_queue_applies_backpressure() {
        let (tx, mut rx) = event_queue(Some(1));
        tx.send(ReplicationEvent::new("app/web", "v1")).await.unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            tx.send(ReplicationEvent::new("app/web", "v2")),
        )
        .await;
        assert!(blocked.is_err());

        assert_eq!(rx.recv().await.map(|e| e.tag), Some("v1".to_string()));
        tx.send(ReplicationEvent::new("app/web", "v3")).await.unwrap();
        assert_eq!(rx.recv().await.map(|e| e.tag), Some("v3".to_string()));
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped() {
        let (tx, rx) = event_queue(Some(4));
        drop(rx);
        let err = tx.send(ReplicationEvent::new("app/web", "v1")).await.unwrap_err();
        assert_eq!(err.0.tag, "v1");
    }
}
