use serde_json::Value;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Broadcast publisher for lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub id: Uuid,
    pub name: String,
    pub context: Value,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event with the given name and context
    pub fn publish(&self, event_name: impl Into<String>, context: Value) -> Result<(), PublishError> {
        let event = PublishedEvent {
            id: Uuid::new_v4(),
            name: event_name.into(),
            context,
            published_at: chrono::Utc::now(),
        };

        // A send with no subscribers errors; publishing with nobody
        // listening is fine for fire-and-forget observations.
        match self.sender.send(event) {
            Ok(_) => Ok(()),
            Err(broadcast::error::SendError(_)) => Ok(()),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Error types for event publishing
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Event channel is closed")]
    ChannelClosed,
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(1000)
    }
}
