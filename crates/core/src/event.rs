//! Domain event system: decoupled signalling out of the assembly pipeline.
//!
//! History drops, summarization transitions, degraded retrieval and overflow
//! rejections are published here so that asynchronous workers (condensation
//! jobs, metrics, audit) can react without coupling to the chat service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// The windower dropped a prefix of the conversation history
    HistoryDropped {
        conversation_id: String,
        dropped_count: usize,
        first_dropped_sequence: u64,
        last_dropped_sequence: u64,
        timestamp: DateTime<Utc>,
    },

    /// A conversation's summary tracker entered PENDING
    SummarizationRequested {
        conversation_id: String,
        first_sequence: u64,
        last_sequence: u64,
        timestamp: DateTime<Utc>,
    },

    /// A condensed summary replaced the dropped prefix
    SummaryApplied {
        conversation_id: String,
        covered_through: u64,
        summary_tokens: usize,
        timestamp: DateTime<Utc>,
    },

    /// A summarization attempt failed; the tracker stays PENDING
    SummarizationFailed {
        conversation_id: String,
        attempts: u32,
        error_message: String,
        timestamp: DateTime<Utc>,
    },

    /// The full-text index was unavailable and retrieval fell back to term counting
    RetrievalDegraded {
        conversation_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A request was rejected because the user turn alone exceeds the budget
    ContextOverflow {
        conversation_id: String,
        user_tokens: usize,
        budget: usize,
        timestamp: DateTime<Utc>,
    },

    /// The inference collaborator generated a response
    ResponseGenerated {
        conversation_id: String,
        model: String,
        prompt_tokens_estimated: usize,
        tokens_used: Option<u32>,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::HistoryDropped {
            conversation_id: "conv-1".into(),
            dropped_count: 2,
            first_dropped_sequence: 1,
            last_dropped_sequence: 2,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::HistoryDropped { dropped_count, last_dropped_sequence, .. } => {
                assert_eq!(*dropped_count, 2);
                assert_eq!(*last_dropped_sequence, 2);
            }
            _ => panic!("Expected HistoryDropped event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::RetrievalDegraded {
            conversation_id: "conv-1".into(),
            reason: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
