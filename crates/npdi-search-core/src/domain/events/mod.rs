//! Domain event infrastructure
//!
//! Search lifecycle events are published through [`EventPublisher`] so callers
//! can keep an audit trail of dispatches, supersessions and failures without the
//! orchestrator knowing where they end up.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{PoisonError, RwLock};
use uuid::Uuid;

use crate::error::Result;

/// Something that happened during a search. Immutable once created.
pub trait DomainEvent: Send + Sync {
    /// Event type as a string
    fn event_type(&self) -> &str;

    /// Identifier of the request the event belongs to
    fn aggregate_id(&self) -> Uuid;

    fn timestamp(&self) -> DateTime<Utc>;

    /// Event payload as JSON
    fn data(&self) -> Option<&serde_json::Value>;
}

/// Publisher trait for emitting domain events
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &dyn DomainEvent) -> Result<()>;

    /// Publish multiple events in order, stopping at the first failure
    async fn publish_all(&self, events: &[&dyn DomainEvent]) -> Result<()> {
        for event in events {
            self.publish(*event).await?;
        }
        Ok(())
    }
}

/// A recorded event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub event_type: String,
    pub data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Capture a domain event
    pub fn from_event(event: &dyn DomainEvent) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id: event.aggregate_id(),
            event_type: event.event_type().to_string(),
            data: event.data().cloned(),
            created_at: event.timestamp(),
        }
    }
}

/// In-memory event log
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: RwLock<Vec<StoredEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, event: StoredEvent) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    /// Events recorded for one request
    pub fn events_for(&self, aggregate_id: Uuid) -> Vec<StoredEvent> {
        self.filtered(|e| e.aggregate_id == aggregate_id)
    }

    /// Events of one type, in publication order
    pub fn events_by_type(&self, event_type: &str) -> Vec<StoredEvent> {
        self.filtered(|e| e.event_type == event_type)
    }

    pub fn all_events(&self) -> Vec<StoredEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.events
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn filtered(&self, keep: impl Fn(&StoredEvent) -> bool) -> Vec<StoredEvent> {
        self.events
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|e| keep(*e))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventStore {
    async fn publish(&self, event: &dyn DomainEvent) -> Result<()> {
        self.store(StoredEvent::from_event(event));
        Ok(())
    }
}
