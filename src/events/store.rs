use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{EventType, IntegrityEvent};

/// Durable home for integrity events.
#[async_trait]
pub trait EventStore: Send + Sync + 'static {
    async fn append(&self, event: &IntegrityEvent) -> Result<()>;

    /// Events for one session, timestamp ascending.
    async fn list(&self, session_id: &str) -> Result<Vec<IntegrityEvent>>;
}

/// Published whenever an event could not be persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryFailure {
    pub session_id: String,
    pub event_type: EventType,
    pub error: String,
    pub at: DateTime<Utc>,
}
