use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime},
};
use crate::events::EventStore;
use crate::models::{EventDetails, EventType, IntegrityEvent};

fn row_to_event(row: &Row) -> Result<IntegrityEvent> {
    let event_type: String = row.get("event_type")?;
    let details_json: String = row.get("details_json")?;
    let timestamp: String = row.get("timestamp")?;

    Ok(IntegrityEvent {
        session_id: row.get("session_id")?,
        subject_label: row.get("subject_label")?,
        event_type: event_type.parse::<EventType>()?,
        details: serde_json::from_str::<EventDetails>(&details_json)
            .with_context(|| format!("failed to parse details for {event_type} event"))?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
    })
}

impl Database {
    /// Append one event; returns its row id. Duplicates are stored as-is.
    pub async fn append_event(&self, event: &IntegrityEvent) -> Result<i64> {
        let record = event.clone();
        let details_json =
            serde_json::to_string(&record.details).context("failed to serialize event details")?;

        self.execute(move |conn| {
            conn.execute(
                "INSERT INTO integrity_events (session_id, subject_label, event_type, details_json, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    record.session_id,
                    record.subject_label,
                    record.event_type.as_str(),
                    details_json,
                    format_datetime(&record.timestamp),
                ],
            )
            .context("failed to insert integrity event")?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Events for a session, oldest first. Equal timestamps keep insertion order.
    pub async fn list_events(&self, session_id: &str) -> Result<Vec<IntegrityEvent>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT session_id, subject_label, event_type, details_json, timestamp
                 FROM integrity_events
                 WHERE session_id = ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;

            let mut rows = stmt.query(params![session_id])?;
            let mut events = Vec::new();
            while let Some(row) = rows.next()? {
                events.push(row_to_event(row)?);
            }
            Ok(events)
        })
        .await
    }
}

#[async_trait]
impl EventStore for Database {
    async fn append(&self, event: &IntegrityEvent) -> Result<()> {
        self.append_event(event).await.map(|_| ())
    }

    async fn list(&self, session_id: &str) -> Result<Vec<IntegrityEvent>> {
        self.list_events(session_id).await
    }
}
