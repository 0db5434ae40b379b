use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::event::{EventDetails, EventType, IntegrityEvent};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AlertLevel {
    Info,
    Warn,
    Error,
}

/// Operator-facing notice derived from an integrity event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    pub message: String,
    pub details: Option<EventDetails>,
    pub ts: DateTime<Utc>,
}

impl Alert {
    pub fn from_event(event: &IntegrityEvent) -> Self {
        // Objects are a warning; face conditions are errors.
        let level = match event.event_type {
            EventType::ObjectDetected => AlertLevel::Warn,
            _ => AlertLevel::Error,
        };

        Self {
            id: Uuid::new_v4().to_string(),
            level,
            message: describe(event),
            details: Some(event.details.clone()),
            ts: event.timestamp,
        }
    }
}

fn describe(event: &IntegrityEvent) -> String {
    match (&event.event_type, &event.details) {
        (EventType::NoFace, EventDetails::Duration { duration_seconds }) => {
            format!("No face detected ({duration_seconds}s)")
        }
        (EventType::LookAway, EventDetails::Duration { duration_seconds }) => {
            format!("Looking away ({duration_seconds}s)")
        }
        (EventType::MultipleFaces, EventDetails::FaceCount { count }) => {
            format!("Multiple faces detected ({count})")
        }
        (EventType::ObjectDetected, EventDetails::Object { object, confidence }) => {
            format!("Object: {object} ({confidence})")
        }
        (event_type, _) => event_type.to_string(),
    }
}
