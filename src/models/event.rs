//! Integrity events: the only output of the detection engine.

use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionIdentity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    NoFace,
    LookAway,
    MultipleFaces,
    ObjectDetected,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::NoFace => "no_face",
            EventType::LookAway => "look_away",
            EventType::MultipleFaces => "multiple_faces",
            EventType::ObjectDetected => "object_detected",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "no_face" => Ok(EventType::NoFace),
            "look_away" => Ok(EventType::LookAway),
            "multiple_faces" => Ok(EventType::MultipleFaces),
            "object_detected" => Ok(EventType::ObjectDetected),
            other => Err(anyhow!("unknown event type '{other}'")),
        }
    }
}

/// Type-specific payload. Serialized without a tag, e.g. `{"duration_seconds":10}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EventDetails {
    Duration { duration_seconds: u64 },
    FaceCount { count: usize },
    Object { object: String, confidence: f64 },
}

impl EventDetails {
    pub fn fits(&self, event_type: EventType) -> bool {
        matches!(
            (event_type, self),
            (EventType::NoFace | EventType::LookAway, EventDetails::Duration { .. })
                | (EventType::MultipleFaces, EventDetails::FaceCount { .. })
                | (EventType::ObjectDetected, EventDetails::Object { .. })
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityEvent {
    #[serde(alias = "interviewId")]
    pub session_id: String,
    #[serde(alias = "candidateName")]
    pub subject_label: String,
    pub event_type: EventType,
    pub details: EventDetails,
    pub timestamp: DateTime<Utc>,
}

impl IntegrityEvent {
    pub fn no_face(identity: &SessionIdentity, duration_seconds: u64, at: DateTime<Utc>) -> Self {
        Self::new(identity, EventType::NoFace, EventDetails::Duration { duration_seconds }, at)
    }

    pub fn look_away(identity: &SessionIdentity, duration_seconds: u64, at: DateTime<Utc>) -> Self {
        Self::new(identity, EventType::LookAway, EventDetails::Duration { duration_seconds }, at)
    }

    pub fn multiple_faces(identity: &SessionIdentity, count: usize, at: DateTime<Utc>) -> Self {
        Self::new(identity, EventType::MultipleFaces, EventDetails::FaceCount { count }, at)
    }

    /// Confidence is rounded to two decimals.
    pub fn object_detected(
        identity: &SessionIdentity,
        object: String,
        confidence: f64,
        at: DateTime<Utc>,
    ) -> Self {
        let confidence = (confidence * 100.0).round() / 100.0;
        Self::new(
            identity,
            EventType::ObjectDetected,
            EventDetails::Object { object, confidence },
            at,
        )
    }

    fn new(
        identity: &SessionIdentity,
        event_type: EventType,
        details: EventDetails,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: identity.session_id.clone(),
            subject_label: identity.subject_label.clone(),
            event_type,
            details,
            timestamp,
        }
    }

    /// Checks applied to events arriving from outside the engine.
    pub fn validate(&self) -> Result<()> {
        if self.session_id.trim().is_empty() {
            bail!("sessionId is required");
        }
        if !self.details.fits(self.event_type) {
            bail!("details do not match event type {}", self.event_type);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn identity() -> SessionIdentity {
        SessionIdentity {
            session_id: "session-1".into(),
            subject_label: "Ada".into(),
        }
    }

    #[test]
    fn serializes_with_wire_names() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let event = IntegrityEvent::no_face(&identity(), 10, at);

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "sessionId": "session-1",
                "subjectLabel": "Ada",
                "eventType": "no_face",
                "details": { "duration_seconds": 10 },
                "timestamp": "2024-05-01T10:00:00Z",
            })
        );
    }

    #[test]
    fn untagged_details_pick_the_matching_shape() {
        let count: EventDetails = serde_json::from_value(json!({ "count": 2 })).unwrap();
        assert_eq!(count, EventDetails::FaceCount { count: 2 });

        let object: EventDetails =
            serde_json::from_value(json!({ "object": "book", "confidence": 0.61 })).unwrap();
        assert!(object.fits(EventType::ObjectDetected));
        assert!(!object.fits(EventType::NoFace));
    }

    #[test]
    fn object_confidence_is_rounded() {
        let event = IntegrityEvent::object_detected(&identity(), "book".into(), 0.6789, Utc::now());
        assert_eq!(
            event.details,
            EventDetails::Object { object: "book".into(), confidence: 0.68 }
        );
    }

    #[test]
    fn validate_rejects_mismatched_details() {
        let mut event = IntegrityEvent::multiple_faces(&identity(), 2, Utc::now());
        assert!(event.validate().is_ok());

        event.event_type = EventType::LookAway;
        assert!(event.validate().is_err());

        let mut event = IntegrityEvent::no_face(&identity(), 11, Utc::now());
        event.session_id = "  ".into();
        assert!(event.validate().is_err());
    }

    #[test]
    fn event_type_round_trips_through_str() {
        for event_type in [
            EventType::NoFace,
            EventType::LookAway,
            EventType::MultipleFaces,
            EventType::ObjectDetected,
        ] {
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
        assert!("tab_switch".parse::<EventType>().is_err());
    }
}
