use chrono::SecondsFormat;

use crate::models::IntegrityEvent;

const HEADER: &str = "timestamp,eventType,subjectLabel,details";

/// One row per event, every field quoted. Rows are joined with `\n` and there is no
/// trailing newline.
pub fn events_to_csv(events: &[IntegrityEvent]) -> String {
    let mut lines = Vec::with_capacity(events.len() + 1);
    lines.push(HEADER.to_string());

    for event in events {
        let details = serde_json::to_string(&event.details).unwrap_or_default();
        let fields = [
            event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            event.event_type.to_string(),
            event.subject_label.clone(),
            details,
        ];
        let row: Vec<String> = fields.iter().map(|field| quote(field)).collect();
        lines.push(row.join(","));
    }

    lines.join("\n")
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}
