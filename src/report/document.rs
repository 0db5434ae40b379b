use chrono::SecondsFormat;

use crate::models::IntegrityEvent;

/// Events per page before a page break.
pub const EVENTS_PER_PAGE: usize = 12;

const PAGE_BREAK: char = '\u{000C}';

/// Report lines grouped by page, footer included. Both the text and the PDF rendering are
/// laid out from this, so they paginate identically.
pub fn document_pages(session_id: &str, events: &[IntegrityEvent]) -> Vec<Vec<String>> {
    let chunks: Vec<&[IntegrityEvent]> = if events.is_empty() {
        vec![events]
    } else {
        events.chunks(EVENTS_PER_PAGE).collect()
    };
    let page_count = chunks.len();
    let subject = events
        .first()
        .map(|event| event.subject_label.as_str())
        .unwrap_or("");

    chunks
        .iter()
        .enumerate()
        .map(|(page_index, chunk)| {
            let mut lines = Vec::new();
            if page_index == 0 {
                lines.push("Integrity Report".to_string());
                lines.push(format!("Session ID: {session_id}"));
                lines.push(format!("Subject: {subject}"));
                lines.push(format!("Events: {}", events.len()));
                lines.push(String::new());
            }

            for (offset, event) in chunk.iter().enumerate() {
                let number = page_index * EVENTS_PER_PAGE + offset + 1;
                let details = serde_json::to_string(&event.details).unwrap_or_default();
                lines.push(format!(
                    "{number}. {} - {}",
                    event.event_type,
                    event.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
                ));
                lines.push(format!("   Subject: {}", event.subject_label));
                lines.push(format!("   Details: {details}"));
                lines.push(String::new());
            }

            lines.push(format!("Page {} of {page_count}", page_index + 1));
            lines
        })
        .collect()
}

/// Plain-text report, paginated with form feeds. The output depends only on its inputs.
pub fn events_to_document(session_id: &str, events: &[IntegrityEvent]) -> String {
    let mut out = String::new();
    for (page_index, lines) in document_pages(session_id, events).iter().enumerate() {
        if page_index > 0 {
            out.push(PAGE_BREAK);
        }
        for line in lines {
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionIdentity;
    use chrono::{TimeZone, Utc};

    fn events(n: usize) -> Vec<IntegrityEvent> {
        let identity = SessionIdentity {
            session_id: "s-1".into(),
            subject_label: "Ada".into(),
        };
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                IntegrityEvent::look_away(&identity, 5, start + chrono::Duration::seconds(i as i64))
            })
            .collect()
    }

    #[test]
    fn lists_each_event_in_order() {
        let doc = events_to_document("s-1", &events(2));
        assert!(doc.starts_with("Integrity Report\nSession ID: s-1\nSubject: Ada\nEvents: 2\n"));
        assert!(doc.contains("1. look_away - 2024-05-01T10:00:00.000Z"));
        assert!(doc.contains("2. look_away - 2024-05-01T10:00:01.000Z"));
        assert!(doc.contains("   Details: {\"duration_seconds\":5}"));
        assert!(doc.ends_with("Page 1 of 1\n"));
    }

    #[test]
    fn paginates_and_keeps_numbering() {
        let doc = events_to_document("s-1", &events(EVENTS_PER_PAGE * 2 + 1));
        let pages: Vec<&str> = doc.split(PAGE_BREAK).collect();
        assert_eq!(pages.len(), 3);
        assert!(pages[1].starts_with("13. look_away"));
        assert!(pages[2].starts_with("25. look_away"));
        assert!(pages[2].ends_with("Page 3 of 3\n"));
    }

    #[test]
    fn empty_report_still_has_one_page() {
        let pages = document_pages("s-0", &[]);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].last().map(String::as_str), Some("Page 1 of 1"));
    }
}
