//! Session reports rendered from persisted events.

pub mod csv;
pub mod document;
pub mod pdf;

use std::str::FromStr;

use anyhow::{anyhow, Result};

use crate::models::IntegrityEvent;

pub use self::csv::events_to_csv;
pub use self::document::events_to_document;
pub use self::pdf::events_to_pdf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    #[default]
    Csv,
    Text,
    Pdf,
}

impl ReportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "text/csv; charset=utf-8",
            ReportFormat::Text => "text/plain; charset=utf-8",
            ReportFormat::Pdf => "application/pdf",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ReportFormat::Csv => "csv",
            ReportFormat::Text => "txt",
            ReportFormat::Pdf => "pdf",
        }
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ReportFormat::Csv),
            "text" | "txt" => Ok(ReportFormat::Text),
            "pdf" => Ok(ReportFormat::Pdf),
            other => Err(anyhow!("invalid format '{other}', use csv, text or pdf")),
        }
    }
}

/// A rendered report, ready to be served as a download.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub format: ReportFormat,
    pub filename: String,
    pub body: Vec<u8>,
}

/// Render `events` (already sorted oldest first). Same inputs, same bytes.
pub fn render(format: ReportFormat, session_id: &str, events: &[IntegrityEvent]) -> Result<Report> {
    let body = match format {
        ReportFormat::Csv => events_to_csv(events).into_bytes(),
        ReportFormat::Text => events_to_document(session_id, events).into_bytes(),
        ReportFormat::Pdf => events_to_pdf(session_id, events)?,
    };

    Ok(Report {
        format,
        filename: format!("{session_id}-report.{}", format.extension()),
        body,
    })
}
