use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{format_datetime, parse_datetime, parse_optional_datetime, parse_status},
};
use crate::models::{MonitorSession, SessionStatus};

const SESSION_COLUMNS: &str =
    "id, subject_label, status, started_at, stopped_at, created_at, updated_at";

fn row_to_session(row: &Row) -> Result<MonitorSession> {
    let status: String = row.get("status")?;
    let started_at: String = row.get("started_at")?;
    let stopped_at: Option<String> = row.get("stopped_at")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;

    Ok(MonitorSession {
        id: row.get("id")?,
        subject_label: row.get("subject_label")?,
        status: parse_status(&status)?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_optional_datetime(stopped_at, "stopped_at")?,
        created_at: parse_datetime(&created_at, "created_at")?,
        updated_at: parse_datetime(&updated_at, "updated_at")?,
    })
}

impl Database {
    /// Insert a session row, replacing any previous row with the same id.
    pub async fn insert_session(&self, session: &MonitorSession) -> Result<()> {
        let record = session.clone();
        self.execute(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO sessions (id, subject_label, status, started_at, stopped_at, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    record.id,
                    record.subject_label,
                    record.status.as_str(),
                    format_datetime(&record.started_at),
                    record.stopped_at.as_ref().map(format_datetime),
                    format_datetime(&record.created_at),
                    format_datetime(&record.updated_at),
                ],
            )
            .context("failed to insert session")?;
            Ok(())
        })
        .await
    }

    pub async fn mark_session_status(
        &self,
        session_id: &str,
        status: SessionStatus,
        stopped_at: Option<DateTime<Utc>>,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            conn.execute(
                "UPDATE sessions
                 SET status = ?1,
                     stopped_at = ?2,
                     updated_at = ?3
                 WHERE id = ?4",
                params![
                    status.as_str(),
                    stopped_at.as_ref().map(format_datetime),
                    format_datetime(&updated_at),
                    session_id,
                ],
            )
            .context("failed to update session status")?;
            Ok(())
        })
        .await
    }

    pub async fn get_session(&self, session_id: &str) -> Result<Option<MonitorSession>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"
            ))?;

            let session = stmt
                .query_row(params![session_id], |row| Ok(row_to_session(row)))
                .optional()?
                .transpose()?;
            Ok(session)
        })
        .await
    }

    pub async fn get_running_sessions(&self) -> Result<Vec<MonitorSession>> {
        self.query_sessions(format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE status = 'Running' ORDER BY started_at DESC"
        ))
        .await
    }

    /// Mark every session still `Running` as `Interrupted`. Returns how many were touched.
    pub async fn interrupt_running_sessions(&self, at: DateTime<Utc>) -> Result<usize> {
        self.execute(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE sessions
                     SET status = ?1,
                         stopped_at = ?2,
                         updated_at = ?2
                     WHERE status = ?3",
                    params![
                        SessionStatus::Interrupted.as_str(),
                        format_datetime(&at),
                        SessionStatus::Running.as_str(),
                    ],
                )
                .context("failed to interrupt running sessions")?;
            Ok(updated)
        })
        .await
    }

    async fn query_sessions(&self, sql: String) -> Result<Vec<MonitorSession>> {
        self.execute(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }
}
