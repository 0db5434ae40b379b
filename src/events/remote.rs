use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use super::store::EventStore;
use crate::models::IntegrityEvent;
use crate::log_warn;

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone)]
pub struct HttpEventStoreConfig {
    /// Base URL of the event-log service, e.g. `http://localhost:4000`
    pub base_url: String,
    pub timeout: Duration,
    /// Extra attempts after a failed append. A retried append may be stored twice.
    pub max_retries: u32,
}

impl HttpEventStoreConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            max_retries: 2,
        }
    }
}

#[derive(Deserialize)]
struct LogsResponse {
    #[serde(default)]
    logs: Vec<IntegrityEvent>,
}

/// Event store backed by a remote event-log service speaking
/// `POST /logs/event` and `GET /logs/{sessionId}`.
pub struct HttpEventStore {
    http: Client,
    base_url: Url,
    max_retries: u32,
}

impl HttpEventStore {
    pub fn new(config: HttpEventStoreConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("invalid event service URL {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            bail!("event service URL {} cannot be a base URL", config.base_url);
        }

        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            http,
            base_url,
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow!("event service URL cannot be a base URL"))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn post_once(&self, url: &Url, event: &IntegrityEvent) -> Result<()> {
        self.http
            .post(url.clone())
            .json(event)
            .send()
            .await
            .context("event service unreachable")?
            .error_for_status()
            .context("event service rejected event")?;
        Ok(())
    }
}

#[async_trait]
impl EventStore for HttpEventStore {
    async fn append(&self, event: &IntegrityEvent) -> Result<()> {
        let url = self.endpoint(&["logs", "event"])?;

        let mut attempt = 0;
        loop {
            match self.post_once(&url, event).await {
                Ok(()) => return Ok(()),
                Err(err) if attempt < self.max_retries => {
                    attempt += 1;
                    log_warn!(
                        "posting {} event for session {} failed (attempt {attempt}): {err:#}",
                        event.event_type,
                        event.session_id
                    );
                    tokio::time::sleep(Duration::from_millis(200 * u64::from(attempt))).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn list(&self, session_id: &str) -> Result<Vec<IntegrityEvent>> {
        let url = self.endpoint(&["logs", session_id])?;
        let response: LogsResponse = self
            .http
            .get(url)
            .send()
            .await
            .context("event service unreachable")?
            .error_for_status()
            .context("event service refused listing")?
            .json()
            .await
            .context("event service returned malformed events")?;

        let mut events = response.logs;
        events.sort_by_key(|event| event.timestamp);
        Ok(events)
    }
}
