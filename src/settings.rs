use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::detection::{ConfigError, DetectionConfig};

pub const SETTINGS_PATH_ENV: &str = "PROCTORWATCH_SETTINGS";
const DEFAULT_SETTINGS_PATH: &str = "proctorwatch.json";

/// Process settings. Read from a JSON file, then overridden by `PROCTORWATCH_*` variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// When set, events are posted to this event-log service instead of the local database.
    pub event_service_url: Option<String>,
    /// How long a posted face observation stays usable
    pub feed_max_age_ms: u64,
    /// Defaults for new sessions. Each session may override individual fields.
    pub detection: DetectionConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 4000,
            database_path: PathBuf::from("proctorwatch.db"),
            event_service_url: None,
            feed_max_age_ms: 1_500,
            detection: DetectionConfig::default(),
        }
    }
}

impl Settings {
    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse settings in {}", path.display()))
    }

    /// Settings file named by `PROCTORWATCH_SETTINGS`, or `proctorwatch.json`.
    pub fn path_from_env() -> PathBuf {
        std::env::var(SETTINGS_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_SETTINGS_PATH))
    }

    pub fn from_env() -> Result<Self> {
        let settings = Self::load(&Self::path_from_env())?;
        Ok(settings.with_overrides(|key| std::env::var(key).ok()))
    }

    /// Apply `PROCTORWATCH_*` overrides from `lookup`. Unparseable numbers are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(host) = lookup("PROCTORWATCH_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PROCTORWATCH_PORT").and_then(|v| v.parse().ok()) {
            self.port = port;
        }
        if let Some(path) = lookup("PROCTORWATCH_DB") {
            self.database_path = PathBuf::from(path);
        }
        if let Some(url) = lookup("PROCTORWATCH_EVENT_URL") {
            self.event_service_url = Some(url).filter(|url| !url.trim().is_empty());
        }
        if let Some(max_age) = lookup("PROCTORWATCH_FEED_MAX_AGE_MS").and_then(|v| v.parse().ok()) {
            self.feed_max_age_ms = max_age;
        }
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn feed_max_age(&self) -> Duration {
        Duration::from_millis(self.feed_max_age_ms)
    }
}

/// Shared, persisted settings. Only the detection defaults change at runtime.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<Settings>,
    /// Serializes file writes so the file always holds the latest update.
    writer: tokio::sync::Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: PathBuf, settings: Settings) -> Self {
        Self {
            path,
            data: RwLock::new(settings),
            writer: tokio::sync::Mutex::new(()),
        }
    }

    pub fn settings(&self) -> Settings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn detection(&self) -> DetectionConfig {
        self.settings().detection
    }

    /// Validate and store new detection defaults, then write the settings file.
    pub async fn update_detection(&self, config: DetectionConfig) -> Result<DetectionConfig> {
        let config = config.validated().map_err(anyhow::Error::new)?;
        let _writing = self.writer.lock().await;

        // The in-memory lock is released before touching the file.
        let snapshot = {
            let mut guard = match self.data.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.detection = config.clone();
            guard.clone()
        };
        self.persist(&snapshot).await?;
        Ok(config)
    }

    /// Detection defaults with a session's partial overrides applied.
    pub fn session_config(&self, overrides: &serde_json::Value) -> Result<DetectionConfig, ConfigError> {
        self.detection().with_overrides(overrides)?.validated()
    }

    async fn persist(&self, data: &Settings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        tokio::fs::write(&self.path, serialized)
            .await
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
