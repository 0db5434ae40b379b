use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TickKind {
    Face,
    Object,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TickOutcome {
    Evaluated,
    /// Previous perception call was still in flight
    Skipped,
    /// Frame source or perception call failed
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickSample {
    pub timestamp: DateTime<Utc>,
    pub kind: TickKind,
    pub outcome: TickOutcome,
    pub perception_ms: Option<u64>,
    pub events_emitted: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f32,
    pub memory_mb: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MonitorCounters {
    pub face_ticks: u64,
    pub object_ticks: u64,
    pub skipped_ticks: u64,
    pub perception_failures: u64,
    pub events_emitted: u64,
    pub events_delivered: u64,
    pub delivery_failures: u64,
    pub events_dropped: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub system: SystemMetrics,
    pub counters: MonitorCounters,
    pub recent_ticks: Vec<TickSample>,
}
