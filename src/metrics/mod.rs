mod types;

pub use types::{
    MetricsSnapshot, MonitorCounters, SystemMetrics, TickKind, TickOutcome, TickSample,
};

use std::collections::VecDeque;
use std::sync::Arc;

use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_TICKS: usize = 20;

/// Per-session counters plus a short history of tick samples.
#[derive(Clone)]
pub struct MonitorMetrics {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    counters: MonitorCounters,
    recent_ticks: VecDeque<TickSample>,
    system: System,
    pid: Pid,
}

impl MonitorMetrics {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes; take the baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                counters: MonitorCounters::default(),
                recent_ticks: VecDeque::with_capacity(MAX_RECENT_TICKS),
                system,
                pid,
            })),
        }
    }

    pub async fn record_tick(&self, sample: TickSample) {
        let mut state = self.inner.lock().await;

        match sample.kind {
            TickKind::Face => state.counters.face_ticks += 1,
            TickKind::Object => state.counters.object_ticks += 1,
        }
        match sample.outcome {
            TickOutcome::Skipped => state.counters.skipped_ticks += 1,
            TickOutcome::Failed => state.counters.perception_failures += 1,
            TickOutcome::Evaluated => {}
        }
        state.counters.events_emitted += sample.events_emitted as u64;

        state.recent_ticks.push_back(sample);
        if state.recent_ticks.len() > MAX_RECENT_TICKS {
            state.recent_ticks.pop_front();
        }
    }

    pub async fn record_delivered(&self) {
        self.inner.lock().await.counters.events_delivered += 1;
    }

    pub async fn record_delivery_failure(&self) {
        self.inner.lock().await.counters.delivery_failures += 1;
    }

    pub async fn record_dropped(&self) {
        self.inner.lock().await.counters.events_dropped += 1;
    }

    pub async fn counters(&self) -> MonitorCounters {
        self.inner.lock().await.counters.clone()
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let pid = state.pid;

        state.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        let system = state
            .system
            .process(pid)
            .map(|process| SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            })
            .unwrap_or_default();

        MetricsSnapshot {
            system,
            counters: state.counters.clone(),
            recent_ticks: state.recent_ticks.iter().cloned().collect(),
        }
    }
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample(kind: TickKind, outcome: TickOutcome, events_emitted: usize) -> TickSample {
        TickSample {
            timestamp: Utc::now(),
            kind,
            outcome,
            perception_ms: None,
            events_emitted,
        }
    }

    #[tokio::test]
    async fn counts_ticks_by_kind_and_outcome() {
        let metrics = MonitorMetrics::new();
        metrics.record_tick(sample(TickKind::Face, TickOutcome::Evaluated, 2)).await;
        metrics.record_tick(sample(TickKind::Face, TickOutcome::Skipped, 0)).await;
        metrics.record_tick(sample(TickKind::Object, TickOutcome::Failed, 0)).await;
        metrics.record_delivered().await;
        metrics.record_dropped().await;

        let counters = metrics.counters().await;
        assert_eq!(counters.face_ticks, 2);
        assert_eq!(counters.object_ticks, 1);
        assert_eq!(counters.skipped_ticks, 1);
        assert_eq!(counters.perception_failures, 1);
        assert_eq!(counters.events_emitted, 2);
        assert_eq!(counters.events_delivered, 1);
        assert_eq!(counters.events_dropped, 1);
    }

    #[tokio::test]
    async fn keeps_only_recent_ticks() {
        let metrics = MonitorMetrics::new();
        for _ in 0..(MAX_RECENT_TICKS + 5) {
            metrics.record_tick(sample(TickKind::Face, TickOutcome::Evaluated, 0)).await;
        }

        let snapshot = metrics.get_snapshot().await;
        assert_eq!(snapshot.recent_ticks.len(), MAX_RECENT_TICKS);
        assert_eq!(snapshot.counters.face_ticks, (MAX_RECENT_TICKS + 5) as u64);
    }
}
