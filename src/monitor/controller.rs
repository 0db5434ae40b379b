use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::detection::{ConfigError, DebounceEngine, DetectionConfig, SignalState};
use crate::events::{AlertSurface, DeliveryFailure, EventDispatcher, EventStore};
use crate::metrics::{MetricsSnapshot, MonitorMetrics};
use crate::models::{Alert, SessionIdentity};
use crate::perception::{FrameSource, Perception};

use super::loop_worker::{face_loop, object_loop, LoopContext};

const PERSISTENCE_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared read access to a running monitor's state. Cloning is cheap, and reading through a
/// view never touches the loops' lifecycle.
#[derive(Clone)]
pub struct MonitorView {
    engine: Arc<Mutex<DebounceEngine>>,
    alerts: AlertSurface,
    metrics: MonitorMetrics,
}

impl MonitorView {
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts.list()
    }

    pub async fn signal_state(&self) -> SignalState {
        self.engine.lock().await.state()
    }

    pub async fn metrics(&self) -> MetricsSnapshot {
        self.metrics.get_snapshot().await
    }
}

/// One monitored session: a debounce engine driven by a face loop and an object loop.
pub struct SessionMonitor {
    identity: SessionIdentity,
    view: MonitorView,
    cancel_token: CancellationToken,
    loops: Vec<JoinHandle<()>>,
    dispatcher: Option<EventDispatcher>,
    persistence: Option<JoinHandle<()>>,
}

impl SessionMonitor {
    /// Validate `config` and start both loops. Must be called inside a tokio runtime.
    pub fn start(
        identity: SessionIdentity,
        config: DetectionConfig,
        perception: Arc<dyn Perception>,
        frames: Arc<dyn FrameSource>,
        store: Arc<dyn EventStore>,
        failures: broadcast::Sender<DeliveryFailure>,
    ) -> Result<Self, ConfigError> {
        let engine = DebounceEngine::new(identity.clone(), config)?;
        let config = engine.config().clone();
        let engine = Arc::new(Mutex::new(engine));

        let alerts = AlertSurface::new(config.alert_capacity);
        let metrics = MonitorMetrics::new();
        let (dispatcher, persistence) = EventDispatcher::spawn(
            &identity.session_id,
            store,
            config.persistence_queue_capacity,
            alerts.clone(),
            metrics.clone(),
            failures,
        );

        let cancel_token = CancellationToken::new();
        let ctx = LoopContext {
            session_id: identity.session_id.clone(),
            engine: Arc::clone(&engine),
            perception,
            frames,
            dispatcher: dispatcher.clone(),
            metrics: metrics.clone(),
            cancel_token: cancel_token.clone(),
        };

        let loops = vec![
            tokio::spawn(face_loop(
                ctx.clone(),
                config.tick_period(),
                config.face_detect_options(),
            )),
            tokio::spawn(object_loop(ctx, config.object_tick_period())),
        ];

        info!(
            "monitoring session {} ({}) every {}ms / {}ms",
            identity.session_id,
            identity.subject_label,
            config.tick_period_ms,
            config.object_tick_period_ms
        );

        Ok(Self {
            identity,
            view: MonitorView {
                engine,
                alerts,
                metrics,
            },
            cancel_token,
            loops,
            dispatcher: Some(dispatcher),
            persistence: Some(persistence),
        })
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn view(&self) -> MonitorView {
        self.view.clone()
    }

    /// Stop both loops and wait for them. No event is emitted once this returns.
    /// Events already queued get a bounded window to reach the store.
    pub async fn stop(mut self) -> Result<()> {
        self.cancel_token.cancel();

        let mut first_err = None;
        for handle in self.loops.drain(..) {
            if let Err(err) = handle.await.context("detection loop task failed to join") {
                first_err.get_or_insert(err);
            }
        }

        // The worker exits once the last dispatcher clone is gone.
        self.dispatcher.take();
        if let Some(worker) = self.persistence.take() {
            match tokio::time::timeout(PERSISTENCE_DRAIN_TIMEOUT, worker).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(
                    "persistence worker for session {} failed: {err}",
                    self.identity.session_id
                ),
                Err(_) => warn!(
                    "persistence for session {} still draining after {}s; detaching",
                    self.identity.session_id,
                    PERSISTENCE_DRAIN_TIMEOUT.as_secs()
                ),
            }
        }

        info!("stopped monitoring session {}", self.identity.session_id);
        first_err.map_or(Ok(()), Err)
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        // Loops must not outlive an abandoned monitor.
        self.cancel_token.cancel();
    }
}
