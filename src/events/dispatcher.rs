use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use super::alerts::AlertSurface;
use super::store::{DeliveryFailure, EventStore};
use crate::metrics::MonitorMetrics;
use crate::models::IntegrityEvent;
use crate::{log_debug, log_error, log_warn};

const ENABLE_LOGS: bool = true;

/// Fan-out for one session's events: the alert surface is updated inline, persistence is
/// handed to a background worker through a bounded queue. Publishing never waits on the store.
#[derive(Clone)]
pub struct EventDispatcher {
    session_id: Arc<str>,
    queue: mpsc::Sender<IntegrityEvent>,
    alerts: AlertSurface,
    metrics: MonitorMetrics,
}

impl EventDispatcher {
    /// Start the persistence worker. The worker drains the queue and exits once every
    /// clone of the returned dispatcher has been dropped.
    pub fn spawn(
        session_id: &str,
        store: Arc<dyn EventStore>,
        queue_capacity: usize,
        alerts: AlertSurface,
        metrics: MonitorMetrics,
        failures: broadcast::Sender<DeliveryFailure>,
    ) -> (Self, JoinHandle<()>) {
        let (queue, receiver) = mpsc::channel(queue_capacity.max(1));
        let worker = tokio::spawn(persistence_worker(
            receiver,
            store,
            metrics.clone(),
            failures,
        ));

        (
            Self {
                session_id: Arc::from(session_id),
                queue,
                alerts,
                metrics,
            },
            worker,
        )
    }

    pub fn alerts(&self) -> &AlertSurface {
        &self.alerts
    }

    pub async fn publish(&self, events: Vec<IntegrityEvent>) {
        for event in events {
            self.alerts.push(&event);

            match self.queue.try_send(event) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(event)) => {
                    self.metrics.record_dropped().await;
                    log_warn!(
                        "persistence queue full for session {}, dropping {} event",
                        self.session_id,
                        event.event_type
                    );
                }
                Err(mpsc::error::TrySendError::Closed(event)) => {
                    self.metrics.record_dropped().await;
                    log_error!(
                        "persistence worker gone for session {}, dropping {} event",
                        self.session_id,
                        event.event_type
                    );
                }
            }
        }
    }
}

async fn persistence_worker(
    mut receiver: mpsc::Receiver<IntegrityEvent>,
    store: Arc<dyn EventStore>,
    metrics: MonitorMetrics,
    failures: broadcast::Sender<DeliveryFailure>,
) {
    while let Some(event) = receiver.recv().await {
        match store.append(&event).await {
            Ok(()) => {
                metrics.record_delivered().await;
                log_debug!(
                    "persisted {} event for session {}",
                    event.event_type,
                    event.session_id
                );
            }
            Err(err) => {
                metrics.record_delivery_failure().await;
                log_error!(
                    "failed to persist {} event for session {}: {err:#}",
                    event.event_type,
                    event.session_id
                );
                // No subscribers is fine.
                let _ = failures.send(DeliveryFailure {
                    session_id: event.session_id.clone(),
                    event_type: event.event_type,
                    error: format!("{err:#}"),
                    at: Utc::now(),
                });
            }
        }
    }
}
