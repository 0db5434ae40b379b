use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};

use crate::db::Database;
use crate::detection::{ConfigError, DetectionConfig, SignalState};
use crate::events::{DeliveryFailure, EventStore};
use crate::metrics::MetricsSnapshot;
use crate::models::{Alert, MonitorSession, SessionIdentity, SessionStatus};
use crate::perception::{
    FrameSource, ObservationFeed, Perception, RawFaceObservation, RawObjectObservation,
};

use super::controller::{MonitorView, SessionMonitor};

const FAILURE_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("session {0} is already being monitored")]
    AlreadyActive(String),

    #[error("session {0} is not being monitored")]
    NotFound(String),

    #[error("session {0} is not fed by posted observations")]
    NoFeed(String),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

struct ActiveSession {
    monitor: SessionMonitor,
    view: MonitorView,
    /// Present when the session's perception results are posted by a client.
    feed: Option<Arc<ObservationFeed>>,
}

/// A session id is held from the moment a start begins until its stop has closed the row,
/// so a second start with the same id cannot interleave with either.
enum Entry {
    Starting,
    Running(ActiveSession),
    Stopping,
}

type SessionMap = Arc<Mutex<HashMap<String, Entry>>>;

/// Releases a `Starting` or `Stopping` entry if the owning call is dropped before it
/// finishes.
struct Reservation {
    sessions: SessionMap,
    session_id: String,
    armed: bool,
}

impl Reservation {
    fn new(sessions: &SessionMap, session_id: &str) -> Self {
        Self {
            sessions: Arc::clone(sessions),
            session_id: session_id.to_string(),
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let sessions = Arc::clone(&self.sessions);
        let session_id = std::mem::take(&mut self.session_id);
        runtime.spawn(async move {
            let mut sessions = sessions.lock().await;
            if !matches!(sessions.get(&session_id), Some(Entry::Running(_)) | None) {
                sessions.remove(&session_id);
            }
        });
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetrics {
    pub session_id: String,
    pub signal_state: SignalState,
    pub metrics: MetricsSnapshot,
}

/// All sessions monitored by this process, keyed by session id.
#[derive(Clone)]
pub struct MonitorRegistry {
    sessions: SessionMap,
    db: Database,
    store: Arc<dyn EventStore>,
    failures: broadcast::Sender<DeliveryFailure>,
    feed_max_age: Duration,
}

impl MonitorRegistry {
    /// `store` receives events; `db` tracks session lifecycle. They may be the same database.
    pub fn new(db: Database, store: Arc<dyn EventStore>, feed_max_age: Duration) -> Self {
        let (failures, _) = broadcast::channel(FAILURE_CHANNEL_CAPACITY);
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            db,
            store,
            failures,
            feed_max_age,
        }
    }

    pub fn store(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.store)
    }

    pub fn subscribe_failures(&self) -> broadcast::Receiver<DeliveryFailure> {
        self.failures.subscribe()
    }

    /// Mark sessions left running by a previous process as interrupted.
    pub async fn recover_interrupted(&self) -> Result<usize, RegistryError> {
        let running = self.db.get_running_sessions().await?;
        if running.is_empty() {
            return Ok(0);
        }

        let ids: Vec<&str> = running.iter().map(|session| session.id.as_str()).collect();
        let interrupted = self.db.interrupt_running_sessions(Utc::now()).await?;
        warn!(
            "marked {interrupted} session(s) from a previous run as interrupted: {}",
            ids.join(", ")
        );
        Ok(interrupted)
    }

    /// Start a session whose perception results are posted through [`Self::post_faces`]
    /// and [`Self::post_objects`].
    pub async fn start_fed_session(
        &self,
        identity: SessionIdentity,
        config: DetectionConfig,
    ) -> Result<MonitorSession, RegistryError> {
        let feed = Arc::new(ObservationFeed::new(self.feed_max_age));
        let perception: Arc<dyn Perception> = feed.clone();
        let frames: Arc<dyn FrameSource> = feed.clone();
        self.start(identity, config, perception, frames, Some(feed))
            .await
    }

    /// Start a session driven by host-provided perception and frames.
    pub async fn start_session(
        &self,
        identity: SessionIdentity,
        config: DetectionConfig,
        perception: Arc<dyn Perception>,
        frames: Arc<dyn FrameSource>,
    ) -> Result<MonitorSession, RegistryError> {
        self.start(identity, config, perception, frames, None).await
    }

    async fn start(
        &self,
        identity: SessionIdentity,
        config: DetectionConfig,
        perception: Arc<dyn Perception>,
        frames: Arc<dyn FrameSource>,
        feed: Option<Arc<ObservationFeed>>,
    ) -> Result<MonitorSession, RegistryError> {
        let session_id = identity.session_id.clone();
        let config = {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(&session_id) {
                return Err(RegistryError::AlreadyActive(session_id));
            }

            // Reject bad tunables before anything is recorded.
            let config = config.validated()?;
            sessions.insert(session_id.clone(), Entry::Starting);
            config
        };
        let reservation = Reservation::new(&self.sessions, &session_id);

        let launched = self.launch(identity, config, perception, frames).await;

        let mut sessions = self.sessions.lock().await;
        let result = match launched {
            Ok((session, monitor)) => {
                let view = monitor.view();
                sessions.insert(
                    session_id,
                    Entry::Running(ActiveSession {
                        monitor,
                        view,
                        feed,
                    }),
                );
                Ok(session)
            }
            Err(err) => {
                sessions.remove(&session_id);
                Err(err)
            }
        };
        reservation.disarm();
        result
    }

    async fn launch(
        &self,
        identity: SessionIdentity,
        config: DetectionConfig,
        perception: Arc<dyn Perception>,
        frames: Arc<dyn FrameSource>,
    ) -> Result<(MonitorSession, SessionMonitor), RegistryError> {
        let session = MonitorSession::started(&identity, Utc::now());
        self.db.insert_session(&session).await?;

        let monitor = SessionMonitor::start(
            identity,
            config,
            perception,
            frames,
            Arc::clone(&self.store),
            self.failures.clone(),
        )?;
        Ok((session, monitor))
    }

    /// Stop a session and mark it completed. The id stays taken until the row is closed.
    pub async fn stop_session(&self, session_id: &str) -> Result<MonitorSession, RegistryError> {
        let active = {
            let mut sessions = self.sessions.lock().await;
            match sessions.remove(session_id) {
                Some(Entry::Running(active)) => {
                    sessions.insert(session_id.to_string(), Entry::Stopping);
                    active
                }
                Some(other) => {
                    sessions.insert(session_id.to_string(), other);
                    return Err(RegistryError::NotFound(session_id.to_string()));
                }
                None => return Err(RegistryError::NotFound(session_id.to_string())),
            }
        };
        let reservation = Reservation::new(&self.sessions, session_id);

        let result = self.finish(session_id, active.monitor).await;

        self.sessions.lock().await.remove(session_id);
        reservation.disarm();
        result
    }

    async fn finish(
        &self,
        session_id: &str,
        monitor: SessionMonitor,
    ) -> Result<MonitorSession, RegistryError> {
        monitor.stop().await?;

        let stopped_at = Utc::now();
        self.db
            .mark_session_status(session_id, SessionStatus::Completed, Some(stopped_at), stopped_at)
            .await?;

        self.db
            .get_session(session_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(session_id.to_string()))
    }

    /// Stop every active session. Used at process shutdown.
    pub async fn stop_all(&self) {
        let ids: Vec<String> = self
            .sessions
            .lock()
            .await
            .iter()
            .filter(|(_, entry)| matches!(entry, Entry::Running(_)))
            .map(|(id, _)| id.clone())
            .collect();
        for id in ids {
            if let Err(err) = self.stop_session(&id).await {
                warn!("failed to stop session {id}: {err}");
            }
        }
        info!("all monitored sessions stopped");
    }

    pub async fn active_sessions(&self) -> Vec<SessionIdentity> {
        self.sessions
            .lock()
            .await
            .values()
            .filter_map(|entry| match entry {
                Entry::Running(active) => Some(active.monitor.identity().clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn post_faces(
        &self,
        session_id: &str,
        width: u32,
        height: u32,
        observation: RawFaceObservation,
    ) -> Result<(), RegistryError> {
        self.feed(session_id).await?.post_faces(width, height, observation);
        Ok(())
    }

    pub async fn post_objects(
        &self,
        session_id: &str,
        observation: RawObjectObservation,
    ) -> Result<(), RegistryError> {
        self.feed(session_id).await?.post_objects(observation);
        Ok(())
    }

    pub async fn alerts(&self, session_id: &str) -> Result<Vec<Alert>, RegistryError> {
        Ok(self.view(session_id).await?.alerts())
    }

    pub async fn metrics(&self, session_id: &str) -> Result<SessionMetrics, RegistryError> {
        let view = self.view(session_id).await?;
        Ok(SessionMetrics {
            session_id: session_id.to_string(),
            signal_state: view.signal_state().await,
            metrics: view.metrics().await,
        })
    }

    async fn view(&self, session_id: &str) -> Result<MonitorView, RegistryError> {
        match self.sessions.lock().await.get(session_id) {
            Some(Entry::Running(active)) => Ok(active.view.clone()),
            _ => Err(RegistryError::NotFound(session_id.to_string())),
        }
    }

    async fn feed(&self, session_id: &str) -> Result<Arc<ObservationFeed>, RegistryError> {
        match self.sessions.lock().await.get(session_id) {
            Some(Entry::Running(active)) => active
                .feed
                .clone()
                .ok_or_else(|| RegistryError::NoFeed(session_id.to_string())),
            _ => Err(RegistryError::NotFound(session_id.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;
    use crate::perception::{DetectedObject, Frame};

    async fn registry(dir: &tempfile::TempDir) -> MonitorRegistry {
        let db = Database::new(dir.path().join("registry.db")).unwrap();
        let store: Arc<dyn EventStore> = Arc::new(db.clone());
        MonitorRegistry::new(db, store, Duration::from_secs(2))
    }

    fn identity(id: &str) -> SessionIdentity {
        SessionIdentity {
            session_id: id.into(),
            subject_label: "Ada".into(),
        }
    }

    fn fast_config() -> DetectionConfig {
        DetectionConfig {
            tick_period_ms: 10,
            object_tick_period_ms: 20,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_and_unknown_sessions() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir).await;

        registry
            .start_fed_session(identity("dup"), fast_config())
            .await
            .unwrap();
        let again = registry.start_fed_session(identity("dup"), fast_config()).await;
        assert!(matches!(again, Err(RegistryError::AlreadyActive(id)) if id == "dup"));

        assert!(matches!(
            registry.stop_session("ghost").await,
            Err(RegistryError::NotFound(_))
        ));
        assert!(matches!(
            registry.alerts("ghost").await,
            Err(RegistryError::NotFound(_))
        ));

        registry.stop_all().await;
        assert!(registry.active_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn invalid_config_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir).await;

        let bad = DetectionConfig {
            gaze_offset_fraction: 3.0,
            ..Default::default()
        };
        let result = registry.start_fed_session(identity("bad"), bad).await;
        assert!(matches!(result, Err(RegistryError::InvalidConfig(_))));
        assert!(registry.db.get_session("bad").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn posted_objects_become_persisted_events() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir).await;

        let session = registry
            .start_fed_session(identity("fed"), fast_config())
            .await
            .unwrap();
        assert_eq!(session.status, SessionStatus::Running);

        registry
            .post_objects(
                "fed",
                RawObjectObservation {
                    objects: vec![DetectedObject {
                        class: "Cell Phone".into(),
                        score: Some(0.5),
                        confidence: None,
                    }],
                },
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(150)).await;
        let alerts = registry.alerts("fed").await.unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "Object: cell phone (0.5)");

        let stopped = registry.stop_session("fed").await.unwrap();
        assert_eq!(stopped.status, SessionStatus::Completed);
        assert!(stopped.stopped_at.is_some());

        let events = registry.store().list("fed").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ObjectDetected);
    }

    #[tokio::test]
    async fn host_driven_sessions_have_no_feed() {
        struct Idle;
        impl Perception for Idle {
            fn detect_faces(
                &self,
                _frame: &Frame,
                _opts: &crate::perception::FaceDetectOptions,
            ) -> anyhow::Result<RawFaceObservation> {
                Ok(RawFaceObservation::default())
            }
            fn detect_objects(&self, _frame: &Frame) -> anyhow::Result<RawObjectObservation> {
                Ok(RawObjectObservation::default())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir).await;
        let frames = Arc::new(crate::perception::FrameSlot::new());
        frames.push_image(image::DynamicImage::new_rgb8(64, 48));

        registry
            .start_session(identity("host"), fast_config(), Arc::new(Idle), frames)
            .await
            .unwrap();

        let posted = registry
            .post_faces("host", 64, 48, RawFaceObservation::default())
            .await;
        assert!(matches!(posted, Err(RegistryError::NoFeed(_))));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let metrics = registry.metrics("host").await.unwrap();
        assert!(metrics.metrics.counters.face_ticks > 0);

        registry.stop_session("host").await.unwrap();
    }

    /// Database-backed store whose writes take `delay`.
    struct SlowStore {
        db: Database,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl EventStore for SlowStore {
        async fn append(&self, event: &crate::models::IntegrityEvent) -> anyhow::Result<()> {
            tokio::time::sleep(self.delay).await;
            self.db.append(event).await
        }

        async fn list(&self, session_id: &str) -> anyhow::Result<Vec<crate::models::IntegrityEvent>> {
            self.db.list(session_id).await
        }
    }

    fn slow_registry(dir: &tempfile::TempDir, delay: Duration) -> MonitorRegistry {
        let db = Database::new(dir.path().join("slow.db")).unwrap();
        let store: Arc<dyn EventStore> = Arc::new(SlowStore {
            db: db.clone(),
            delay,
        });
        MonitorRegistry::new(db, store, Duration::from_secs(2))
    }

    fn book() -> RawObjectObservation {
        RawObjectObservation {
            objects: vec![DetectedObject {
                class: "book".into(),
                score: Some(0.9),
                confidence: None,
            }],
        }
    }

    #[tokio::test]
    async fn id_stays_taken_until_stop_has_closed_the_row() {
        let dir = tempfile::tempdir().unwrap();
        let registry = slow_registry(&dir, Duration::from_millis(600));

        registry
            .start_fed_session(identity("same"), fast_config())
            .await
            .unwrap();
        registry.post_objects("same", book()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        // The stop waits on the slow write of the book event.
        let stopping = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.stop_session("same").await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let restart = registry.start_fed_session(identity("same"), fast_config()).await;
        assert!(matches!(restart, Err(RegistryError::AlreadyActive(_))));
        assert!(registry.active_sessions().await.is_empty());
        assert!(matches!(
            registry.alerts("same").await,
            Err(RegistryError::NotFound(_))
        ));

        let stopped = stopping.await.unwrap().unwrap();
        assert_eq!(stopped.status, SessionStatus::Completed);

        // Once the row is closed, the id is free and the new row stays Running.
        registry
            .start_fed_session(identity("same"), fast_config())
            .await
            .unwrap();
        let row = registry.db.get_session("same").await.unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Running);
        assert_eq!(registry.active_sessions().await.len(), 1);

        registry.stop_session("same").await.unwrap();
        let row = registry.db.get_session("same").await.unwrap().unwrap();
        assert_eq!(row.status, SessionStatus::Completed);
    }

    #[tokio::test]
    async fn other_sessions_stay_responsive_while_one_stops() {
        let dir = tempfile::tempdir().unwrap();
        let registry = slow_registry(&dir, Duration::from_millis(600));

        registry
            .start_fed_session(identity("slow"), fast_config())
            .await
            .unwrap();
        registry
            .start_fed_session(identity("other"), fast_config())
            .await
            .unwrap();
        registry.post_objects("slow", book()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;

        let stopping = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.stop_session("slow").await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;

        let quick = Duration::from_millis(400);
        tokio::time::timeout(quick, registry.post_objects("other", RawObjectObservation::default()))
            .await
            .expect("posting to another session blocked")
            .unwrap();
        tokio::time::timeout(quick, registry.metrics("other"))
            .await
            .expect("metrics for another session blocked")
            .unwrap();
        tokio::time::timeout(quick, registry.start_fed_session(identity("third"), fast_config()))
            .await
            .expect("starting another session blocked")
            .unwrap();

        stopping.await.unwrap().unwrap();
        registry.stop_all().await;
        assert!(registry.active_sessions().await.is_empty());
    }

    #[tokio::test]
    async fn recovery_interrupts_sessions_left_running() {
        let dir = tempfile::tempdir().unwrap();
        let registry = registry(&dir).await;
        registry
            .db
            .insert_session(&MonitorSession::started(&identity("old"), Utc::now()))
            .await
            .unwrap();

        assert_eq!(registry.recover_interrupted().await.unwrap(), 1);
        let session = registry.db.get_session("old").await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::Interrupted);
    }
}
