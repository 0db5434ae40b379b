use std::sync::Arc;
use std::time::Instant as StdInstant;

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Duration, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::detection::DebounceEngine;
use crate::events::EventDispatcher;
use crate::metrics::{MonitorMetrics, TickKind, TickOutcome, TickSample};
use crate::models::IntegrityEvent;
use crate::perception::{
    FaceDetectOptions, Frame, FrameSource, Perception, RawFaceObservation, RawObjectObservation,
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Everything a detection loop needs. Both loops of a session share the engine.
#[derive(Clone)]
pub(super) struct LoopContext {
    pub session_id: String,
    pub engine: Arc<Mutex<DebounceEngine>>,
    pub perception: Arc<dyn Perception>,
    pub frames: Arc<dyn FrameSource>,
    pub dispatcher: EventDispatcher,
    pub metrics: MonitorMetrics,
    pub cancel_token: CancellationToken,
}

/// A perception call running on the blocking pool.
struct InFlight<T> {
    handle: JoinHandle<Result<T>>,
    started: StdInstant,
}

impl<T: Send + 'static> InFlight<T> {
    fn spawn(call: impl FnOnce() -> Result<T> + Send + 'static) -> Self {
        Self {
            handle: tokio::task::spawn_blocking(call),
            started: StdInstant::now(),
        }
    }
}

/// Ticks never wait on perception. A tick that finds the previous call still running is
/// skipped; the call's result is applied whenever it lands.
pub(super) async fn face_loop(ctx: LoopContext, period: Duration, opts: FaceDetectOptions) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: Option<InFlight<(Frame, RawFaceObservation)>> = None;

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel_token.cancelled() => break,

            (result, elapsed_ms) = completion(&mut in_flight) => {
                in_flight = None;
                let at = Utc::now();
                let (outcome, events) = {
                    let mut engine = ctx.engine.lock().await;
                    match result {
                        Ok((frame, observation)) => (
                            TickOutcome::Evaluated,
                            engine.process_faces(&observation, &frame, at),
                        ),
                        Err(err) => {
                            log_warn!("face tick failed for session {}: {err:#}", ctx.session_id);
                            (TickOutcome::Failed, engine.on_face_failure(at))
                        }
                    }
                };

                record(&ctx, at, TickKind::Face, outcome, Some(elapsed_ms), events.len()).await;
                publish(&ctx, events).await;
            }

            _ = ticker.tick() => {
                if in_flight.is_some() {
                    record(&ctx, Utc::now(), TickKind::Face, TickOutcome::Skipped, None, 0).await;
                    log_debug!("face tick skipped for session {}: perception still busy", ctx.session_id);
                    continue;
                }

                let perception = Arc::clone(&ctx.perception);
                let frames = Arc::clone(&ctx.frames);
                in_flight = Some(InFlight::spawn(move || {
                    let frame = frames.latest_frame()?;
                    let observation = perception.detect_faces(&frame, &opts)?;
                    Ok((frame, observation))
                }));
            }
        }
    }

    // A blocking call cannot be interrupted; dropping the handle detaches it.
    drop(in_flight);
    log_info!("face loop stopped for session {}", ctx.session_id);
}

pub(super) async fn object_loop(ctx: LoopContext, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight: Option<InFlight<RawObjectObservation>> = None;

    loop {
        tokio::select! {
            biased;

            _ = ctx.cancel_token.cancelled() => break,

            (result, elapsed_ms) = completion(&mut in_flight) => {
                in_flight = None;
                let at = Utc::now();
                let (outcome, events) = match result {
                    Ok(observation) => {
                        let mut engine = ctx.engine.lock().await;
                        (TickOutcome::Evaluated, engine.process_objects(&observation, at))
                    }
                    Err(err) => {
                        log_warn!("object tick failed for session {}: {err:#}", ctx.session_id);
                        (TickOutcome::Failed, Vec::new())
                    }
                };

                record(&ctx, at, TickKind::Object, outcome, Some(elapsed_ms), events.len()).await;
                publish(&ctx, events).await;
            }

            _ = ticker.tick() => {
                if in_flight.is_some() {
                    record(&ctx, Utc::now(), TickKind::Object, TickOutcome::Skipped, None, 0).await;
                    log_debug!("object tick skipped for session {}: perception still busy", ctx.session_id);
                    continue;
                }

                let perception = Arc::clone(&ctx.perception);
                let frames = Arc::clone(&ctx.frames);
                in_flight = Some(InFlight::spawn(move || {
                    let frame = frames.latest_frame()?;
                    perception.detect_objects(&frame)
                }));
            }
        }
    }

    drop(in_flight);
    log_info!("object loop stopped for session {}", ctx.session_id);
}

/// Resolves when the in-flight call finishes; pending forever when there is none.
async fn completion<T>(in_flight: &mut Option<InFlight<T>>) -> (Result<T>, u64) {
    match in_flight {
        Some(call) => {
            let joined = (&mut call.handle).await;
            let elapsed_ms = call.started.elapsed().as_millis() as u64;
            let result = joined
                .map_err(|err| anyhow!("perception task panicked: {err}"))
                .and_then(|inner| inner);
            (result, elapsed_ms)
        }
        None => std::future::pending().await,
    }
}

async fn record(
    ctx: &LoopContext,
    timestamp: DateTime<Utc>,
    kind: TickKind,
    outcome: TickOutcome,
    perception_ms: Option<u64>,
    events_emitted: usize,
) {
    ctx.metrics
        .record_tick(TickSample {
            timestamp,
            kind,
            outcome,
            perception_ms,
            events_emitted,
        })
        .await;
}

async fn publish(ctx: &LoopContext, events: Vec<IntegrityEvent>) {
    if events.is_empty() {
        return;
    }
    for event in &events {
        log_info!(
            "session {} emitted {} {}",
            ctx.session_id,
            event.event_type,
            serde_json::to_string(&event.details).unwrap_or_default()
        );
    }
    ctx.dispatcher.publish(events).await;
}
