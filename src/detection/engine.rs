//! Debounce / hysteresis state machine.
//!
//! One engine per session. Face ticks drive three counters; object ticks are stateless.
//! Every counter grows by one on a qualifying tick, resets on a disqualifying tick, and
//! resets again when it fires, so a continuous condition must build up from zero before
//! it can fire a second time.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::config::{ConfigError, DetectionConfig};
use super::face::{evaluate_faces, FaceSignals};
use super::objects::{evaluate_objects, FlaggedObject};
use crate::models::{IntegrityEvent, SessionIdentity};
use crate::perception::{Frame, RawFaceObservation, RawObjectObservation};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalState {
    pub no_face_ticks: u32,
    pub look_away_ticks: u32,
    pub multi_face_ticks: u32,
    pub last_raw_face_count: usize,
}

pub struct DebounceEngine {
    identity: SessionIdentity,
    config: DetectionConfig,
    tick_period: Duration,
    no_face_threshold: Duration,
    look_away_threshold: Duration,
    state: SignalState,
    /// Capture time of the last frame whose faces were evaluated
    last_face_frame: Option<DateTime<Utc>>,
}

impl DebounceEngine {
    pub fn new(identity: SessionIdentity, config: DetectionConfig) -> Result<Self, ConfigError> {
        let config = config.validated()?;
        Ok(Self {
            identity,
            tick_period: config.tick_period(),
            no_face_threshold: config.no_face_threshold()?,
            look_away_threshold: config.look_away_threshold()?,
            config,
            state: SignalState::default(),
            last_face_frame: None,
        })
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    pub fn state(&self) -> SignalState {
        self.state
    }

    /// Evaluate a face observation and advance the face counters.
    ///
    /// A frame seen before (same capture time) is not new evidence of a second person: the
    /// multi-face counter holds instead of advancing. Absence and gaze are durations and
    /// keep counting.
    pub fn process_faces(
        &mut self,
        observation: &RawFaceObservation,
        frame: &Frame,
        at: DateTime<Utc>,
    ) -> Vec<IntegrityEvent> {
        let signals = evaluate_faces(observation, frame.width, frame.height, &self.config);
        let repeated = self.last_face_frame == Some(frame.captured_at);
        self.last_face_frame = Some(frame.captured_at);
        self.advance_faces(&signals, !repeated, at)
    }

    /// Evaluate an object observation. Objects have no history; each qualifying one emits.
    pub fn process_objects(
        &mut self,
        observation: &RawObjectObservation,
        at: DateTime<Utc>,
    ) -> Vec<IntegrityEvent> {
        let flagged = evaluate_objects(
            observation,
            &self.config.flagged_objects,
            self.config.object_confidence_floor,
        );
        self.on_object_tick(&flagged, at)
    }

    /// One face tick on a new frame. Emission order: multiple_faces, no_face, look_away.
    pub fn on_face_tick(&mut self, signals: &FaceSignals, at: DateTime<Utc>) -> Vec<IntegrityEvent> {
        self.advance_faces(signals, true, at)
    }

    fn advance_faces(
        &mut self,
        signals: &FaceSignals,
        new_frame: bool,
        at: DateTime<Utc>,
    ) -> Vec<IntegrityEvent> {
        let mut emitted = Vec::new();

        if signals.absent {
            self.state.no_face_ticks = self.state.no_face_ticks.saturating_add(1);
        } else {
            self.state.no_face_ticks = 0;
        }

        // A repeated frame leaves the multi-face counter where it was.
        if new_frame {
            if signals.multiple {
                self.state.multi_face_ticks = self.state.multi_face_ticks.saturating_add(1);
                if self.state.multi_face_ticks >= self.config.multi_face_confirm_frames {
                    self.state.multi_face_ticks = 0;
                    emitted.push(IntegrityEvent::multiple_faces(
                        &self.identity,
                        signals.good_count,
                        at,
                    ));
                }
            } else {
                self.state.multi_face_ticks = 0;
            }
        }

        if signals.looking_away {
            self.state.look_away_ticks = self.state.look_away_ticks.saturating_add(1);
        } else {
            self.state.look_away_ticks = 0;
        }

        self.fire_no_face(at, &mut emitted);

        let look_away = self.tick_period * self.state.look_away_ticks;
        if look_away > self.look_away_threshold {
            self.state.look_away_ticks = 0;
            emitted.push(IntegrityEvent::look_away(&self.identity, rounded_secs(look_away), at));
        }

        self.state.last_raw_face_count = signals.raw_count;
        emitted
    }

    /// A face tick whose frame or model call failed. Counts as absent; the look-away and
    /// multi-face counters keep their progress.
    pub fn on_face_failure(&mut self, at: DateTime<Utc>) -> Vec<IntegrityEvent> {
        let mut emitted = Vec::new();
        self.state.no_face_ticks = self.state.no_face_ticks.saturating_add(1);
        self.state.last_raw_face_count = 0;
        self.fire_no_face(at, &mut emitted);
        emitted
    }

    pub fn on_object_tick(&mut self, flagged: &[FlaggedObject], at: DateTime<Utc>) -> Vec<IntegrityEvent> {
        flagged
            .iter()
            .map(|object| {
                IntegrityEvent::object_detected(&self.identity, object.label.clone(), object.confidence, at)
            })
            .collect()
    }

    fn fire_no_face(&mut self, at: DateTime<Utc>, emitted: &mut Vec<IntegrityEvent>) {
        let absent_for = self.tick_period * self.state.no_face_ticks;
        if absent_for > self.no_face_threshold {
            self.state.no_face_ticks = 0;
            emitted.push(IntegrityEvent::no_face(&self.identity, rounded_secs(absent_for), at));
        }
    }
}

fn rounded_secs(duration: Duration) -> u64 {
    duration.as_secs_f64().round() as u64
}
