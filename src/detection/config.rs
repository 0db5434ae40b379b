use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::perception::FaceDetectOptions;

/// Rejected detection tunables. Raised at session creation; an engine never starts with one.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    NonPositivePeriod { field: &'static str },

    #[error("{field} must be a positive, finite number of seconds (got {value})")]
    InvalidThreshold { field: &'static str, value: f64 },

    #[error("{field} must be within [0, 1] (got {value})")]
    FractionOutOfRange { field: &'static str, value: f64 },

    #[error("multiFaceConfirmFrames must be at least 1")]
    ZeroConfirmFrames,

    #[error("{field} must be at least 1")]
    ZeroCapacity { field: &'static str },

    #[error("flaggedObjects must name at least one class")]
    EmptyFlaggedSet,

    #[error("invalid configuration: {0}")]
    Malformed(String),
}

/// Tunables for one monitored session.
///
/// Periods are in milliseconds, thresholds in seconds. Defaults are the values the
/// interview front-end shipped with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionConfig {
    /// Fast tick driving face evaluation
    pub tick_period_ms: u64,
    /// Slow tick driving object evaluation
    pub object_tick_period_ms: u64,

    pub no_face_threshold_secs: f64,
    pub look_away_threshold_secs: f64,

    /// Face filters: candidates below either are not "good faces"
    pub min_face_confidence: f64,
    pub min_face_area_fraction: f64,

    /// Normalised horizontal offset of the primary face beyond which the subject is looking away
    pub gaze_offset_fraction: f64,

    /// Consecutive multi-face ticks needed before `multiple_faces` fires
    pub multi_face_confirm_frames: u32,

    pub object_confidence_floor: f64,
    pub flagged_objects: BTreeSet<String>,

    pub max_faces: u32,
    pub alert_capacity: usize,
    pub persistence_queue_capacity: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            tick_period_ms: 300,
            object_tick_period_ms: 5_000,
            no_face_threshold_secs: 10.0,
            look_away_threshold_secs: 5.0,
            min_face_confidence: 0.45,
            min_face_area_fraction: 0.03,
            gaze_offset_fraction: 0.45,
            multi_face_confirm_frames: 3,
            object_confidence_floor: 0.35,
            flagged_objects: ["cell phone", "cellphone", "phone", "laptop", "book", "keyboard", "remote"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_faces: 2,
            alert_capacity: 6,
            persistence_queue_capacity: 256,
        }
    }
}

impl DetectionConfig {
    pub fn tick_period(&self) -> Duration {
        Duration::from_millis(self.tick_period_ms)
    }

    pub fn object_tick_period(&self) -> Duration {
        Duration::from_millis(self.object_tick_period_ms)
    }

    pub fn no_face_threshold(&self) -> Result<Duration, ConfigError> {
        seconds("noFaceThresholdSecs", self.no_face_threshold_secs)
    }

    pub fn look_away_threshold(&self) -> Result<Duration, ConfigError> {
        seconds("lookAwayThresholdSecs", self.look_away_threshold_secs)
    }

    pub fn face_detect_options(&self) -> FaceDetectOptions {
        FaceDetectOptions {
            flip_horizontal: false,
            max_faces: self.max_faces,
        }
    }

    /// Normalise flagged class labels (trimmed, lower-case) and validate every tunable.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        self.flagged_objects = self
            .flagged_objects
            .iter()
            .map(|label| label.trim().to_lowercase())
            .filter(|label| !label.is_empty())
            .collect();
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_period_ms == 0 {
            return Err(ConfigError::NonPositivePeriod { field: "tickPeriodMs" });
        }
        if self.object_tick_period_ms == 0 {
            return Err(ConfigError::NonPositivePeriod {
                field: "objectTickPeriodMs",
            });
        }

        self.no_face_threshold()?;
        self.look_away_threshold()?;

        fraction("minFaceConfidence", self.min_face_confidence)?;
        fraction("minFaceAreaFraction", self.min_face_area_fraction)?;
        fraction("gazeOffsetFraction", self.gaze_offset_fraction)?;
        fraction("objectConfidenceFloor", self.object_confidence_floor)?;

        if self.multi_face_confirm_frames == 0 {
            return Err(ConfigError::ZeroConfirmFrames);
        }
        if self.max_faces == 0 {
            return Err(ConfigError::ZeroCapacity { field: "maxFaces" });
        }
        if self.alert_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "alertCapacity",
            });
        }
        if self.persistence_queue_capacity == 0 {
            return Err(ConfigError::ZeroCapacity {
                field: "persistenceQueueCapacity",
            });
        }
        if self.flagged_objects.iter().all(|label| label.trim().is_empty()) {
            return Err(ConfigError::EmptyFlaggedSet);
        }

        Ok(())
    }

    /// Apply a partial camelCase JSON object on top of this config. Unknown keys are ignored.
    pub fn with_overrides(&self, overrides: &serde_json::Value) -> Result<Self, ConfigError> {
        let mut merged =
            serde_json::to_value(self).map_err(|err| ConfigError::Malformed(err.to_string()))?;

        match (merged.as_object_mut(), overrides) {
            (Some(base), serde_json::Value::Object(patch)) => {
                for (key, value) in patch {
                    base.insert(key.clone(), value.clone());
                }
            }
            (_, serde_json::Value::Null) => {}
            _ => {
                return Err(ConfigError::Malformed(
                    "configuration overrides must be a JSON object".into(),
                ))
            }
        }

        serde_json::from_value(merged).map_err(|err| ConfigError::Malformed(err.to_string()))
    }
}

fn seconds(field: &'static str, value: f64) -> Result<Duration, ConfigError> {
    if value.is_nan() || value <= 0.0 {
        return Err(ConfigError::InvalidThreshold { field, value });
    }
    Duration::try_from_secs_f64(value).map_err(|_| ConfigError::InvalidThreshold { field, value })
}

fn fraction(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::FractionOutOfRange { field, value })
    }
}
