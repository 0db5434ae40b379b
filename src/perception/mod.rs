//! Boundary with the perception collaborator.
//!
//! The face and object models are not part of this crate. They are reached through the
//! [`Perception`] capability, fed by a [`FrameSource`]. The raw result types mirror what
//! browser-side detectors emit, so client-posted JSON deserializes directly into them.

pub mod feed;
pub mod frame_slot;

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

pub use feed::ObservationFeed;
pub use frame_slot::FrameSlot;

/// One sampled video frame. Pixels are optional: feed-driven sessions only know the
/// dimensions of the frame the client ran its model on.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub captured_at: DateTime<Utc>,
    pub image: Option<Arc<DynamicImage>>,
}

impl Frame {
    pub fn from_image(image: DynamicImage, captured_at: DateTime<Utc>) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            captured_at,
            image: Some(Arc::new(image)),
        }
    }

    pub fn dimensions_only(width: u32, height: u32, captured_at: DateTime<Utc>) -> Self {
        Self {
            width,
            height,
            captured_at,
            image: None,
        }
    }
}

/// Options forwarded to the face model on every call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceDetectOptions {
    pub flip_horizontal: bool,
    pub max_faces: u32,
}

impl Default for FaceDetectOptions {
    fn default() -> Self {
        Self {
            flip_horizontal: false,
            max_faces: 2,
        }
    }
}

/// Corner-pair box as `[x, y]` points.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CornerBox {
    #[serde(default)]
    pub top_left: Option<[f64; 2]>,
    #[serde(default)]
    pub bottom_right: Option<[f64; 2]>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Keypoint {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z: Option<f64>,
}

/// A single face candidate, in whichever shape the model produced.
/// Any combination of the shape fields may be present; see `detection::geometry`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FaceCandidate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_box: Option<CornerBox>,
    /// Origin + size box, `[x, y, width, height]`.
    #[serde(default, rename = "box", skip_serializing_if = "Option::is_none")]
    pub origin_box: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keypoints: Vec<Keypoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawFaceObservation {
    #[serde(default)]
    pub faces: Vec<FaceCandidate>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DetectedObject {
    #[serde(default)]
    pub class: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl DetectedObject {
    /// `score`, then `confidence`, then zero.
    pub fn confidence(&self) -> f64 {
        self.score.or(self.confidence).unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RawObjectObservation {
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
}

/// Face and object models. Calls are blocking and run on the blocking pool.
pub trait Perception: Send + Sync + 'static {
    fn detect_faces(&self, frame: &Frame, opts: &FaceDetectOptions) -> Result<RawFaceObservation>;

    fn detect_objects(&self, frame: &Frame) -> Result<RawObjectObservation>;
}

/// Source of the most recent frame for a session.
pub trait FrameSource: Send + Sync + 'static {
    fn latest_frame(&self) -> Result<Frame>;
}
