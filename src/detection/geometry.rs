//! Canonical face geometry.
//!
//! Face models report a candidate as a corner-pair box, an origin+size box or a keypoint
//! cloud. Everything downstream works on [`BoundingBox`]; a candidate with no usable shape
//! normalises to `None` and is treated as undetected.

use serde::Serialize;

use crate::perception::{CornerBox, FaceCandidate, Keypoint};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// Canonical box in frame pixels. Shapes are tried in order: corner pair, origin box,
/// keypoint bound. Negative extents collapse to zero.
pub fn normalize(candidate: &FaceCandidate) -> Option<BoundingBox> {
    if let Some((x1, y1, x2, y2)) = candidate.bounding_box.as_ref().and_then(corners) {
        return Some(BoundingBox {
            left: x1,
            top: y1,
            width: (x2 - x1).max(0.0),
            height: (y2 - y1).max(0.0),
        });
    }

    if let Some([x, y, w, h, ..]) = candidate.origin_box.as_deref() {
        return Some(BoundingBox {
            left: *x,
            top: *y,
            width: w.max(0.0),
            height: h.max(0.0),
        });
    }

    keypoint_bounds(&candidate.keypoints)
}

/// Horizontal center used for gaze. Keypoint clouds use the mean x rather than the
/// middle of their bound, so a turned head shifts the center.
pub fn horizontal_center(candidate: &FaceCandidate) -> Option<f64> {
    if let Some((x1, _, x2, _)) = candidate.bounding_box.as_ref().and_then(corners) {
        return Some((x1 + x2) / 2.0);
    }

    if !candidate.keypoints.is_empty() {
        let sum: f64 = candidate.keypoints.iter().map(|k| k.x).sum();
        return Some(sum / candidate.keypoints.len() as f64);
    }

    match candidate.origin_box.as_deref() {
        Some([x, _, w, ..]) => Some(x + w / 2.0),
        _ => None,
    }
}

/// Model confidence: `score`, falling back to `probability`.
pub fn confidence(candidate: &FaceCandidate) -> Option<f64> {
    candidate.score.or(candidate.probability)
}

fn corners(corner_box: &CornerBox) -> Option<(f64, f64, f64, f64)> {
    match (corner_box.top_left, corner_box.bottom_right) {
        (Some([x1, y1]), Some([x2, y2])) => Some((x1, y1, x2, y2)),
        _ => None,
    }
}

fn keypoint_bounds(keypoints: &[Keypoint]) -> Option<BoundingBox> {
    let first = keypoints.first()?;
    let (mut min_x, mut max_x, mut min_y, mut max_y) = (first.x, first.x, first.y, first.y);
    for point in &keypoints[1..] {
        min_x = min_x.min(point.x);
        max_x = max_x.max(point.x);
        min_y = min_y.min(point.y);
        max_y = max_y.max(point.y);
    }

    Some(BoundingBox {
        left: min_x,
        top: min_y,
        width: (max_x - min_x).max(0.0),
        height: (max_y - min_y).max(0.0),
    })
}
