use super::config::DetectionConfig;
use super::geometry;
use crate::perception::{FaceCandidate, RawFaceObservation};

/// Conditions derived from one face observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaceSignals {
    /// No candidate of any quality was reported
    pub absent: bool,
    /// More than one good face
    pub multiple: bool,
    pub looking_away: bool,
    pub raw_count: usize,
    pub good_count: usize,
    /// Offset of the primary good face from the frame center, in [0, 1]
    pub gaze_offset: Option<f64>,
}

/// Absence counts every candidate, even low-quality ones; multiplicity and gaze only
/// consider good faces.
pub fn evaluate_faces(
    observation: &RawFaceObservation,
    frame_width: u32,
    frame_height: u32,
    config: &DetectionConfig,
) -> FaceSignals {
    let raw_count = observation.faces.len();
    let frame_area = f64::from(frame_width) * f64::from(frame_height);

    let good_faces: Vec<&FaceCandidate> = observation
        .faces
        .iter()
        .filter(|candidate| is_good_face(candidate, frame_area, config))
        .collect();

    let gaze_offset = good_faces
        .first()
        .and_then(|primary| gaze_offset(primary, frame_width));

    FaceSignals {
        absent: raw_count == 0,
        multiple: good_faces.len() > 1,
        looking_away: gaze_offset.is_some_and(|offset| offset > config.gaze_offset_fraction),
        raw_count,
        good_count: good_faces.len(),
        gaze_offset,
    }
}

fn is_good_face(candidate: &FaceCandidate, frame_area: f64, config: &DetectionConfig) -> bool {
    if frame_area <= 0.0 {
        return false;
    }
    let Some(bbox) = geometry::normalize(candidate) else {
        return false;
    };

    let area_fraction = bbox.area() / frame_area;
    if area_fraction.is_nan() || area_fraction < config.min_face_area_fraction {
        return false;
    }

    match geometry::confidence(candidate) {
        Some(score) => score >= config.min_face_confidence,
        None => true,
    }
}

fn gaze_offset(face: &FaceCandidate, frame_width: u32) -> Option<f64> {
    let frame_center = f64::from(frame_width) / 2.0;
    if frame_center <= 0.0 {
        return None;
    }
    let center = geometry::horizontal_center(face)?;
    let offset = (center - frame_center).abs() / frame_center;
    offset.is_finite().then(|| offset.min(1.0))
}
