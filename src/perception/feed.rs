use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use chrono::Utc;

use super::{
    FaceDetectOptions, Frame, FrameSource, Perception, RawFaceObservation, RawObjectObservation,
};

/// Frame size assumed before the client has told us anything.
const DEFAULT_FRAME_WIDTH: u32 = 640;
const DEFAULT_FRAME_HEIGHT: u32 = 480;

struct PostedFaces {
    received_at: Instant,
    observation: RawFaceObservation,
}

struct FeedState {
    frame: Frame,
    faces: Option<PostedFaces>,
    objects: Option<RawObjectObservation>,
}

/// Perception results posted by a client that runs the models itself.
///
/// Face results are served to every tick while younger than `max_age`; after that the
/// face model is considered to have failed. Every tick sees the same frame capture time
/// until the next post, so a replayed result is recognisable. Object results are served once.
pub struct ObservationFeed {
    state: Mutex<FeedState>,
    max_age: Duration,
}

impl ObservationFeed {
    pub fn new(max_age: Duration) -> Self {
        Self {
            state: Mutex::new(FeedState {
                frame: Frame::dimensions_only(DEFAULT_FRAME_WIDTH, DEFAULT_FRAME_HEIGHT, Utc::now()),
                faces: None,
                objects: None,
            }),
            max_age,
        }
    }

    pub fn post_faces(&self, width: u32, height: u32, observation: RawFaceObservation) {
        let mut state = self.lock();
        state.frame = Frame::dimensions_only(width, height, Utc::now());
        state.faces = Some(PostedFaces {
            received_at: Instant::now(),
            observation,
        });
    }

    pub fn post_objects(&self, observation: RawObjectObservation) {
        self.lock().objects = Some(observation);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FeedState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl FrameSource for ObservationFeed {
    fn latest_frame(&self) -> Result<Frame> {
        Ok(self.lock().frame.clone())
    }
}

impl Perception for ObservationFeed {
    fn detect_faces(&self, _frame: &Frame, opts: &FaceDetectOptions) -> Result<RawFaceObservation> {
        let state = self.lock();
        match &state.faces {
            Some(posted) if posted.received_at.elapsed() <= self.max_age => {
                let mut observation = posted.observation.clone();
                observation.faces.truncate(opts.max_faces as usize);
                Ok(observation)
            }
            Some(posted) => bail!(
                "face observation is stale ({}ms old)",
                posted.received_at.elapsed().as_millis()
            ),
            None => bail!("no face observation posted yet"),
        }
    }

    fn detect_objects(&self, _frame: &Frame) -> Result<RawObjectObservation> {
        Ok(self.lock().objects.take().unwrap_or_default())
    }
}
