use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use image::DynamicImage;

use super::{Frame, FrameSource};

/// Holds the most recent frame pushed by a local capture pipeline.
/// Readers always get the latest frame; older frames are overwritten, never queued.
#[derive(Clone, Default)]
pub struct FrameSlot {
    latest: Arc<RwLock<Option<Frame>>>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an encoded still (PNG, JPEG, ...) and make it the latest frame.
    pub fn push_encoded(&self, bytes: &[u8]) -> Result<Frame> {
        let image = image::load_from_memory(bytes).context("failed to decode frame")?;
        Ok(self.push_image(image))
    }

    pub fn push_image(&self, image: DynamicImage) -> Frame {
        let frame = Frame::from_image(image, Utc::now());
        let mut guard = match self.latest.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(frame.clone());
        frame
    }
}

impl FrameSource for FrameSlot {
    fn latest_frame(&self) -> Result<Frame> {
        let guard = match self.latest.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard
            .clone()
            .ok_or_else(|| anyhow!("no frame captured yet"))
    }
}
