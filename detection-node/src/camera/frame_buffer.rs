//! Last-annotated-frame slot: single writer (the camera's own thread),
//! many readers. The lock is held only for the `Arc` swap or clone, never
//! across capture or inference.

use std::sync::{Arc, Mutex};

use image::RgbImage;
use smokewatch_common::AnnotatedFrame;

pub struct FrameBuffer {
    latest: Mutex<Arc<AnnotatedFrame>>,
}

impl FrameBuffer {
    /// Starts holding a plain black frame, so readers always see a valid
    /// decodable image even before the first capture.
    pub fn new() -> Self {
        let blank = AnnotatedFrame::new(RgbImage::new(640, 480), vec![]);
        Self {
            latest: Mutex::new(Arc::new(blank)),
        }
    }

    /// Most-recent-wins: the previous frame is discarded.
    pub fn publish(&self, frame: AnnotatedFrame) {
        let frame = Arc::new(frame);
        let mut guard = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        *guard = frame;
    }

    pub fn latest(&self) -> Arc<AnnotatedFrame> {
        let guard = self.latest.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
