use std::sync::{Arc, Mutex};

use image::RgbImage;
use smokewatch_common::BBox;

use crate::error::{NodeError, Result};

pub mod correlate;

/// Unlabelled model output for one frame.
#[derive(Debug, Clone, Copy)]
pub struct RawDetection {
    pub bbox: BBox,
    pub class_id: u32,
    pub confidence: f32,
}

/// Opaque object-detection capability. Implementations must distinguish a
/// failed invocation (`Err`) from "no detections" (`Ok(vec![])`), and must
/// be safe to call repeatedly.
pub trait Detector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<RawDetection>>;
}

impl Detector for Arc<dyn Detector> {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<RawDetection>> {
        (**self).detect(frame)
    }
}

/// One-time model load performed by the supervisor at startup. May be slow.
pub trait DetectorLoader: Send {
    fn load(&self) -> Result<Arc<dyn Detector>>;
}

/// Wraps a detector whose inference path is not proven safe for concurrent
/// invocation, serializing calls from the camera threads.
pub struct SerializedDetector<D> {
    inner: Mutex<D>,
}

impl<D: Detector> SerializedDetector<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner: Mutex::new(inner),
        }
    }
}

impl<D: Detector> Detector for SerializedDetector<D> {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<RawDetection>> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| NodeError::Detection("detector mutex poisoned".to_string()))?;
        guard.detect(frame)
    }
}

/// Detector that never reports anything. Stands in when no inference
/// backend is wired up; the rest of the pipeline runs unchanged.
pub struct NullDetector;

impl Detector for NullDetector {
    fn detect(&self, _frame: &RgbImage) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }
}

impl DetectorLoader for NullDetector {
    fn load(&self) -> Result<Arc<dyn Detector>> {
        Ok(Arc::new(NullDetector))
    }
}

/// Explicit class-id-to-label table plus the two labels the event logic
/// cares about. Injected at worker construction, never hardcoded in the
/// processing loop.
#[derive(Debug, Clone)]
pub struct ClassMap {
    names: Vec<String>,
    cigarette: String,
    person: String,
}

impl ClassMap {
    pub fn new(names: Vec<String>, cigarette: String, person: String) -> Self {
        Self {
            names,
            cigarette,
            person,
        }
    }

    pub fn label(&self, class_id: u32) -> &str {
        self.names
            .get(class_id as usize)
            .map(String::as_str)
            .unwrap_or("unknown")
    }

    pub fn is_cigarette(&self, label: &str) -> bool {
        label == self.cigarette
    }

    pub fn is_person(&self, label: &str) -> bool {
        label == self.person
    }
}

impl From<&crate::config::DetectionConfig> for ClassMap {
    fn from(cfg: &crate::config::DetectionConfig) -> Self {
        Self::new(
            cfg.class_names.clone(),
            cfg.cigarette_class.clone(),
            cfg.person_class.clone(),
        )
    }
}
