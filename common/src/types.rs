use chrono::{DateTime, Utc};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Axis-aligned bounding box in pixel coordinates, (x1, y1) top-left.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f32 {
        (self.x1 + self.x2) / 2.0
    }

    pub fn center_y(&self) -> f32 {
        (self.y1 + self.y2) / 2.0
    }
}

/// One model output for one frame: box + class + confidence.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Detection {
    pub bbox: BBox,
    pub class_id: u32,
    pub class_label: String,
    pub confidence: f32,
}

/// Derived, rate-limited domain event: a cigarette detection spatially close
/// to a person detection in the same frame. Forwarded to sinks, never stored
/// by the engine.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SmokingEvent {
    pub id: Uuid,
    pub kind: String,
    pub camera: String,
    pub confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl SmokingEvent {
    pub fn new(camera: impl Into<String>, confidence: f32) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: "smoking".to_string(),
            camera: camera.into(),
            confidence,
            timestamp: Utc::now(),
        }
    }
}

/// A box drawn onto a frame plus its label text. Placeholder frames carry
/// their human-readable status in the label.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub rect: BBox,
    pub color: [u8; 3],
    pub label: String,
}

/// The latest published frame for one camera: pixels with boxes rasterized
/// in, plus the overlay metadata for consumers that composite their own
/// labels. Always a valid decodable image.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub image: RgbImage,
    pub overlays: Vec<Overlay>,
    pub captured_at_ms: u64,
}

impl AnnotatedFrame {
    pub fn new(image: RgbImage, overlays: Vec<Overlay>) -> Self {
        Self {
            image,
            overlays,
            captured_at_ms: crate::utils::now_millis(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bbox_geometry() {
        let b = BBox::new(100.0, 100.0, 140.0, 140.0);
        assert_eq!(b.width(), 40.0);
        assert_eq!(b.height(), 40.0);
        assert_eq!(b.area(), 1600.0);
        assert_eq!(b.center_x(), 120.0);
        assert_eq!(b.center_y(), 120.0);
    }

    #[test]
    fn smoking_event_serializes() {
        let event = SmokingEvent::new("Gate A", 0.91);
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"kind\":\"smoking\""));
        assert!(json.contains("Gate A"));

        let back: SmokingEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.confidence, event.confidence);
    }

    #[test]
    fn annotated_frame_never_empty() {
        let frame = AnnotatedFrame::new(RgbImage::new(640, 480), vec![]);
        assert_eq!(frame.width(), 640);
        assert_eq!(frame.height(), 480);
        assert!(!frame.image.as_raw().is_empty());
    }
}
