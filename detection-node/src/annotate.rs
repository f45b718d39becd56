//! Frame annotation: box rasterization and placeholder frames.
//!
//! Rectangles are drawn into the pixels; label text travels as overlay
//! metadata next to the image so the streaming layer can composite it.

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use smokewatch_common::{AnnotatedFrame, BBox, Detection, Overlay};

/// Boxes with no qualifying proximity pair.
pub const NORMAL_COLOR: [u8; 3] = [0, 255, 0];
/// Cigarette boxes participating in a qualifying proximity pair.
pub const EVENT_COLOR: [u8; 3] = [255, 0, 0];

/// Placeholder frames keep the original fixed size regardless of the
/// configured capture dimensions.
pub const PLACEHOLDER_WIDTH: u32 = 640;
pub const PLACEHOLDER_HEIGHT: u32 = 480;

/// Draw one box per detection onto `image`. `event_flags[i]` selects the
/// event color for detection `i`. Labels carry the class name and the
/// confidence to two decimal places.
pub fn annotate(
    mut image: RgbImage,
    detections: &[Detection],
    event_flags: &[bool],
) -> AnnotatedFrame {
    let mut overlays = Vec::with_capacity(detections.len());

    for (i, detection) in detections.iter().enumerate() {
        let color = if event_flags.get(i).copied().unwrap_or(false) {
            EVENT_COLOR
        } else {
            NORMAL_COLOR
        };
        draw_box(&mut image, &detection.bbox, color);
        overlays.push(Overlay {
            rect: detection.bbox,
            color,
            label: format!("{} {:.2}", detection.class_label, detection.confidence),
        });
    }

    AnnotatedFrame::new(image, overlays)
}

/// Synthetic frame substituted when no real frame is available: black image
/// with a human-readable status and the camera name in the overlay.
pub fn placeholder(message: &str, camera_name: &str) -> AnnotatedFrame {
    let image = RgbImage::new(PLACEHOLDER_WIDTH, PLACEHOLDER_HEIGHT);
    let overlay = Overlay {
        rect: BBox::new(
            0.0,
            0.0,
            PLACEHOLDER_WIDTH as f32,
            PLACEHOLDER_HEIGHT as f32,
        ),
        color: EVENT_COLOR,
        label: format!("{} - Camera: {}", message, camera_name),
    };
    AnnotatedFrame::new(image, vec![overlay])
}

fn draw_box(image: &mut RgbImage, bbox: &BBox, color: [u8; 3]) {
    let width = bbox.width().max(1.0) as u32;
    let height = bbox.height().max(1.0) as u32;
    let rect = Rect::at(bbox.x1 as i32, bbox.y1 as i32).of_size(width, height);
    draw_hollow_rect_mut(image, rect, Rgb(color));
    // 2px stroke, as the cameras render at full capture resolution.
    if width > 2 && height > 2 {
        let inner = Rect::at(bbox.x1 as i32 + 1, bbox.y1 as i32 + 1).of_size(width - 2, height - 2);
        draw_hollow_rect_mut(image, inner, Rgb(color));
    }
}
