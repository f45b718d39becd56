pub mod types;
pub mod utils;

pub use types::{AnnotatedFrame, BBox, Detection, Overlay, SmokingEvent};
