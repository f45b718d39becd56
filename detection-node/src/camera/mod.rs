pub mod frame_buffer;
pub mod source;
pub mod worker;

pub use frame_buffer::FrameBuffer;
pub use source::{SourceFactory, VideoSource};
pub use worker::CameraWorker;
