//! The "decodable frame stream" boundary. Workers own a `VideoSource`
//! exclusively and go through a `SourceFactory` on every (re)connect.

use std::fs;
use std::path::PathBuf;

use image::RgbImage;
use tracing::info;

use crate::config::CameraConfig;
use crate::error::{NodeError, Result};

/// An open capture handle. `read` failures after a successful open are
/// `SourceDropped`; the worker releases the handle and retries.
pub trait VideoSource: Send {
    fn is_open(&self) -> bool;
    fn read(&mut self) -> Result<RgbImage>;
}

/// Creates capture handles for a camera. Invoked once per connection
/// attempt; an `Err` means the source never opened.
pub trait SourceFactory: Send + Sync {
    fn open(&self, config: &CameraConfig) -> Result<Box<dyn VideoSource>>;
}

/// Dispatches on the configured source string the way the original capture
/// layer did: device indexes and RTSP URLs belong to external capture
/// backends, everything else is treated as a path.
pub struct DefaultSourceFactory;

impl SourceFactory for DefaultSourceFactory {
    fn open(&self, config: &CameraConfig) -> Result<Box<dyn VideoSource>> {
        if config.source.chars().all(|c| c.is_ascii_digit()) {
            return Err(NodeError::SourceUnavailable(format!(
                "device index source {} requires a capture backend",
                config.source
            )));
        }
        if config.source.starts_with("rtsp") {
            return Err(NodeError::SourceUnavailable(format!(
                "rtsp source {} ({} transport) requires a capture backend",
                config.source, config.rtsp_transport
            )));
        }
        let source = ImageDirSource::open(PathBuf::from(&config.source))?;
        Ok(Box::new(source))
    }
}

/// File-backed source: cycles through the decodable images in a directory
/// at the camera's configured pace. Useful for file sources and rehearsal
/// setups without live cameras.
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    next: usize,
    open: bool,
}

impl ImageDirSource {
    pub fn open(dir: PathBuf) -> Result<Self> {
        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| NodeError::SourceUnavailable(format!("{}: {}", dir.display(), e)))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("jpg") | Some("jpeg") | Some("png") | Some("bmp")
                )
            })
            .collect();
        files.sort();

        if files.is_empty() {
            return Err(NodeError::SourceUnavailable(format!(
                "{}: no decodable images",
                dir.display()
            )));
        }

        info!(dir = %dir.display(), frames = files.len(), "opened image directory source");
        Ok(Self {
            files,
            next: 0,
            open: true,
        })
    }
}

impl VideoSource for ImageDirSource {
    fn is_open(&self) -> bool {
        self.open
    }

    fn read(&mut self) -> Result<RgbImage> {
        let path = &self.files[self.next];
        self.next = (self.next + 1) % self.files.len();

        match image::open(path) {
            Ok(img) => Ok(img.into_rgb8()),
            Err(e) => {
                self.open = false;
                Err(NodeError::SourceDropped(format!(
                    "{}: {}",
                    path.display(),
                    e
                )))
            }
        }
    }
}
