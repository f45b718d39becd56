//! Per-camera capture/inference loop. One dedicated thread per worker:
//! capture reads and detector calls block, and must never stall another
//! camera.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use image::imageops::FilterType;
use image::RgbImage;
use smokewatch_common::{AnnotatedFrame, Detection, SmokingEvent};
use tracing::{error, info, warn};

use crate::annotate;
use crate::camera::{FrameBuffer, SourceFactory, VideoSource};
use crate::config::{CameraConfig, RecoveryConfig};
use crate::detect::correlate::{self, EventGate};
use crate::detect::{ClassMap, Detector};
use crate::error::{NodeError, Result};
use crate::events::SinkHandle;

/// Everything a worker run needs beyond its own identity. Cloned by the
/// supervisor when it restarts a dead worker.
#[derive(Clone)]
pub struct RunContext {
    pub detector: Arc<dyn Detector>,
    pub classes: Arc<ClassMap>,
    pub factory: Arc<dyn SourceFactory>,
    pub sinks: SinkHandle,
    pub min_confidence: f32,
    pub proximity_threshold: f32,
    pub recovery: RecoveryConfig,
}

pub struct CameraWorker {
    config: CameraConfig,
    frames: Arc<FrameBuffer>,
    running: Arc<AtomicBool>,
    /// Rate-limit state outlives individual runs, so a restarted worker
    /// cannot double-report within the interval.
    gate: Arc<Mutex<EventGate>>,
    handle: Option<JoinHandle<()>>,
    ever_started: bool,
}

impl CameraWorker {
    pub fn new(config: CameraConfig, min_event_interval: Duration) -> Self {
        Self {
            config,
            frames: Arc::new(FrameBuffer::new()),
            running: Arc::new(AtomicBool::new(false)),
            gate: Arc::new(Mutex::new(EventGate::new(min_event_interval))),
            handle: None,
            ever_started: false,
        }
    }

    /// Open the capture and spawn the processing loop. A failed open writes
    /// the "Camera Error" placeholder and returns without spawning; the
    /// supervisor retries on its next monitor tick. Starting a running
    /// worker is a caller bug and is rejected.
    pub fn start(&mut self, ctx: RunContext) -> Result<()> {
        if self.running.load(Ordering::SeqCst) {
            return Err(NodeError::Camera(format!(
                "camera {} is already running",
                self.config.id
            )));
        }
        if let Some(stale) = self.handle.take() {
            let _ = stale.join();
        }

        info!(camera = %self.config.name, source = %self.config.source, "initializing camera");
        self.ever_started = true;

        let source = match ctx.factory.open(&self.config) {
            Ok(source) => source,
            Err(e) => {
                error!(camera = %self.config.name, "failed to open source: {}", e);
                self.frames
                    .publish(annotate::placeholder("Camera Error", &self.config.name));
                return Err(e);
            }
        };

        self.running.store(true, Ordering::SeqCst);

        let config = self.config.clone();
        let frames = Arc::clone(&self.frames);
        let running = Arc::clone(&self.running);
        let gate = Arc::clone(&self.gate);
        let handle = std::thread::Builder::new()
            .name(format!("camera-{}", self.config.id))
            .spawn(move || run_loop(config, frames, running, gate, ctx, source));
        match handle {
            Ok(handle) => {
                self.handle = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    /// Signal the loop and join it. Idempotent.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Shared liveness flag for observers that must not contend with the
    /// supervisor's worker lock.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// A worker needs a restart once a started run has terminated without a
    /// deliberate `stop`. Workers never handed to `start` are not eligible.
    pub fn needs_restart(&self) -> bool {
        self.ever_started && !self.is_running() && !self.is_alive()
    }

    pub fn latest_frame(&self) -> Arc<AnnotatedFrame> {
        self.frames.latest()
    }

    pub fn frames(&self) -> Arc<FrameBuffer> {
        Arc::clone(&self.frames)
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }
}

fn run_loop(
    config: CameraConfig,
    frames: Arc<FrameBuffer>,
    running: Arc<AtomicBool>,
    gate: Arc<Mutex<EventGate>>,
    ctx: RunContext,
    source: Box<dyn VideoSource>,
) {
    info!(camera = %config.name, "detection loop started");

    let tick = Duration::from_secs_f64(1.0 / config.fps.max(1) as f64);
    let mut source = Some(source);
    let mut reconnect_attempts = 0u32;

    while running.load(Ordering::SeqCst) {
        let mut open_source = match source.take() {
            Some(s) if s.is_open() => s,
            _ => {
                if reconnect_attempts < ctx.recovery.max_reconnect_attempts {
                    reconnect_attempts += 1;
                    warn!(
                        camera = %config.name,
                        attempt = reconnect_attempts,
                        max = ctx.recovery.max_reconnect_attempts,
                        "reconnecting"
                    );
                    match ctx.factory.open(&config) {
                        Ok(s) => source = Some(s),
                        Err(e) => warn!(camera = %config.name, "reconnect failed: {}", e),
                    }
                    std::thread::sleep(ctx.recovery.reconnect_delay());
                    continue;
                }
                error!(camera = %config.name, "max reconnect attempts reached");
                frames.publish(annotate::placeholder("Camera Disconnected", &config.name));
                running.store(false, Ordering::SeqCst);
                break;
            }
        };

        match open_source.read() {
            Ok(frame) => {
                // A live read ends any backoff history for this connection.
                reconnect_attempts = 0;
                source = Some(open_source);
                process_frame(frame, &config, &ctx, &gate, &frames);
            }
            Err(e) => {
                // Dropped mid-stream: release the handle and retry from the
                // reconnect path with a fresh attempt budget. Live streams
                // are retried indefinitely.
                warn!(camera = %config.name, "read failed: {}", e);
                reconnect_attempts = 0;
                std::thread::sleep(ctx.recovery.read_retry_delay());
                continue;
            }
        }

        std::thread::sleep(tick);
    }

    info!(camera = %config.name, "detection loop stopped");
}

/// One iteration of detect → correlate → rate-limit → annotate → publish.
/// Any failure here is a skipped frame, never a loop exit.
fn process_frame(
    frame: RgbImage,
    config: &CameraConfig,
    ctx: &RunContext,
    gate: &Mutex<EventGate>,
    frames: &FrameBuffer,
) {
    let frame = if frame.dimensions() == (config.width, config.height) {
        frame
    } else {
        image::imageops::resize(&frame, config.width, config.height, FilterType::Triangle)
    };

    let raw = match ctx.detector.detect(&frame) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(camera = %config.name, "detection failed, skipping frame: {}", e);
            return;
        }
    };

    let detections: Vec<Detection> = raw
        .iter()
        .map(|r| Detection {
            bbox: r.bbox,
            class_id: r.class_id,
            class_label: ctx.classes.label(r.class_id).to_string(),
            confidence: r.confidence,
        })
        .collect();

    let mut cigarettes = Vec::new();
    let mut persons = Vec::new();
    for detection in &detections {
        if detection.confidence < ctx.min_confidence {
            continue;
        }
        if ctx.classes.is_cigarette(&detection.class_label) {
            cigarettes.push(detection.clone());
        } else if ctx.classes.is_person(&detection.class_label) {
            persons.push(detection.clone());
        }
    }

    let candidates = correlate::smoking_candidates(
        &cigarettes,
        &persons,
        ctx.proximity_threshold,
        config.width,
        config.height,
    );
    if let Some(confidence) = correlate::peak_confidence(&candidates) {
        let admitted = {
            let mut gate = gate.lock().unwrap_or_else(|e| e.into_inner());
            gate.admit(Instant::now())
        };
        if admitted {
            info!(camera = %config.name, confidence, "smoking event");
            ctx.sinks
                .dispatch(SmokingEvent::new(config.name.clone(), confidence));
        }
    }

    let flags = correlate::event_flags(
        &detections,
        &persons,
        |label| ctx.classes.is_cigarette(label),
        ctx.proximity_threshold,
        config.width,
        config.height,
    );
    frames.publish(annotate::annotate(frame, &detections, &flags));
}
