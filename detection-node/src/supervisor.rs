//! Fleet supervision: owns the camera set, bootstraps the shared detector,
//! and keeps workers alive. The bounded reconnect loop inside a worker
//! hands terminal failures to the monitor loop's unbounded outer retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use smokewatch_common::AnnotatedFrame;
use tracing::{error, info, warn};

use crate::camera::worker::RunContext;
use crate::camera::{CameraWorker, FrameBuffer, SourceFactory};
use crate::config::{DetectionConfig, RecoveryConfig};
use crate::detect::{ClassMap, Detector, DetectorLoader, SerializedDetector};
use crate::error::{NodeError, Result};
use crate::events::SinkHandle;

/// Reader-side handle onto one camera, cloned out at registration. The
/// frame buffer and liveness flag are shared with the worker for its whole
/// life, so lookups never take the worker mutex, which the monitor holds
/// across blocking restarts.
#[derive(Clone)]
struct CameraView {
    name: String,
    frames: Arc<FrameBuffer>,
    running: Arc<AtomicBool>,
}

pub struct FleetSupervisor {
    cameras: Arc<Mutex<Vec<CameraWorker>>>,
    views: Vec<CameraView>,
    detection: DetectionConfig,
    recovery: RecoveryConfig,
    monitor_interval: Duration,
    factory: Arc<dyn SourceFactory>,
    sinks: SinkHandle,
    running: bool,
    monitor: Option<(Sender<()>, JoinHandle<()>)>,
}

impl FleetSupervisor {
    pub fn new(
        detection: DetectionConfig,
        recovery: RecoveryConfig,
        monitor_interval: Duration,
        factory: Arc<dyn SourceFactory>,
        sinks: SinkHandle,
    ) -> Self {
        Self {
            cameras: Arc::new(Mutex::new(Vec::new())),
            views: Vec::new(),
            detection,
            recovery,
            monitor_interval,
            factory,
            sinks,
            running: false,
            monitor: None,
        }
    }

    /// Register a camera. Must happen before `start`; dynamic registration
    /// is not supported.
    pub fn add_camera(&mut self, config: crate::config::CameraConfig) -> Result<()> {
        if self.running {
            return Err(NodeError::Camera(
                "cameras must be registered before start".to_string(),
            ));
        }
        let worker = CameraWorker::new(config, self.detection.min_event_interval());
        self.views.push(CameraView {
            name: worker.name().to_string(),
            frames: worker.frames(),
            running: worker.running_flag(),
        });
        self.cameras
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(worker);
        Ok(())
    }

    /// Load the shared detector (one-time, possibly slow), start every
    /// registered worker, then spawn the monitor loop.
    pub fn start(&mut self, loader: &dyn DetectorLoader) -> Result<()> {
        if self.running {
            return Ok(());
        }
        if self.views.is_empty() {
            return Err(NodeError::Config("no cameras registered".to_string()));
        }

        info!("loading detection model");
        let detector = loader.load()?;
        info!("model loaded");
        // Unless the backend is proven safe for concurrent invocation,
        // camera threads take turns.
        let detector: Arc<dyn Detector> = if self.detection.serialize_inference {
            Arc::new(SerializedDetector::new(detector))
        } else {
            detector
        };

        let ctx = RunContext {
            detector,
            classes: Arc::new(ClassMap::from(&self.detection)),
            factory: Arc::clone(&self.factory),
            sinks: self.sinks.clone(),
            min_confidence: self.detection.min_confidence,
            proximity_threshold: self.detection.proximity_threshold,
            recovery: self.recovery,
        };

        self.running = true;
        {
            let mut cameras = self.cameras.lock().unwrap_or_else(|e| e.into_inner());
            for worker in cameras.iter_mut() {
                if let Err(e) = worker.start(ctx.clone()) {
                    error!(camera = %worker.name(), "failed to start: {}", e);
                }
            }
        }

        let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
        let cameras = Arc::clone(&self.cameras);
        let interval = self.monitor_interval;
        let monitor_ctx = ctx;
        let handle = std::thread::Builder::new()
            .name("fleet-monitor".to_string())
            .spawn(move || loop {
                match shutdown_rx.recv_timeout(interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                let mut cameras = cameras.lock().unwrap_or_else(|e| e.into_inner());
                for worker in cameras.iter_mut() {
                    if worker.needs_restart() {
                        warn!(camera = %worker.name(), "restarting camera");
                        if let Err(e) = worker.start(monitor_ctx.clone()) {
                            error!(camera = %worker.name(), "restart failed: {}", e);
                        }
                    }
                }
            })?;
        self.monitor = Some((shutdown_tx, handle));
        Ok(())
    }

    /// Stop the monitor, then every worker. Idempotent.
    pub fn stop(&mut self) {
        self.running = false;
        if let Some((shutdown, handle)) = self.monitor.take() {
            let _ = shutdown.send(());
            let _ = handle.join();
        }
        let mut cameras = self.cameras.lock().unwrap_or_else(|e| e.into_inner());
        for worker in cameras.iter_mut() {
            worker.stop();
        }
        info!("fleet stopped");
    }

    pub fn camera_count(&self) -> usize {
        self.views.len()
    }

    /// Positional lookup used by the frame-streaming layer. Out of range is
    /// "not found", not an error. Goes through the reader views, so it
    /// cannot stall behind a restart in progress.
    pub fn latest_frame(&self, index: usize) -> Option<Arc<AnnotatedFrame>> {
        self.views.get(index).map(|view| view.frames.latest())
    }

    pub fn camera_name(&self, index: usize) -> Option<String> {
        self.views.get(index).map(|view| view.name.clone())
    }

    pub fn camera_running(&self, index: usize) -> Option<bool> {
        self.views
            .get(index)
            .map(|view| view.running.load(Ordering::SeqCst))
    }
}

impl Drop for FleetSupervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::VideoSource;
    use crate::config::CameraConfig;
    use crate::detect::NullDetector;
    use crate::events::{Dispatcher, NoopNotifier};
    use image::RgbImage;
    use smokewatch_common::SmokingEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    struct DyingSource {
        reads_left: usize,
    }

    impl VideoSource for DyingSource {
        fn is_open(&self) -> bool {
            self.reads_left > 0
        }

        fn read(&mut self) -> crate::error::Result<RgbImage> {
            if self.reads_left == 0 {
                return Err(NodeError::SourceDropped("gone".to_string()));
            }
            self.reads_left -= 1;
            Ok(RgbImage::new(64, 48))
        }
    }

    /// Fails every open after the first, so each worker run dies once its
    /// frames run out and the bounded reconnects exhaust.
    struct FlakyFactory {
        opens: AtomicUsize,
    }

    impl SourceFactory for FlakyFactory {
        fn open(&self, _config: &CameraConfig) -> crate::error::Result<Box<dyn VideoSource>> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            if n % 6 == 0 {
                Ok(Box::new(DyingSource { reads_left: 2 }))
            } else {
                Err(NodeError::SourceUnavailable("flaky".to_string()))
            }
        }
    }

    /// First open yields a short-lived source, the next five fail so the
    /// run's bounded reconnects exhaust, and every open after that parks
    /// until the release channel drops. Leaves the monitor thread stuck
    /// inside a restart open on demand.
    struct StallingFactory {
        opens: AtomicUsize,
        in_restart_open: Arc<std::sync::atomic::AtomicBool>,
        release: crossbeam::channel::Receiver<()>,
    }

    impl SourceFactory for StallingFactory {
        fn open(&self, _config: &CameraConfig) -> crate::error::Result<Box<dyn VideoSource>> {
            let n = self.opens.fetch_add(1, Ordering::SeqCst);
            match n {
                0 => Ok(Box::new(DyingSource { reads_left: 1 })),
                1..=5 => Err(NodeError::SourceUnavailable("down".to_string())),
                _ => {
                    self.in_restart_open.store(true, Ordering::SeqCst);
                    let _ = self.release.recv();
                    Err(NodeError::SourceUnavailable("down".to_string()))
                }
            }
        }
    }

    struct DropSink;

    impl crate::events::EventSink for DropSink {
        fn record(&mut self, _event: &SmokingEvent) -> crate::error::Result<()> {
            Ok(())
        }
    }

    fn fast_supervisor(factory: Arc<dyn SourceFactory>, sinks: SinkHandle) -> FleetSupervisor {
        let detection = DetectionConfig::default();
        let recovery = RecoveryConfig {
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1,
            read_retry_delay_ms: 1,
        };
        FleetSupervisor::new(detection, recovery, Duration::from_millis(20), factory, sinks)
    }

    fn camera(id: &str) -> CameraConfig {
        CameraConfig {
            id: id.to_string(),
            name: id.to_string(),
            source: "scripted".to_string(),
            width: 64,
            height: 48,
            fps: 200,
            ..CameraConfig::default()
        }
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        done()
    }

    #[test]
    fn start_requires_registered_cameras() {
        let dispatcher = Dispatcher::new(Box::new(DropSink), Box::new(NoopNotifier), 8);
        let factory = Arc::new(FlakyFactory {
            opens: AtomicUsize::new(0),
        });
        let mut supervisor = fast_supervisor(factory, dispatcher.handle());

        assert!(matches!(
            supervisor.start(&NullDetector),
            Err(NodeError::Config(_))
        ));
        drop(supervisor);
        dispatcher.shutdown();
    }

    #[test]
    fn no_registration_after_start() {
        let dispatcher = Dispatcher::new(Box::new(DropSink), Box::new(NoopNotifier), 8);
        let factory = Arc::new(FlakyFactory {
            opens: AtomicUsize::new(0),
        });
        let mut supervisor = fast_supervisor(factory, dispatcher.handle());
        supervisor.add_camera(camera("cam-a")).unwrap();
        supervisor.start(&NullDetector).unwrap();

        assert!(matches!(
            supervisor.add_camera(camera("cam-b")),
            Err(NodeError::Camera(_))
        ));
        supervisor.stop();
        drop(supervisor);
        dispatcher.shutdown();
    }

    #[test]
    fn dead_worker_is_restarted_within_a_monitor_tick() {
        let dispatcher = Dispatcher::new(Box::new(DropSink), Box::new(NoopNotifier), 8);
        let factory = Arc::new(FlakyFactory {
            opens: AtomicUsize::new(0),
        });
        let mut supervisor = fast_supervisor(factory.clone(), dispatcher.handle());
        supervisor.add_camera(camera("cam-a")).unwrap();
        supervisor.start(&NullDetector).unwrap();

        // First run: open #0 succeeds, 2 frames, then 5 failed reconnects
        // (#1-#5) kill the run. The monitor's restart lands on open #6,
        // which succeeds again.
        assert!(wait_until(Duration::from_secs(5), || {
            factory.opens.load(Ordering::SeqCst) >= 7
        }));
        assert!(wait_until(Duration::from_secs(5), || {
            supervisor.camera_running(0) == Some(true)
        }));

        supervisor.stop();
        drop(supervisor);
        dispatcher.shutdown();
    }

    #[test]
    fn stop_is_deliberate_and_final() {
        let dispatcher = Dispatcher::new(Box::new(DropSink), Box::new(NoopNotifier), 8);
        let factory = Arc::new(FlakyFactory {
            opens: AtomicUsize::new(0),
        });
        let mut supervisor = fast_supervisor(factory.clone(), dispatcher.handle());
        supervisor.add_camera(camera("cam-a")).unwrap();
        supervisor.start(&NullDetector).unwrap();
        supervisor.stop();

        let opens_after_stop = factory.opens.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(100));
        // No monitor thread left to reopen anything.
        assert_eq!(factory.opens.load(Ordering::SeqCst), opens_after_stop);
        assert_eq!(supervisor.camera_running(0), Some(false));
        drop(supervisor);
        dispatcher.shutdown();
    }

    #[test]
    fn frame_lookups_do_not_wait_on_a_stalled_restart() {
        let dispatcher = Dispatcher::new(Box::new(DropSink), Box::new(NoopNotifier), 8);
        let (release_tx, release_rx) = bounded::<()>(0);
        let in_restart_open = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let factory = Arc::new(StallingFactory {
            opens: AtomicUsize::new(0),
            in_restart_open: Arc::clone(&in_restart_open),
            release: release_rx,
        });
        let mut supervisor = fast_supervisor(factory, dispatcher.handle());
        supervisor.add_camera(camera("cam-a")).unwrap();
        supervisor.start(&NullDetector).unwrap();

        // The first run dies, its bounded reconnects exhaust, and the
        // monitor's restart parks inside the blocked open.
        assert!(wait_until(Duration::from_secs(5), || {
            in_restart_open.load(Ordering::SeqCst)
        }));

        // A stalled restart of one camera must not gate frame consumers.
        let start = Instant::now();
        assert!(supervisor.latest_frame(0).is_some());
        assert_eq!(supervisor.camera_name(0).as_deref(), Some("cam-a"));
        assert_eq!(supervisor.camera_running(0), Some(false));
        assert!(start.elapsed() < Duration::from_millis(200));

        drop(release_tx);
        supervisor.stop();
        drop(supervisor);
        dispatcher.shutdown();
    }

    #[test]
    fn frame_lookup_is_positional_and_total() {
        let dispatcher = Dispatcher::new(Box::new(DropSink), Box::new(NoopNotifier), 8);
        let factory = Arc::new(FlakyFactory {
            opens: AtomicUsize::new(0),
        });
        let mut supervisor = fast_supervisor(factory, dispatcher.handle());
        supervisor.add_camera(camera("cam-a")).unwrap();

        assert!(supervisor.latest_frame(0).is_some());
        assert!(supervisor.latest_frame(7).is_none());
        assert_eq!(supervisor.camera_name(0).as_deref(), Some("cam-a"));
        assert_eq!(supervisor.camera_name(7), None);
        drop(supervisor);
        dispatcher.shutdown();
    }
}
