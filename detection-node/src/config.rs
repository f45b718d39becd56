use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct NodeConfig {
    pub node_id: String,
    pub cameras: Vec<CameraConfig>,
    pub detection: DetectionConfig,
    pub recovery: RecoveryConfig,
    pub supervisor: SupervisorConfig,
    pub sinks: SinkConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct CameraConfig {
    pub id: String,
    /// Display name used in logs, event records and placeholder frames.
    pub name: String,
    /// Device index ("0"), file/directory path, or RTSP URL.
    pub source: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Transport hint for RTSP sources.
    pub rtsp_transport: String,
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DetectionConfig {
    /// Detections below this confidence are ignored for event purposes.
    pub min_confidence: f32,
    /// Minimum seconds between two events from the same camera.
    pub min_event_interval_secs: f64,
    /// Fraction of the frame diagonal below which a cigarette and a person
    /// are considered co-located.
    pub proximity_threshold: f32,
    /// Class labels indexed by model class id.
    pub class_names: Vec<String>,
    /// Which label counts as the cigarette-like class.
    pub cigarette_class: String,
    /// Which label counts as the person-like class.
    pub person_class: String,
    /// Serialize detector invocations across camera threads. Required when
    /// the inference backend is not proven safe for concurrent calls.
    pub serialize_inference: bool,
}

impl DetectionConfig {
    pub fn min_event_interval(&self) -> Duration {
        Duration::from_secs_f64(self.min_event_interval_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Cold-start reconnect attempts before a worker gives up for the run.
    pub max_reconnect_attempts: u32,
    /// Sleep between cold-start reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Backoff after a mid-stream read failure.
    pub read_retry_delay_ms: u64,
}

impl RecoveryConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn read_retry_delay(&self) -> Duration {
        Duration::from_millis(self.read_retry_delay_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Seconds between liveness scans of the camera workers.
    pub monitor_interval_secs: u64,
}

impl SupervisorConfig {
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct SinkConfig {
    /// JSON-lines event log destination.
    pub event_log_path: PathBuf,
    /// HTTP endpoint for smoking notifications; None disables notification
    /// delivery.
    pub notify_url: Option<String>,
    /// Bounded capacity of each outbound sink queue.
    pub queue_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            node_id: "smokewatch-node-1".to_string(),
            cameras: vec![CameraConfig::default()],
            detection: DetectionConfig::default(),
            recovery: RecoveryConfig::default(),
            supervisor: SupervisorConfig::default(),
            sinks: SinkConfig::default(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            id: "camera-1".to_string(),
            name: "Camera 1".to_string(),
            source: "0".to_string(),
            width: 1280,
            height: 720,
            fps: 15,
            rtsp_transport: "tcp".to_string(),
            enabled: true,
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            min_event_interval_secs: 5.0,
            proximity_threshold: 0.3,
            class_names: vec!["cigarette".to_string(), "person".to_string()],
            cigarette_class: "cigarette".to_string(),
            person_class: "person".to_string(),
            serialize_inference: true,
        }
    }
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 2000,
            read_retry_delay_ms: 1000,
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            monitor_interval_secs: 5,
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            event_log_path: PathBuf::from("events.jsonl"),
            notify_url: None,
            queue_capacity: 64,
        }
    }
}
