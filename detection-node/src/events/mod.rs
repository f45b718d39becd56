//! Outbound event and notification delivery: bounded queues with one
//! dedicated consumer thread per sink. Camera threads never block on a full
//! queue; excess events are dropped and logged.

use std::thread::JoinHandle;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};
use smokewatch_common::SmokingEvent;
use tracing::{debug, info, warn};

use crate::error::Result;

pub mod jsonl;
pub mod webhook;

/// Accepts derived events for persistence. Failures are the sink's problem;
/// they are logged by the consumer thread and never reach the camera loop.
pub trait EventSink: Send {
    fn record(&mut self, event: &SmokingEvent) -> Result<()>;
}

/// Accepts outbound notifications. Same delivery semantics as `EventSink`;
/// may be a no-op when unconfigured.
pub trait NotificationSink: Send {
    fn notify(&mut self, camera: &str, confidence: f32) -> Result<()>;
}

pub struct NoopNotifier;

impl NotificationSink for NoopNotifier {
    fn notify(&mut self, _camera: &str, _confidence: f32) -> Result<()> {
        Ok(())
    }
}

/// Cloneable producer side handed to every camera worker.
#[derive(Clone)]
pub struct SinkHandle {
    events: Sender<SmokingEvent>,
    notifications: Sender<SmokingEvent>,
}

impl SinkHandle {
    /// Forward one event toward both sinks. Best-effort: a full or closed
    /// queue drops the event rather than stalling detection.
    pub fn dispatch(&self, event: SmokingEvent) {
        if let Err(e) = self.notifications.try_send(event.clone()) {
            Self::log_drop("notification", &e);
        }
        if let Err(e) = self.events.try_send(event) {
            Self::log_drop("event", &e);
        }
    }

    fn log_drop(queue: &str, err: &TrySendError<SmokingEvent>) {
        match err {
            TrySendError::Full(event) => {
                warn!(queue, camera = %event.camera, "queue full, dropping event")
            }
            TrySendError::Disconnected(event) => {
                debug!(queue, camera = %event.camera, "queue closed, dropping event")
            }
        }
    }
}

/// Owns the two consumer threads. Dropping the dispatcher closes the queues
/// and joins the consumers after they drain.
pub struct Dispatcher {
    handle: SinkHandle,
    consumers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn new(
        event_sink: Box<dyn EventSink>,
        notification_sink: Box<dyn NotificationSink>,
        queue_capacity: usize,
    ) -> Self {
        let (event_tx, event_rx) = bounded(queue_capacity);
        let (notify_tx, notify_rx) = bounded(queue_capacity);

        let consumers = vec![
            spawn_consumer("event-sink", event_rx, {
                let mut sink = event_sink;
                move |event: &SmokingEvent| sink.record(event)
            }),
            spawn_consumer("notification-sink", notify_rx, {
                let mut sink = notification_sink;
                move |event: &SmokingEvent| sink.notify(&event.camera, event.confidence)
            }),
        ];

        Self {
            handle: SinkHandle {
                events: event_tx,
                notifications: notify_tx,
            },
            consumers,
        }
    }

    pub fn handle(&self) -> SinkHandle {
        self.handle.clone()
    }

    /// Close the queues and wait for the consumers to drain.
    pub fn shutdown(self) {
        drop(self.handle);
        for consumer in self.consumers {
            let _ = consumer.join();
        }
    }
}

fn spawn_consumer(
    name: &'static str,
    rx: Receiver<SmokingEvent>,
    mut deliver: impl FnMut(&SmokingEvent) -> Result<()> + Send + 'static,
) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            for event in rx.iter() {
                match deliver(&event) {
                    Ok(()) => {
                        debug!(sink = name, camera = %event.camera, confidence = event.confidence, "delivered")
                    }
                    Err(e) => warn!(sink = name, camera = %event.camera, "delivery failed: {}", e),
                }
            }
            info!(sink = name, "consumer stopped");
        })
        .expect("failed to spawn sink consumer thread")
}
