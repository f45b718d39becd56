mod annotate;
mod camera;
mod config;
mod detect;
mod error;
mod events;
mod supervisor;

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::camera::source::DefaultSourceFactory;
use crate::config::NodeConfig;
use crate::detect::NullDetector;
use crate::error::{NodeError, Result};
use crate::events::jsonl::JsonlEventSink;
use crate::events::webhook::WebhookNotifier;
use crate::events::{Dispatcher, NoopNotifier, NotificationSink};
use crate::supervisor::FleetSupervisor;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file path
    #[arg(short, long, default_value = "config/node.yaml")]
    config: String,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level)?;

    let cfg = load_config(&args.config)?;

    info!("starting smokewatch node {}", cfg.node_id);

    let event_sink = JsonlEventSink::open(&cfg.sinks.event_log_path)?;
    let notifier: Box<dyn NotificationSink> = match &cfg.sinks.notify_url {
        Some(url) => Box::new(WebhookNotifier::new(url.clone())),
        None => {
            info!("no notification endpoint configured");
            Box::new(NoopNotifier)
        }
    };
    let dispatcher = Dispatcher::new(Box::new(event_sink), notifier, cfg.sinks.queue_capacity);

    let mut fleet = FleetSupervisor::new(
        cfg.detection.clone(),
        cfg.recovery,
        cfg.supervisor.monitor_interval(),
        Arc::new(DefaultSourceFactory),
        dispatcher.handle(),
    );
    for camera in cfg.cameras.iter().filter(|c| c.enabled) {
        fleet.add_camera(camera.clone())?;
    }
    for camera in cfg.cameras.iter().filter(|c| !c.enabled) {
        info!(camera = %camera.name, "camera disabled, skipping");
    }

    // No inference backend ships with the node; detection is wired through
    // the Detector seam and defaults to the null backend.
    warn!("no detection backend configured, running with the null detector");
    fleet.start(&NullDetector)?;

    wait_for_shutdown().await;

    info!("shutting down smokewatch node");
    fleet.stop();
    // The fleet holds a sink handle; release it so the consumers drain.
    drop(fleet);
    dispatcher.shutdown();
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let log_level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| NodeError::Config(e.to_string()))?;

    Ok(())
}

fn load_config(path: &str) -> Result<NodeConfig> {
    // `::config` is the config crate; the local module shadows the bare name.
    let settings = ::config::Config::builder()
        .add_source(::config::File::with_name(path).required(false))
        .add_source(::config::Environment::with_prefix("SMOKEWATCH").separator("__"))
        .build()
        .map_err(|e| NodeError::Config(e.to_string()))?;

    settings
        .try_deserialize()
        .map_err(|e| NodeError::Config(e.to_string()))
}

async fn wait_for_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
