//! sentinel - watch an MJPEG stream and drive a remote LED from detections.
//!
//! This daemon:
//! 1. Connects to the camera's MJPEG endpoint
//! 2. Keeps only the freshest frame, decodes it and runs the detector
//! 3. Debounces the per-frame signal into LED on/off transitions
//! 4. Sends each transition to the LED server with a short timeout
//!
//! Stops cleanly on Ctrl-C. A failing stream exits with status 1 and names
//! the stage that failed.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mjpeg_sentinel::ingest::{connect, FrameDemuxer};
use mjpeg_sentinel::{
    build_backend, BackendKind, HttpActuator, PipelineDriver, SentinelConfig, Stage,
    TriggerStateMachine,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Drive a remote LED from object detections on an MJPEG stream"
)]
struct Args {
    /// Path to a JSON or TOML config file.
    #[arg(long, env = "SENTINEL_CONFIG")]
    config: Option<PathBuf>,

    /// MJPEG stream URL (overrides config).
    #[arg(long)]
    stream_url: Option<String>,

    /// Detector backend: 'tract' or 'stub'.
    #[arg(long)]
    backend: Option<BackendKind>,

    /// ONNX model path for the tract backend.
    #[arg(long)]
    model: Option<PathBuf>,

    /// Write the latest annotated frame to this path.
    #[arg(long)]
    annotated_output: Option<PathBuf>,

    /// Skip the startup reachability check of the LED server.
    #[arg(long)]
    no_probe: bool,
}

impl Args {
    fn apply(self, config: &mut SentinelConfig) {
        if let Some(url) = self.stream_url {
            config.stream.url = url;
        }
        if let Some(backend) = self.backend {
            config.detection.backend = backend;
        }
        if let Some(model) = self.model {
            config.detection.model_path = model;
        }
        if let Some(path) = self.annotated_output {
            config.output.annotated_path = Some(path);
        }
        if self.no_probe {
            config.actuator.probe = false;
        }
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if let Err(err) = run(args) {
        match err.downcast_ref::<Stage>() {
            Some(stage) => log::error!("{} stage failed: {:#}", stage, err),
            None => log::error!("sentinel failed: {:#}", err),
        }
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let mut config = SentinelConfig::load_from(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    let mut detector = build_backend(&config.detection)?;
    detector.warm_up().context("warm up detector backend")?;
    log::info!(
        "detector backend {} ready (classes={:?}, min_confidence={})",
        detector.name(),
        config.detection.classes,
        config.detection.min_confidence
    );

    let actuator = HttpActuator::from_settings(&config.actuator);
    if config.actuator.probe {
        match actuator.probe() {
            Ok(()) => log::info!("led server reachable at {}", config.actuator.base_url),
            Err(e) => log::warn!("led server not reachable yet: {:#}", e),
        }
    }

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&cancel);
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    let reader = connect(
        &config.stream.url,
        config.stream.connect_timeout,
        config.stream.read_timeout,
    )
    .context(Stage::Connect)?;
    log::info!("connected to mjpeg stream {}", config.stream.url);

    let demuxer = FrameDemuxer::new(reader, config.stream.demux.clone());
    let mut driver = PipelineDriver::new(
        demuxer,
        detector,
        config.detection.filter(),
        TriggerStateMachine::new(config.trigger.streak_threshold),
        actuator,
    )
    .with_health_interval(config.output.health_interval);
    if let Some(path) = config.output.annotated_path.clone() {
        log::info!("writing annotated frames to {}", path.display());
        driver = driver.with_annotated_output(path);
    }

    // Dropping the driver on any exit path closes the stream connection.
    driver.run(&cancel)
}
