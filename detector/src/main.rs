use handwave_common::config::Config;
use handwave_detector::camera::{frame_channel, FrameFeed, MjpegCamera};
use handwave_detector::detector::{DetectorError, HandWaveDetector};
use handwave_detector::sink::{AnimationSink, HttpSink, LogSink};
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        camera = config.camera.as_ref().map(|c| c.url.as_str()).unwrap_or("<none>"),
        frame_history = config.gate.frame_history,
        movement_threshold = config.gate.movement_threshold,
        wave_frames = config.gate.wave_frames,
        animation = %config.animation.name,
        sink = %config.animation.sink,
        "starting hand-wave detector"
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("ctrl-c received, shutting down"),
            Err(e) => error!(error = %e, "failed to listen for ctrl-c, shutting down"),
        }
        let _ = shutdown_tx.send(true);
    });

    let mut sink = match build_sink(&config) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "failed to create animation sink");
            std::process::exit(1);
        }
    };

    let feed = start_camera(&config);
    let detector = HandWaveDetector::from_config(&config);

    match detector.run(feed, sink.as_mut(), shutdown_rx.clone()).await {
        Ok(stats) => {
            info!(
                frames = stats.frames_processed,
                detections = stats.detections,
                "done"
            );
        }
        Err(DetectorError::MissingCollaborator) => {
            // Detection is off, but the host keeps running until asked to stop.
            warn!("no usable camera, idling until shutdown");
            let mut shutdown = shutdown_rx;
            let _ = shutdown.wait_for(|stop| *stop).await;
        }
        Err(e) => error!(error = %e, "hand-wave detector stopped"),
    }
}

fn build_sink(config: &Config) -> Result<Box<dyn AnimationSink>, handwave_detector::sink::SinkError> {
    match (config.animation.sink.as_str(), &config.animation.endpoint) {
        ("http", Some(endpoint)) => Ok(Box::new(HttpSink::new(endpoint.clone())?)),
        _ => Ok(Box::new(LogSink)),
    }
}

/// Spawn the camera task. `None` when no camera is configured or it cannot
/// be set up; the detector reports that and stays idle.
fn start_camera(config: &Config) -> Option<FrameFeed> {
    let camera_config = config.camera.as_ref()?;
    let camera = match MjpegCamera::from_config(camera_config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, url = %camera_config.url, "failed to set up camera");
            return None;
        }
    };

    info!(url = camera.url(), mode = %camera_config.mode, "starting camera");
    let (publisher, feed) = frame_channel();
    camera.spawn(publisher);
    Some(feed)
}
