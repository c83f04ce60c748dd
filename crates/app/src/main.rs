use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use culex_app::pipeline::{DetectionPipeline, LogSink};
use culex_app::settings::Settings;
use culex_audio::CaptureThread;
use culex_foundation::{AppState, ShutdownHandler, StateManager};
use culex_telemetry::PipelineMetrics;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

fn init_logging() -> anyhow::Result<()> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "culex.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("Starting Culex wingbeat tracker");

    let config_path = std::env::var_os("CULEX_CONFIG").map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    tracing::info!(
        "Array: {} ch @ {} Hz, mics {:?}, {:?}/{:?}",
        settings.array.total_channels,
        settings.array.sample_rate_hz,
        settings.array.mic_indices,
        settings.strategy,
        settings.policy,
    );

    let state_manager = StateManager::new();
    let shutdown = ShutdownHandler::new().install().await;
    let metrics = Arc::new(PipelineMetrics::new());

    state_manager.transition(AppState::Running)?;

    // --- 1. Capture ---
    let (mut capture, frames) =
        CaptureThread::spawn(settings.array.clone(), settings.device.clone(), metrics.clone())?;
    tracing::info!("Audio capture thread started");

    // --- 2. Detection loop ---
    let mut pipeline = DetectionPipeline::new(&settings, Box::new(LogSink), metrics.clone())?;
    let processing = std::thread::Builder::new()
        .name("detection".to_string())
        .spawn(move || pipeline.run(frames))?;
    tracing::info!("Detection thread started");

    // --- Supervision loop ---
    let mut stats_interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = stats_interval.tick() => {
                tracing::info!(
                    "Pipeline: {} chunks processed, {} bearings emitted",
                    metrics.chunks_processed(),
                    metrics.bearings_emitted(),
                );
            }
        }
    }

    // --- Graceful shutdown ---
    tracing::info!("Beginning graceful shutdown");
    state_manager.transition(AppState::Stopping)?;

    // Stop the producer first: this closes the device and pushes the
    // sentinel, which ends the detection loop and clears the indicator.
    capture.stop();
    if processing.join().is_err() {
        tracing::error!("Detection thread panicked during shutdown");
    }

    state_manager.transition(AppState::Stopped)?;
    tracing::info!("Shutdown complete");
    Ok(())
}
