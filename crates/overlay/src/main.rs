use anyhow::Context;
use common::TelemetryGuard;
use overlay::{
    DetectionPipeline, FrameScheduler, ImageFileRenderer, ImageSequenceSource, LogGate,
    OverlayConfig, PlaybackSession, backend::ort::OrtBackend, logging::setup_logging,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OverlayConfig::from_env()?;

    // The guard installs its own subscriber.
    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init("overlay", endpoint, config.environment)?),
        None => {
            setup_logging(&config);
            None
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    let engine = OrtBackend::load_model(&config.model_path)?;
    let source = ImageSequenceSource::open(&config.frames_dir, config.frame_interval())?;
    let renderer = ImageFileRenderer::new(&config.output_dir)?;
    let scheduler = FrameScheduler::new(config.frame_interval(), config.max_frames);
    let pipeline = DetectionPipeline::from_config(&config);

    let (session, handle) =
        PlaybackSession::new(scheduler, source, engine, pipeline, renderer, LogGate);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, stopping playback");
            handle.stop();
        }
    });

    let summary = session.run().await.context("Playback session aborted")?;

    tracing::info!(
        frames = summary.frames_processed,
        overlaid = summary.frames_overlaid,
        output_dir = %config.output_dir,
        "Done"
    );

    Ok(())
}
