use crate::backend::InferenceBackend;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::gate::PlaybackGate;
use crate::pipeline::{DetectionPipeline, DetectionState, FrameReport, PreparedFrame};
use crate::render::Renderer;
use crate::scheduler::{FrameScheduler, Tick};
use crate::source::FrameSource;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, error::TryRecvError};
use tokio::time::{Instant, sleep_until};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Pause,
    Resume,
    Stop,
}

/// Controls a running session from any task. Commands sent after the session
/// has finished are dropped.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    pub fn pause(&self) {
        self.send(SessionCommand::Pause);
    }

    pub fn resume(&self) {
        self.send(SessionCommand::Resume);
    }

    /// No frame is dispatched after this; one already running completes.
    pub fn stop(&self) {
        self.send(SessionCommand::Stop);
    }

    fn send(&self, command: SessionCommand) {
        if self.tx.send(command).is_err() {
            tracing::debug!(?command, "Session already finished");
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub frames_processed: u64,
    pub frames_overlaid: u64,
    pub fallbacks: u64,
    pub first_detection_frame: Option<u64>,
}

impl SessionSummary {
    fn record(&mut self, report: &FrameReport) {
        self.frames_processed += 1;
        if !report.outcome.overlays().is_empty() {
            self.frames_overlaid += 1;
        }
        if report.outcome.is_fallback() {
            self.fallbacks += 1;
        }
        if report.first_detection {
            self.first_detection_frame = Some(report.frame_index);
        }
    }
}

struct SessionMetrics {
    duration: Histogram<f64>,
    frames: Counter<u64>,
    detections: Counter<u64>,
    fallbacks: Counter<u64>,
}

impl SessionMetrics {
    fn init(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.02, 0.03, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0,
        ];

        Self {
            duration: meter
                .f64_histogram("overlay_frame_duration_seconds")
                .with_description("Time to process a single frame (letterbox + infer + render)")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
            frames: meter
                .u64_counter("overlay_frames_total")
                .with_description("Total frames processed")
                .build(),
            detections: meter
                .u64_counter("overlay_detections_total")
                .with_description("Total overlays drawn")
                .build(),
            fallbacks: meter
                .u64_counter("overlay_fallbacks_total")
                .with_description("Frames rendered bare after a per-frame failure")
                .build(),
        }
    }

    fn record(&self, report: &FrameReport, elapsed_secs: f64) {
        self.duration.record(elapsed_secs, &[]);
        self.frames.add(1, &[]);
        self.detections
            .add(report.outcome.overlays().len() as u64, &[]);
        if report.outcome.is_fallback() {
            self.fallbacks.add(1, &[]);
        }
    }
}

/// Drives playback: pulls frames on the scheduler's cadence, runs inference
/// on the blocking pool and renders each frame before the next tick is due.
pub struct PlaybackSession<S, E, R, G> {
    scheduler: FrameScheduler,
    source: S,
    engine: E,
    pipeline: DetectionPipeline,
    renderer: R,
    gate: G,
    commands: UnboundedReceiver<SessionCommand>,
}

impl<S, E, R, G> PlaybackSession<S, E, R, G>
where
    S: FrameSource,
    E: InferenceBackend + Send + 'static,
    R: Renderer,
    G: PlaybackGate,
{
    pub fn new(
        scheduler: FrameScheduler,
        source: S,
        engine: E,
        pipeline: DetectionPipeline,
        renderer: R,
        gate: G,
    ) -> (Self, SessionHandle) {
        let (tx, commands) = mpsc::unbounded_channel();
        let session = Self {
            scheduler,
            source,
            engine,
            pipeline,
            renderer,
            gate,
            commands,
        };
        (session, SessionHandle { tx })
    }

    pub async fn run(self) -> Result<SessionSummary, PipelineError> {
        let Self {
            mut scheduler,
            mut source,
            mut engine,
            mut pipeline,
            mut renderer,
            mut gate,
            mut commands,
        } = self;

        pipeline.bind_output_shape(engine.output_shape());

        let metrics = SessionMetrics::init("overlay");
        let mut state = DetectionState::new();
        let mut summary = SessionSummary::default();
        let mut commands_open = true;

        if !scheduler.start(source.is_ready(), Instant::now()) {
            tracing::warn!("Session did not start");
            return Ok(summary);
        }

        tracing::info!(
            interval_ms = scheduler.interval().as_millis() as u64,
            "Playback session started"
        );

        loop {
            while commands_open {
                match commands.try_recv() {
                    Ok(command) => apply(&mut scheduler, command),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => commands_open = false,
                }
            }

            if scheduler.is_paused() {
                if !commands_open {
                    tracing::warn!("Paused with no remaining controllers, ending session");
                    break;
                }
                match commands.recv().await {
                    Some(command) => apply(&mut scheduler, command),
                    None => commands_open = false,
                }
                continue;
            }

            let Some(due) = scheduler.next_due() else {
                break;
            };

            tokio::select! {
                biased;
                command = commands.recv(), if commands_open => {
                    match command {
                        Some(command) => apply(&mut scheduler, command),
                        None => commands_open = false,
                    }
                    continue;
                }
                _ = sleep_until(due) => {}
            }

            let Some(tick) = scheduler.poll(Instant::now()) else {
                continue;
            };

            let started = Instant::now();
            let span = tracing::info_span!(
                "overlay_frame",
                frame_index = tick.index,
                timestamp_us = tick.timestamp_us
            );

            let Some(frame) = span.in_scope(|| source.frame_at(tick.timestamp_us)) else {
                scheduler.complete(false, Instant::now());
                continue;
            };

            let prepared = span.in_scope(|| pipeline.prepare(&frame))?;
            let report = match prepared {
                Ok(PreparedFrame { input, params }) => {
                    // The engine travels with the job, so only one inference
                    // is ever in flight.
                    let infer_span = span.clone();
                    let (returned, result) = tokio::task::spawn_blocking(move || {
                        let _s = infer_span.enter();
                        let result = engine.infer(&input);
                        (engine, result)
                    })
                    .await
                    .map_err(|e| PipelineError::EngineLost(e.to_string()))?;
                    engine = returned;

                    span.in_scope(|| {
                        pipeline.complete(
                            &frame,
                            &params,
                            result,
                            &mut state,
                            &mut renderer,
                            &mut gate,
                        )
                    })?
                }
                Err(failure) => {
                    span.in_scope(|| pipeline.fall_back(&frame, failure, &mut renderer))
                }
            };

            metrics.record(&report, started.elapsed().as_secs_f64());
            summary.record(&report);
            log_progress(&tick, &frame, &report, &summary);

            scheduler.complete(true, Instant::now());
        }

        tracing::info!(
            frames_processed = summary.frames_processed,
            frames_overlaid = summary.frames_overlaid,
            fallbacks = summary.fallbacks,
            first_detection_frame = ?summary.first_detection_frame,
            "Playback session finished"
        );

        Ok(summary)
    }
}

fn apply(scheduler: &mut FrameScheduler, command: SessionCommand) {
    tracing::debug!(?command, "Session command");
    match command {
        SessionCommand::Pause => scheduler.pause(),
        SessionCommand::Resume => {
            if !scheduler.resume(Instant::now()) {
                tracing::debug!("Resume ignored, session was not paused while running");
            }
        }
        SessionCommand::Stop => scheduler.stop(),
    }
}

fn log_progress(tick: &Tick, frame: &Frame, report: &FrameReport, summary: &SessionSummary) {
    if summary.frames_processed.is_multiple_of(10) {
        tracing::debug!(
            frame_index = tick.index,
            width = frame.width(),
            height = frame.height(),
            overlays = report.outcome.overlays().len(),
            candidates = report.candidates,
            rejected = report.rejected.total(),
            frames_processed = summary.frames_processed,
            "Frame processed"
        );
    }
}
