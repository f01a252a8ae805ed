use crate::backend::{InferenceBackend, RawOutput, shape_matches};
use crate::config::{OutputFormat, OverlayConfig};
use crate::error::{FrameFailure, PipelineError};
use crate::frame::Frame;
use crate::gate::PlaybackGate;
use crate::processing::{OutputLayout, RejectCounts, TensorDecoder, suppress};
use crate::render::Renderer;
use letterbox::{BoundingBox, LetterboxError, LetterboxParams, Letterboxer};
use ndarray::{Array, IxDyn};

/// Whether the session has produced its first overlay yet. Owned by the
/// session and passed into every frame.
#[derive(Debug, Default)]
pub struct DetectionState {
    detected_once: bool,
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_detected_once(&self) -> bool {
        self.detected_once
    }

    /// Record a detection. Returns true only the first time.
    pub fn mark_detected(&mut self) -> bool {
        !std::mem::replace(&mut self.detected_once, true)
    }
}

/// A kept detection in original-frame pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub confidence: f32,
    pub class_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// Nothing detected; frame rendered as is.
    Bare,
    Overlaid(Vec<Overlay>),
    /// Per-frame failure; frame rendered bare with a notice.
    Fallback(String),
}

impl FrameOutcome {
    pub fn overlays(&self) -> &[Overlay] {
        match self {
            FrameOutcome::Overlaid(overlays) => overlays,
            _ => &[],
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FrameOutcome::Fallback(_))
    }
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    pub outcome: FrameOutcome,
    /// This frame triggered the playback gate.
    pub first_detection: bool,
    pub layout: Option<OutputLayout>,
    pub rejected: RejectCounts,
    /// Candidates that survived decoding, before suppression.
    pub candidates: usize,
}

impl FrameReport {
    fn new(frame_index: u64, outcome: FrameOutcome) -> Self {
        Self {
            frame_index,
            outcome,
            first_detection: false,
            layout: None,
            rejected: RejectCounts::default(),
            candidates: 0,
        }
    }
}

/// Letterboxed input ready for the engine, plus what is needed to map its
/// detections back.
pub struct PreparedFrame {
    pub input: Array<f32, IxDyn>,
    pub params: LetterboxParams,
}

struct Detected {
    layout: Option<OutputLayout>,
    rejected: RejectCounts,
    candidates: usize,
    overlays: Vec<Overlay>,
}

/// Letterbox, decode, suppress and unmap one frame at a time.
///
/// Split into `prepare` and `complete` so inference can run elsewhere in
/// between; `process_frame` does both inline.
pub struct DetectionPipeline {
    letterboxer: Letterboxer,
    decoder: TensorDecoder,
    iou_threshold: f32,
    declared_shape: Vec<i64>,
}

impl DetectionPipeline {
    pub fn new(letterboxer: Letterboxer, decoder: TensorDecoder, iou_threshold: f32) -> Self {
        Self {
            letterboxer,
            decoder,
            iou_threshold,
            declared_shape: Vec::new(),
        }
    }

    pub fn from_config(config: &OverlayConfig) -> Self {
        let letterboxer = Letterboxer::new(config.input_size, config.input_layout);
        let decoder = TensorDecoder::new(config.input_size, config.confidence_threshold)
            .with_format(config.output_format)
            .with_selection(config.selection);
        Self::new(letterboxer, decoder, config.iou_threshold)
    }

    /// Record the engine's declared output shape. Every produced output is
    /// checked against it and `Auto` format is resolved from it when static.
    pub fn bind_output_shape(&mut self, declared: Vec<i64>) -> OutputFormat {
        let format = self.decoder.bind_declared_shape(&declared);
        tracing::info!(declared_shape = ?declared, format = ?format, "Bound engine output shape");
        self.declared_shape = declared;
        format
    }

    /// Letterbox the frame. Bad frame geometry is fatal; a failure inside
    /// the resize itself is handed back for `fall_back`.
    pub fn prepare(
        &mut self,
        frame: &Frame,
    ) -> Result<Result<PreparedFrame, FrameFailure>, PipelineError> {
        match self
            .letterboxer
            .apply(frame.pixels(), frame.width(), frame.height())
        {
            Ok(out) => Ok(Ok(PreparedFrame {
                input: out.tensor,
                params: out.params,
            })),
            Err(source) => letterbox_failure(frame.index(), source).map(Err),
        }
    }

    /// Turn the inference result into a rendered frame. Only a shape that
    /// contradicts the engine's declaration is fatal; every other failure
    /// renders the bare frame with a notice.
    pub fn complete<R, G>(
        &mut self,
        frame: &Frame,
        params: &LetterboxParams,
        result: anyhow::Result<RawOutput>,
        state: &mut DetectionState,
        renderer: &mut R,
        gate: &mut G,
    ) -> Result<FrameReport, PipelineError>
    where
        R: Renderer + ?Sized,
        G: PlaybackGate + ?Sized,
    {
        let detected = match result {
            Ok(raw) => {
                if !shape_matches(&self.declared_shape, raw.shape()) {
                    return Err(PipelineError::ShapeMismatch {
                        declared: self.declared_shape.clone(),
                        actual: raw.shape().to_vec(),
                    });
                }
                self.detect(frame, params, &raw)
            }
            Err(e) => Err(FrameFailure::Inference(e)),
        };

        let detected = match detected {
            Ok(detected) => detected,
            Err(failure) => return Ok(self.fall_back(frame, failure, renderer)),
        };

        let mut report = FrameReport::new(frame.index(), FrameOutcome::Bare);
        report.layout = detected.layout;
        report.rejected = detected.rejected;
        report.candidates = detected.candidates;

        present(renderer, frame, &detected.overlays);

        if !detected.overlays.is_empty() {
            if state.mark_detected() {
                tracing::info!(
                    frame_index = frame.index(),
                    detections = detected.overlays.len(),
                    "First detection, releasing playback"
                );
                gate.on_first_detection();
                report.first_detection = true;
            }
            report.outcome = FrameOutcome::Overlaid(detected.overlays);
        }

        Ok(report)
    }

    /// Prepare, infer inline, then complete.
    pub fn process_frame<E, R, G>(
        &mut self,
        frame: &Frame,
        engine: &mut E,
        state: &mut DetectionState,
        renderer: &mut R,
        gate: &mut G,
    ) -> Result<FrameReport, PipelineError>
    where
        E: InferenceBackend + ?Sized,
        R: Renderer + ?Sized,
        G: PlaybackGate + ?Sized,
    {
        let prepared = match self.prepare(frame)? {
            Ok(prepared) => prepared,
            Err(failure) => return Ok(self.fall_back(frame, failure, renderer)),
        };
        let result = engine.infer(&prepared.input);
        self.complete(frame, &prepared.params, result, state, renderer, gate)
    }

    fn detect(
        &self,
        frame: &Frame,
        params: &LetterboxParams,
        raw: &RawOutput,
    ) -> Result<Detected, FrameFailure> {
        let decoded = self.decoder.decode(raw)?;

        let mut detected = Detected {
            layout: decoded.layout,
            rejected: decoded.rejected,
            candidates: decoded.candidates.len(),
            overlays: Vec::new(),
        };
        if decoded.candidates.is_empty() {
            return Ok(detected);
        }

        let kept = suppress(&decoded.candidates, self.iou_threshold);
        detected.overlays = kept
            .into_iter()
            .map(|i| -> Result<Overlay, FrameFailure> {
                let det = &decoded.candidates[i];
                Ok(Overlay {
                    bbox: params.unmap(det.bbox, frame.width(), frame.height())?,
                    confidence: det.confidence,
                    class_id: det.class_id,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        tracing::trace!(
            frame_index = frame.index(),
            candidates = detected.candidates,
            kept = detected.overlays.len(),
            "Frame decoded"
        );

        Ok(detected)
    }

    /// Render the bare frame and surface `failure` as a notice.
    pub fn fall_back<R>(
        &self,
        frame: &Frame,
        failure: FrameFailure,
        renderer: &mut R,
    ) -> FrameReport
    where
        R: Renderer + ?Sized,
    {
        let message = failure.to_string();
        tracing::warn!(frame_index = frame.index(), error = %message, "Rendering bare frame");

        present(renderer, frame, &[]);
        renderer.notice(frame.index(), &message);

        FrameReport::new(frame.index(), FrameOutcome::Fallback(message))
    }
}

fn letterbox_failure(index: u64, source: LetterboxError) -> Result<FrameFailure, PipelineError> {
    if source.is_precondition() {
        Err(PipelineError::InvalidFrame { index, source })
    } else {
        Ok(FrameFailure::Preprocess(source))
    }
}

fn present<R>(renderer: &mut R, frame: &Frame, overlays: &[Overlay])
where
    R: Renderer + ?Sized,
{
    if let Err(e) = renderer.present(frame, overlays) {
        tracing::warn!(frame_index = frame.index(), error = %e, "Renderer failed");
    }
}
