use letterbox::LetterboxError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("input_size must be greater than zero")]
    ZeroInputSize,

    #[error("{name} must be within [0, 1], got {value}")]
    ThresholdOutOfRange { name: &'static str, value: f32 },

    #[error("frame_interval_ms must be greater than zero")]
    ZeroInterval,
}

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("Frame {index}: expected {expected} bytes for {width}x{height} RGB, got {actual}")]
    SizeMismatch {
        index: u64,
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}

/// Structural problems with a raw output tensor. Recoverable: the frame is
/// rendered without overlay.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Structured output must be [batch, channels, anchors], got {0:?}")]
    NotRank3(Vec<usize>),

    #[error("Structured output needs at least 5 channels, got {0}")]
    TooFewChannels(usize),

    #[error("Structured output has an empty batch")]
    EmptyBatch,
}

/// Session-fatal failures. Everything else is absorbed per frame.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid frame {index}: {source}")]
    InvalidFrame {
        index: u64,
        #[source]
        source: LetterboxError,
    },

    #[error("Output shape mismatch: engine declared {declared:?}, produced {actual:?}")]
    ShapeMismatch {
        declared: Vec<i64>,
        actual: Vec<usize>,
    },

    #[error("Inference engine lost: {0}")]
    EngineLost(String),
}

/// Per-frame failure that falls back to rendering the bare frame.
#[derive(Error, Debug)]
pub enum FrameFailure {
    #[error("Letterbox failed: {0}")]
    Preprocess(LetterboxError),

    #[error("Inference failed: {0:#}")]
    Inference(anyhow::Error),

    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Unmap failed: {0}")]
    Unmap(#[from] LetterboxError),
}
