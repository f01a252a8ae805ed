pub mod backend;
pub mod config;
pub mod error;
pub mod frame;
pub mod gate;
pub mod logging;
pub mod pipeline;
pub mod processing;
pub mod render;
pub mod scheduler;
pub mod session;
pub mod source;

// Re-export commonly used types for convenience
pub use backend::{InferenceBackend, RawOutput};
pub use config::{OutputFormat, OverlayConfig, SelectionMode};
pub use error::{FrameError, PipelineError};
pub use frame::Frame;
pub use gate::{ChannelGate, LogGate, PlaybackGate};
pub use pipeline::{DetectionPipeline, DetectionState, FrameOutcome, FrameReport, Overlay};
pub use processing::{Detection, TensorDecoder, suppress};
pub use render::{ImageFileRenderer, Renderer};
pub use scheduler::{FrameScheduler, SchedulerState, Tick};
pub use session::{PlaybackSession, SessionHandle, SessionSummary};
pub use source::{FrameSource, ImageSequenceSource, VecFrameSource};
