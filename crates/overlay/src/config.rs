use crate::error::ConfigError;
use common::env_or;
use letterbox::TensorLayout;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub use common::Environment;

/// How the engine's raw output tensor is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// `[1, N]` with 6-value groups, optionally count-prefixed.
    Flat,
    /// `[batch, channels, anchors]`, one column per anchor.
    Structured,
    /// Decide from the engine's declared output shape.
    #[default]
    Auto,
}

impl OutputFormat {
    /// Resolve `Auto` against a concrete shape. Rank-3 tensors with fewer
    /// channels than anchors (`[1, 5, 8400]`, `[1, 84, 8400]`) are structured;
    /// everything else is read as flat.
    pub fn resolve(self, shape: &[usize]) -> OutputFormat {
        match self {
            OutputFormat::Auto => match shape {
                [_, channels, anchors] if *channels >= 5 && channels < anchors => {
                    OutputFormat::Structured
                }
                _ => OutputFormat::Flat,
            },
            fixed => fixed,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "flat" => Ok(OutputFormat::Flat),
            "structured" => Ok(OutputFormat::Structured),
            "auto" => Ok(OutputFormat::Auto),
            other => Err(format!(
                "unknown output format '{other}' (expected flat, structured or auto)"
            )),
        }
    }
}

/// Which decoded candidates go forward to suppression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionMode {
    #[default]
    All,
    /// Only the single highest-confidence candidate.
    Best,
}

impl FromStr for SelectionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(SelectionMode::All),
            "best" => Ok(SelectionMode::Best),
            other => Err(format!("unknown selection mode '{other}' (expected all or best)")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub environment: Environment,
    pub model_path: String,
    pub frames_dir: String,
    pub output_dir: String,
    pub otel_endpoint: Option<String>,
    pub input_size: u32,
    pub input_layout: TensorLayout,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub frame_interval_ms: u64,
    pub max_frames: u32,
    pub output_format: OutputFormat,
    pub selection: SelectionMode,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            model_path: "models/detector.onnx".to_string(),
            frames_dir: "frames".to_string(),
            output_dir: "overlay_out".to_string(),
            otel_endpoint: None,
            input_size: letterbox::DEFAULT_INPUT_SIZE,
            input_layout: TensorLayout::Nhwc,
            confidence_threshold: 0.5,
            iou_threshold: 0.45,
            frame_interval_ms: 100,
            max_frames: 200,
            output_format: OutputFormat::Auto,
            selection: SelectionMode::All,
        }
    }
}

impl OverlayConfig {
    /// Load configuration from environment variables with sensible defaults
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<L>(lookup: L) -> anyhow::Result<Self>
    where
        L: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let config = Self {
            environment: Environment::from_lookup(&lookup),
            model_path: lookup("MODEL_PATH").unwrap_or(defaults.model_path),
            frames_dir: lookup("FRAMES_DIR").unwrap_or(defaults.frames_dir),
            output_dir: lookup("OUTPUT_DIR").unwrap_or(defaults.output_dir),
            otel_endpoint: lookup("OTEL_ENDPOINT").filter(|s| !s.is_empty()),
            input_size: env_or(&lookup, "INPUT_SIZE", defaults.input_size)?,
            input_layout: env_or(&lookup, "INPUT_LAYOUT", defaults.input_layout)?,
            confidence_threshold: env_or(
                &lookup,
                "CONFIDENCE_THRESHOLD",
                defaults.confidence_threshold,
            )?,
            iou_threshold: env_or(&lookup, "IOU_THRESHOLD", defaults.iou_threshold)?,
            frame_interval_ms: env_or(&lookup, "FRAME_INTERVAL_MS", defaults.frame_interval_ms)?,
            max_frames: env_or(&lookup, "MAX_FRAMES", defaults.max_frames)?,
            output_format: env_or(&lookup, "OUTPUT_FORMAT", defaults.output_format)?,
            selection: env_or(&lookup, "SELECTION_MODE", defaults.selection)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_size == 0 {
            return Err(ConfigError::ZeroInputSize);
        }
        for (name, value) in [
            ("confidence_threshold", self.confidence_threshold),
            ("iou_threshold", self.iou_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdOutOfRange { name, value });
            }
        }
        if self.frame_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        Ok(())
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}
