//! Aspect-preserving resize into a square detector input, and the inverse
//! mapping of detector-space boxes back onto the source frame.

pub mod bbox;
pub mod cpu;
pub mod error;
pub mod params;

pub use bbox::BoundingBox;
pub use cpu::{LetterboxOutput, Letterboxer, PAD_VALUE, TensorLayout};
pub use error::LetterboxError;
pub use params::LetterboxParams;

/// Square input edge used by the detector when nothing else is configured.
pub const DEFAULT_INPUT_SIZE: u32 = 640;
