use thiserror::Error;

#[derive(Error, Debug)]
pub enum LetterboxError {
    #[error("Invalid dimensions: frame {width}x{height}, input size {input_size}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        input_size: u32,
    },

    #[error("Buffer size mismatch: expected {expected}, got {actual} bytes")]
    BufferMismatch { expected: usize, actual: usize },

    #[error("Image buffer error: {0}")]
    ImageBuffer(#[from] fast_image_resize::ImageBufferError),

    #[error("Resize failed: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl LetterboxError {
    /// True for errors caused by the caller's frame geometry rather than by
    /// the resize machinery.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            LetterboxError::InvalidDimensions { .. } | LetterboxError::BufferMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_formatting() {
        let err = LetterboxError::InvalidDimensions {
            width: 0,
            height: 480,
            input_size: 640,
        };
        assert_eq!(
            err.to_string(),
            "Invalid dimensions: frame 0x480, input size 640"
        );

        let err = LetterboxError::BufferMismatch {
            expected: 12,
            actual: 10,
        };
        assert_eq!(
            err.to_string(),
            "Buffer size mismatch: expected 12, got 10 bytes"
        );
    }

    #[test]
    fn test_precondition_classification() {
        assert!(
            LetterboxError::InvalidDimensions {
                width: 0,
                height: 0,
                input_size: 640
            }
            .is_precondition()
        );
        assert!(
            LetterboxError::BufferMismatch {
                expected: 3,
                actual: 0
            }
            .is_precondition()
        );
    }
}
