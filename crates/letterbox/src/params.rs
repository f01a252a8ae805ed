use crate::{BoundingBox, LetterboxError};

/// Uniform scale and symmetric padding that fit a frame into a square
/// `input_size` canvas.
///
/// `resized + 2 * pad` equals `input_size` per axis, up to one pixel of
/// integer-floor slack on the padded axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxParams {
    pub ratio: f32,
    pub pad_x: u32,
    pub pad_y: u32,
    pub input_size: u32,
    pub resized_width: u32,
    pub resized_height: u32,
}

impl LetterboxParams {
    pub fn compute(
        orig_width: u32,
        orig_height: u32,
        input_size: u32,
    ) -> Result<Self, LetterboxError> {
        check_dimensions(orig_width, orig_height, input_size)?;

        let size = input_size as f32;
        let ratio = (size / orig_width as f32).min(size / orig_height as f32);

        // Clamp guards slivers (e.g. 1x4000) that would round to zero pixels.
        let resized_width = ((orig_width as f32 * ratio).round() as u32).clamp(1, input_size);
        let resized_height = ((orig_height as f32 * ratio).round() as u32).clamp(1, input_size);

        Ok(Self {
            ratio,
            pad_x: (input_size - resized_width) / 2,
            pad_y: (input_size - resized_height) / 2,
            input_size,
            resized_width,
            resized_height,
        })
    }

    /// Map a box from original-frame coordinates into detector-input space.
    pub fn map(&self, bbox: BoundingBox) -> BoundingBox {
        let (px, py) = (self.pad_x as f32, self.pad_y as f32);
        BoundingBox {
            x1: bbox.x1 * self.ratio + px,
            y1: bbox.y1 * self.ratio + py,
            x2: bbox.x2 * self.ratio + px,
            y2: bbox.y2 * self.ratio + py,
        }
    }

    /// Map a detector-input box back onto the original frame, clamped to its
    /// bounds.
    pub fn unmap(
        &self,
        bbox: BoundingBox,
        orig_width: u32,
        orig_height: u32,
    ) -> Result<BoundingBox, LetterboxError> {
        check_dimensions(orig_width, orig_height, self.input_size)?;

        let (px, py) = (self.pad_x as f32, self.pad_y as f32);
        let (w, h) = (orig_width as f32, orig_height as f32);

        Ok(BoundingBox {
            x1: ((bbox.x1 - px) / self.ratio).clamp(0.0, w),
            y1: ((bbox.y1 - py) / self.ratio).clamp(0.0, h),
            x2: ((bbox.x2 - px) / self.ratio).clamp(0.0, w),
            y2: ((bbox.y2 - py) / self.ratio).clamp(0.0, h),
        })
    }
}

fn check_dimensions(width: u32, height: u32, input_size: u32) -> Result<(), LetterboxError> {
    if width == 0 || height == 0 || input_size == 0 {
        return Err(LetterboxError::InvalidDimensions {
            width,
            height,
            input_size,
        });
    }
    Ok(())
}
