use crate::error::FrameError;

/// One decoded RGB8 video frame, immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    index: u64,
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Frame {
    pub fn new(index: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self, FrameError> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(FrameError::SizeMismatch {
                index,
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            index,
            width,
            height,
            pixels,
        })
    }

    /// Uniformly coloured frame, handy for synthetic sources.
    pub fn filled(index: u64, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            index,
            width,
            height,
            pixels,
        }
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}
