use crate::{DEFAULT_INPUT_SIZE, LetterboxError, LetterboxParams};
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, IxDyn};
use std::str::FromStr;

/// Background value of the padding bands (black).
pub const PAD_VALUE: u8 = 0;

/// Memory layout of the float tensor handed to the inference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
    /// `[1, S, S, 3]`, channels interleaved (TFLite style).
    #[default]
    Nhwc,
    /// `[1, 3, S, S]`, planar channels (ONNX style).
    Nchw,
}

impl FromStr for TensorLayout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nhwc" => Ok(TensorLayout::Nhwc),
            "nchw" => Ok(TensorLayout::Nchw),
            other => Err(format!("unknown tensor layout '{other}' (expected nhwc or nchw)")),
        }
    }
}

pub struct LetterboxOutput {
    pub tensor: Array<f32, IxDyn>,
    pub params: LetterboxParams,
}

/// Resizes RGB8 frames into a reusable square canvas and converts it into a
/// `[0, 1]` float tensor.
pub struct Letterboxer {
    input_size: u32,
    layout: TensorLayout,
    canvas: Vec<u8>,
    resizer: Resizer,
}

impl Letterboxer {
    pub fn new(input_size: u32, layout: TensorLayout) -> Self {
        Self {
            input_size,
            layout,
            canvas: vec![PAD_VALUE; (input_size as usize).pow(2) * 3],
            resizer: Resizer::new(),
        }
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub fn layout(&self) -> TensorLayout {
        self.layout
    }

    /// Letterboxed RGB8 canvas from the most recent `apply`.
    pub fn canvas(&self) -> &[u8] {
        &self.canvas
    }

    pub fn apply(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> Result<LetterboxOutput, LetterboxError> {
        let _s = span!("letterbox");

        let params = LetterboxParams::compute(width, height, self.input_size)?;

        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(LetterboxError::BufferMismatch {
                expected,
                actual: pixels.len(),
            });
        }

        tracing::trace!(
            width,
            height,
            ratio = params.ratio,
            pad_x = params.pad_x,
            pad_y = params.pad_y,
            "Letterboxing frame"
        );

        self.composite(pixels, width, height, &params)?;
        let tensor = self.to_tensor()?;

        Ok(LetterboxOutput { tensor, params })
    }

    fn composite(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
        params: &LetterboxParams,
    ) -> Result<(), LetterboxError> {
        let _s = span!("resize_and_pad");

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;
        let mut resized = Image::new(params.resized_width, params.resized_height, PixelType::U8x3);

        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        self.canvas.fill(PAD_VALUE);

        let row_bytes = params.resized_width as usize * 3;
        let stride = self.input_size as usize * 3;
        let resized_data = resized.buffer();

        for (y, src_row) in resized_data.chunks_exact(row_bytes).enumerate() {
            let dst = (y + params.pad_y as usize) * stride + params.pad_x as usize * 3;
            self.canvas[dst..dst + row_bytes].copy_from_slice(src_row);
        }

        Ok(())
    }

    fn to_tensor(&self) -> Result<Array<f32, IxDyn>, LetterboxError> {
        let _s = span!("normalize");

        let size = self.input_size as usize;
        let tensor = match self.layout {
            TensorLayout::Nhwc => {
                let data: Vec<f32> = self.canvas.iter().map(|&v| v as f32 / 255.0).collect();
                Array::from_shape_vec(IxDyn(&[1, size, size, 3]), data)?
            }
            TensorLayout::Nchw => {
                let spatial = size * size;
                let mut data = vec![0.0f32; 3 * spatial];
                for (i, px) in self.canvas.chunks_exact(3).enumerate() {
                    data[i] = px[0] as f32 / 255.0;
                    data[i + spatial] = px[1] as f32 / 255.0;
                    data[i + 2 * spatial] = px[2] as f32 / 255.0;
                }
                Array::from_shape_vec(IxDyn(&[1, 3, size, size]), data)?
            }
        };

        Ok(tensor)
    }
}

impl Default for Letterboxer {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE, TensorLayout::default())
    }
}
