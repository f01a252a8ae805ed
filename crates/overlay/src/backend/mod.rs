use ndarray::{Array, Array1, ArrayD, Axis, IxDyn};
use std::borrow::Cow;

#[cfg(feature = "ort-backend")]
pub mod ort;

/// The external inference engine. Treated as a black box: it takes the
/// letterboxed input tensor and returns one raw output tensor whose shape it
/// declares up front.
pub trait InferenceBackend {
    /// Declared output shape, queried once per session. Negative entries are
    /// dynamic dimensions.
    fn output_shape(&self) -> Vec<i64>;

    /// Run inference on a preprocessed input tensor
    fn infer(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<RawOutput>;
}

/// Raw output tensor of one inference call. Decoding only ever reads it.
#[derive(Debug, Clone)]
pub struct RawOutput {
    tensor: ArrayD<f32>,
}

impl RawOutput {
    pub fn new(tensor: ArrayD<f32>) -> Self {
        Self { tensor }
    }

    /// Wrap a flat buffer as a `[1, N]` tensor.
    pub fn from_flat(values: Vec<f32>) -> Self {
        let tensor = Array1::from(values).insert_axis(Axis(0)).into_dyn();
        Self { tensor }
    }

    pub fn shape(&self) -> &[usize] {
        self.tensor.shape()
    }

    pub fn tensor(&self) -> &ArrayD<f32> {
        &self.tensor
    }

    /// Row-major flattened values; borrowed when the tensor is contiguous.
    pub fn values(&self) -> Cow<'_, [f32]> {
        match self.tensor.as_slice() {
            Some(slice) => Cow::Borrowed(slice),
            None => Cow::Owned(self.tensor.iter().copied().collect()),
        }
    }
}

/// Whether a produced shape honours the declared one. Dynamic (negative)
/// declared dimensions match anything; an empty declaration matches any shape.
pub fn shape_matches(declared: &[i64], actual: &[usize]) -> bool {
    if declared.is_empty() {
        return true;
    }
    declared.len() == actual.len()
        && declared
            .iter()
            .zip(actual)
            .all(|(&d, &a)| d < 0 || d as usize == a)
}
