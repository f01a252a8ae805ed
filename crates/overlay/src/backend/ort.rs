use super::{InferenceBackend, RawOutput};
use anyhow::Context;
use ndarray::{Array, IxDyn};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::{TensorRef, ValueType},
};

#[derive(Debug, Clone, Copy)]
pub enum ExecutionProvider {
    Cpu,
    Cuda,
}

/// ONNX Runtime session for single-input, single-output detectors.
pub struct OrtBackend {
    session: Session,
    input_name: String,
    output_name: String,
    output_shape: Vec<i64>,
}

impl OrtBackend {
    pub fn load_model(path: &str) -> anyhow::Result<Self> {
        Self::load_model_with_provider(path, ExecutionProvider::Cpu)
    }

    /// Load model with specified execution provider
    pub fn load_model_with_provider(
        path: &str,
        provider: ExecutionProvider,
    ) -> anyhow::Result<Self> {
        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let mut builder = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?;

        match provider {
            ExecutionProvider::Cuda => {
                tracing::info!("Initializing ONNX Runtime with CUDA execution provider");
                builder = builder.with_execution_providers([
                    ort::execution_providers::CUDAExecutionProvider::default()
                        .with_device_id(0)
                        .build()
                        .error_on_failure(),
                ])?;
            }
            ExecutionProvider::Cpu => {
                tracing::info!("Initializing ONNX Runtime with CPU execution provider");
            }
        }

        let session = builder
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {path}"))?;

        let input_name = session
            .inputs
            .first()
            .map(|input| input.name.clone())
            .context("Model declares no inputs")?;

        let output = session.outputs.first().context("Model declares no outputs")?;
        let output_name = output.name.clone();
        let output_shape = match &output.output_type {
            ValueType::Tensor { shape, .. } => shape.iter().copied().collect(),
            other => anyhow::bail!("Unsupported output type {other:?}"),
        };

        tracing::info!(
            path,
            input = %input_name,
            output = %output_name,
            output_shape = ?output_shape,
            "Model loaded"
        );

        Ok(Self {
            session,
            input_name,
            output_name,
            output_shape,
        })
    }
}

impl InferenceBackend for OrtBackend {
    fn output_shape(&self) -> Vec<i64> {
        self.output_shape.clone()
    }

    fn infer(&mut self, input: &Array<f32, IxDyn>) -> anyhow::Result<RawOutput> {
        let outputs = self.session.run(ort::inputs![
            self.input_name.as_str() => TensorRef::from_array_view(input.view())?
        ])?;

        let tensor = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;

        Ok(RawOutput::new(tensor.into_owned()))
    }
}
