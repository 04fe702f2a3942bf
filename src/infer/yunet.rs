//! ONNX Runtime engine for the YuNet-style `loc` / `conf` / `iou` face network.

use std::path::Path;
use std::sync::Mutex;

use ort::execution_providers::{CPUExecutionProvider, CUDAExecutionProvider, ExecutionProviderDispatch};
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::detector::{Backend, InferenceEngine, Target};
use crate::error::{DetectError, DetectResult};
use crate::infer::blob::ImageTensor;
use crate::infer::decode::RawOutputs;

pub const OUTPUT_LOC: &str = "loc";
pub const OUTPUT_CONF: &str = "conf";
pub const OUTPUT_IOU: &str = "iou";

pub struct OrtEngine {
    session: Mutex<Session>,
}

impl OrtEngine {
    pub fn load(model_path: &Path, backend: Backend, target: Target) -> DetectResult<Self> {
        if !model_path.exists() {
            return Err(DetectError::ModelNotFound(model_path.display().to_string()));
        }

        let provider: ExecutionProviderDispatch = match (backend, target) {
            (Backend::Cuda, Target::Gpu(id)) => CUDAExecutionProvider::default().with_device_id(id).into(),
            (Backend::Cuda, _) => CUDAExecutionProvider::default().into(),
            _ => CPUExecutionProvider::default().into(),
        };
        let providers: [ExecutionProviderDispatch; 1] = [provider];

        let session = Session::builder()
            .map_err(|e| DetectError::inference(format!("ORT session builder: {e}")))?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| DetectError::inference(format!("ORT opt level: {e}")))?
            .with_execution_providers(providers)
            .map_err(|e| DetectError::inference(format!("ORT execution providers: {e}")))?
            .commit_from_file(model_path)
            .map_err(|e| DetectError::inference(format!("ORT load model: {e}")))?;

        info!("event" = "onnx.session.ok", model = %model_path.display(), backend = ?backend, target = %target);
        Ok(Self { session: Mutex::new(session) })
    }
}

impl InferenceEngine for OrtEngine {
    fn forward(&self, input: &ImageTensor) -> DetectResult<RawOutputs> {
        let shape = input.shape().to_vec();
        let tensor = Tensor::from_array((shape, input.data.clone().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| DetectError::inference(format!("ORT tensor: {e}")))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| DetectError::inference("ORT session poisoned"))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| DetectError::inference(format!("ORT run failed: {e}")))?;

        let extract = |name: &str| -> DetectResult<Vec<f32>> {
            let value = outputs
                .get(name)
                .ok_or_else(|| DetectError::inference(format!("ORT output `{name}` missing")))?;
            let (shape, data) = value
                .try_extract_tensor::<f32>()
                .map_err(|e| DetectError::inference(format!("ORT extract `{name}`: {e}")))?;
            debug!("event" = "onnx.output", name, shape = ?shape);
            Ok(data.to_vec())
        };

        RawOutputs::from_flat(extract(OUTPUT_LOC)?, extract(OUTPUT_CONF)?, extract(OUTPUT_IOU)?)
    }
}
