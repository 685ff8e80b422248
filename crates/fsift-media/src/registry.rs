//! Model registry: named ONNX sessions behind a pluggable backend.
//!
//! Detectors receive an `Arc<ModelRegistry>` at construction and address
//! models by logical name. The production backend wraps ONNX Runtime with
//! automatic execution-provider selection; tests plug in a closure-driven
//! stub instead.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use crate::error::{MediaError, MediaResult};

/// Logical name of the scene-embedding model.
pub const SCENE_MODEL: &str = "scene";
/// Logical name of the object-detection model.
pub const MOTION_MODEL: &str = "motion";
/// Logical name of the text-detection model.
pub const TEXT_DET_MODEL: &str = "text_det";
/// Logical name of the text-recognition model.
pub const TEXT_REC_MODEL: &str = "text_rec";

/// Runs a named model on one input tensor and returns every output as a
/// flat float vector, in the model's output order.
pub trait InferenceBackend: Send + Sync {
    fn infer(&self, model_name: &str, input: &[f32], shape: &[usize]) -> MediaResult<Vec<Vec<f32>>>;

    fn has_model(&self, model_name: &str) -> bool;
}

/// Shared, explicit model registry (no process-wide globals).
pub struct ModelRegistry {
    backend: Box<dyn InferenceBackend>,
}

impl ModelRegistry {
    pub fn new(backend: Box<dyn InferenceBackend>) -> Self {
        Self { backend }
    }

    /// Load the analyzer's models into an ONNX Runtime backend, skipping
    /// empty paths. The recognition model is only loaded when enabled.
    pub fn from_models_config(
        models: &fsift_models::ModelsConfig,
        enable_text_recognition: bool,
    ) -> MediaResult<Self> {
        let base = Path::new(&models.base_path);
        let mut backend = OrtBackend::new();

        for (name, path) in [
            (SCENE_MODEL, &models.scene_model_path),
            (MOTION_MODEL, &models.motion_model_path),
            (TEXT_DET_MODEL, &models.text_det_model_path),
        ] {
            if !path.is_empty() {
                backend.load_model(name, &base.join(path))?;
            }
        }

        // The recognition model is a performance killer; load it only on
        // explicit request.
        if enable_text_recognition && !models.text_rec_model_path.is_empty() {
            backend.load_model(TEXT_REC_MODEL, &base.join(&models.text_rec_model_path))?;
            info!("Text recognition model loaded");
        } else {
            info!("Text recognition disabled");
        }

        Ok(Self::new(Box::new(backend)))
    }

    pub fn infer(
        &self,
        model_name: &str,
        input: &[f32],
        shape: &[usize],
    ) -> MediaResult<Vec<Vec<f32>>> {
        self.backend.infer(model_name, input, shape)
    }

    pub fn has_model(&self, model_name: &str) -> bool {
        self.backend.has_model(model_name)
    }
}

struct OrtEntry {
    session: Mutex<Session>,
    output_names: Vec<String>,
}

/// ONNX Runtime backend holding one session per model.
#[derive(Default)]
pub struct OrtBackend {
    sessions: HashMap<String, OrtEntry>,
}

impl OrtBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a model file and register it under `name`.
    pub fn load_model(&mut self, name: &str, path: &Path) -> MediaResult<()> {
        if !path.exists() {
            return Err(MediaError::ModelNotFound(path.display().to_string()));
        }

        let session = create_session(path)?;
        let output_names = session.outputs.iter().map(|o| o.name.clone()).collect();
        info!(model = name, path = %path.display(), "Model loaded");
        self.sessions.insert(
            name.to_string(),
            OrtEntry {
                session: Mutex::new(session),
                output_names,
            },
        );
        Ok(())
    }
}

impl InferenceBackend for OrtBackend {
    fn infer(&self, model_name: &str, input: &[f32], shape: &[usize]) -> MediaResult<Vec<Vec<f32>>> {
        let entry = self
            .sessions
            .get(model_name)
            .ok_or_else(|| MediaError::ModelNotFound(model_name.to_string()))?;

        let expected: usize = shape.iter().product();
        if expected != input.len() {
            return Err(MediaError::inference(format!(
                "input length {} does not match shape {:?}",
                input.len(),
                shape
            )));
        }

        let tensor: Value = Tensor::from_array((shape.to_vec(), input.to_vec().into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| MediaError::inference(format!("failed to create tensor: {e}")))?;

        let mut session = entry
            .session
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| MediaError::inference(format!("ONNX inference failed: {e}")))?;

        let mut results = Vec::with_capacity(entry.output_names.len());
        for name in &entry.output_names {
            let output = outputs
                .get(name.as_str())
                .ok_or_else(|| MediaError::inference(format!("missing output tensor {name}")))?;
            let tensor = output
                .try_extract_tensor::<f32>()
                .map_err(|e| MediaError::inference(format!("failed to extract tensor: {e}")))?;
            results.push(tensor.1.to_vec());
        }
        Ok(results)
    }

    fn has_model(&self, model_name: &str) -> bool {
        self.sessions.contains_key(model_name)
    }
}

/// Create an ONNX Runtime session with automatic execution provider
/// selection: CUDA (feature-gated) → CoreML (macOS) → CPU.
fn create_session(model_path: &Path) -> MediaResult<Session> {
    let model_bytes = std::fs::read(model_path)
        .map_err(|e| MediaError::internal(format!("failed to read model file: {e}")))?;

    let builder = Session::builder()
        .map_err(|e| MediaError::internal(format!("failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| MediaError::internal(format!("failed to set optimization level: {e}")))?;

    #[cfg(all(target_os = "linux", feature = "cuda"))]
    {
        use ort::execution_providers::CUDAExecutionProvider;
        if let Ok(cuda_builder) = builder
            .clone()
            .with_execution_providers([CUDAExecutionProvider::default().build()])
        {
            if let Ok(session) = cuda_builder.commit_from_memory(&model_bytes) {
                info!("Using CUDA execution provider");
                return Ok(session);
            }
        }
        debug!("CUDA execution provider not available, trying alternatives");
    }

    #[cfg(target_os = "macos")]
    {
        use ort::execution_providers::CoreMLExecutionProvider;
        if let Ok(coreml_builder) = builder
            .clone()
            .with_execution_providers([CoreMLExecutionProvider::default().build()])
        {
            if let Ok(session) = coreml_builder.commit_from_memory(&model_bytes) {
                info!("Using CoreML execution provider");
                return Ok(session);
            }
        }
        debug!("CoreML execution provider not available, using CPU");
    }

    debug!("Using CPU execution provider");
    builder
        .commit_from_memory(&model_bytes)
        .map_err(|e| MediaError::internal(format!("failed to load ONNX model: {e}")))
}

type StubFn = Box<dyn Fn(&[f32], &[usize]) -> MediaResult<Vec<Vec<f32>>> + Send + Sync>;

/// Closure-driven backend for tests.
#[derive(Default)]
pub struct StubBackend {
    models: HashMap<String, StubFn>,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fake model.
    pub fn register<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&[f32], &[usize]) -> MediaResult<Vec<Vec<f32>>> + Send + Sync + 'static,
    {
        self.models.insert(name.to_string(), Box::new(f));
        self
    }

    /// Register a fake model that always returns the same outputs.
    pub fn register_constant(self, name: &str, outputs: Vec<Vec<f32>>) -> Self {
        self.register(name, move |_, _| Ok(outputs.clone()))
    }

    pub fn into_registry(self) -> ModelRegistry {
        ModelRegistry::new(Box::new(self))
    }
}

impl InferenceBackend for StubBackend {
    fn infer(&self, model_name: &str, input: &[f32], shape: &[usize]) -> MediaResult<Vec<Vec<f32>>> {
        let f = self
            .models
            .get(model_name)
            .ok_or_else(|| MediaError::ModelNotFound(model_name.to_string()))?;
        f(input, shape)
    }

    fn has_model(&self, model_name: &str) -> bool {
        self.models.contains_key(model_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stub_backend_round_trip() {
        let registry = StubBackend::new()
            .register(SCENE_MODEL, |input, shape| {
                assert_eq!(shape, &[1, 3, 2, 2]);
                Ok(vec![vec![input.iter().sum()]])
            })
            .into_registry();

        let out = registry
            .infer(SCENE_MODEL, &[1.0; 12], &[1, 3, 2, 2])
            .unwrap();
        assert_eq!(out[0], vec![12.0]);
    }

    #[test]
    fn test_missing_model() {
        let registry = StubBackend::new().into_registry();
        assert!(!registry.has_model(MOTION_MODEL));
        assert!(matches!(
            registry.infer(MOTION_MODEL, &[], &[]),
            Err(MediaError::ModelNotFound(_))
        ));
    }

    #[test]
    fn test_ort_backend_rejects_missing_file() {
        let mut backend = OrtBackend::new();
        let result = backend.load_model("scene", Path::new("/nonexistent/model.onnx"));
        assert!(matches!(result, Err(MediaError::ModelNotFound(_))));
    }
}
