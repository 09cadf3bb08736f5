//! ONNX Runtime inference backend.

use super::InferenceService;
use crate::error::{Error, Result};
use crate::preprocess::InputTensor;
use ort::session::Session;
use ort::value::Tensor;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

fn build_err(e: impl std::fmt::Display) -> Error {
    Error::ClassifierBuild {
        reason: e.to_string(),
    }
}

fn inference_err(e: impl std::fmt::Display) -> Error {
    Error::Inference {
        reason: e.to_string(),
    }
}

/// Model session loaded once and reused for every call.
pub struct OnnxInferenceService {
    session: Mutex<Session>,
}

impl OnnxInferenceService {
    /// Load the model at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ModelFileNotFound {
                path: path.to_path_buf(),
            });
        }

        let session = Session::builder()
            .map_err(build_err)?
            .commit_from_file(path)
            .map_err(build_err)?;

        info!("Loaded model {}", path.display());

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl InferenceService for OnnxInferenceService {
    fn infer(&self, tensor: &InputTensor) -> Result<HashMap<String, Vec<f32>>> {
        let input = Tensor::from_array((tensor.shape(), tensor.data().to_vec()))
            .map_err(inference_err)?;

        let mut session = self.session.lock().map_err(|_| Error::Internal {
            message: "model session lock poisoned".to_string(),
        })?;
        let outputs = session.run(ort::inputs![input]).map_err(inference_err)?;

        let mut vectors = HashMap::new();
        for (name, value) in outputs.iter() {
            let (_, data) = value.try_extract_tensor::<f32>().map_err(inference_err)?;
            vectors.insert(name.to_string(), data.to_vec());
        }
        debug!("Model produced {} output(s)", vectors.len());
        Ok(vectors)
    }
}
