//! Model inference and result decoding.

mod classifier;
mod onnx;

pub use classifier::{Classifier, PredictionResult};
pub use onnx::OnnxInferenceService;

use crate::error::Result;
use crate::preprocess::InputTensor;
use std::collections::HashMap;

/// Opaque inference capability: tensor in, named probability vectors out.
pub trait InferenceService {
    /// Run the model once.
    fn infer(&self, tensor: &InputTensor) -> Result<HashMap<String, Vec<f32>>>;
}

impl<T: InferenceService + ?Sized> InferenceService for &T {
    fn infer(&self, tensor: &InputTensor) -> Result<HashMap<String, Vec<f32>>> {
        (**self).infer(tensor)
    }
}
