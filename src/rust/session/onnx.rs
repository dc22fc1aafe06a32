use ndarray::{Array4, ArrayView3, Axis};
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{ImageClassifier, ModelLoader};
use crate::classifier::error::{InferenceError, ModelLoadError};
use crate::config::ModelConfig;
use crate::model_manager::{LABELS_FILE, MODEL_FILE};
use crate::models::{BuiltinModel, GANTMAN_LABELS};
use crate::runtime::{create_session_builder, RuntimeConfig};
use crate::tensor::ImageTensor;

/// Memory order the model expects its single image input in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputLayout {
    /// `[batch, height, width, channels]`, as exported from TensorFlow.
    Nhwc,
    /// `[batch, channels, height, width]`
    Nchw,
}

impl InputLayout {
    /// Infers the layout from the model's declared input shape. Dynamic
    /// dimensions are reported as `-1`; a shape with no visible channel axis
    /// is assumed to be NHWC.
    pub fn from_dimensions(dims: &[i64]) -> Result<Self, ModelLoadError> {
        if dims.len() != 4 {
            return Err(ModelLoadError::InvalidModel(format!(
                "expected a rank-4 image input, found shape {:?}",
                dims
            )));
        }
        match (dims[1], dims[3]) {
            (_, 3) => Ok(Self::Nhwc),
            (3, _) => Ok(Self::Nchw),
            (-1, -1) => Ok(Self::Nhwc),
            _ => Err(ModelLoadError::InvalidModel(format!(
                "image input {:?} has no 3-channel axis",
                dims
            ))),
        }
    }

    /// Height and width if the model fixes them.
    fn spatial(&self, dims: &[i64]) -> Option<(usize, usize)> {
        let (h, w) = match self {
            Self::Nhwc => (dims[1], dims[2]),
            Self::Nchw => (dims[2], dims[3]),
        };
        (h > 0 && w > 0).then_some((h as usize, w as usize))
    }
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum > 0.0 && sum.is_finite() {
        exps.into_iter().map(|v| v / sum).collect()
    } else {
        exps
    }
}

/// Loads `<models_dir>/<model_name>/model.onnx` through ONNX Runtime.
#[derive(Debug, Clone)]
pub struct OnnxModelLoader {
    model: ModelConfig,
    runtime: RuntimeConfig,
}

impl OnnxModelLoader {
    pub fn new(model: ModelConfig, runtime: RuntimeConfig) -> Self {
        Self { model, runtime }
    }

    pub fn model_dir(&self) -> PathBuf {
        self.model.models_dir.join(&self.model.model_name)
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_dir().join(MODEL_FILE)
    }

    /// Explicit override, then `labels.json`, then the built-in order.
    pub fn resolve_labels(&self) -> Result<Vec<String>, ModelLoadError> {
        if let Some(labels) = &self.model.labels {
            return Ok(labels.clone());
        }

        let labels_path = self.model_dir().join(LABELS_FILE);
        if labels_path.exists() {
            return read_labels(&labels_path);
        }

        match BuiltinModel::from_name(&self.model.model_name) {
            Some(model) => Ok(model.labels()),
            None => {
                log::warn!(
                    "No labels for model '{}', assuming the five-class NSFW order",
                    self.model.model_name
                );
                Ok(GANTMAN_LABELS.iter().map(|l| l.to_string()).collect())
            }
        }
    }

    fn validate(session: &Session) -> Result<(String, InputLayout, Option<(usize, usize)>), ModelLoadError> {
        if session.inputs.len() != 1 {
            return Err(ModelLoadError::InvalidModel(format!(
                "Model must have exactly 1 image input, found {}",
                session.inputs.len()
            )));
        }
        if session.outputs.is_empty() {
            return Err(ModelLoadError::InvalidModel(
                "Model must have at least 1 output for class scores".to_string(),
            ));
        }

        let input = &session.inputs[0];
        let dims = match &input.input_type {
            ValueType::Tensor { dimensions, .. } => dimensions.clone(),
            other => {
                return Err(ModelLoadError::InvalidModel(format!(
                    "input '{}' is not a tensor: {:?}",
                    input.name, other
                )))
            }
        };
        let layout = InputLayout::from_dimensions(&dims)?;
        Ok((input.name.clone(), layout, layout.spatial(&dims)))
    }
}

fn read_labels(path: &Path) -> Result<Vec<String>, ModelLoadError> {
    let raw = fs::read_to_string(path).map_err(|e| ModelLoadError::Labels {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let labels: Vec<String> = serde_json::from_str(&raw).map_err(|e| ModelLoadError::Labels {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    if labels.is_empty() {
        return Err(ModelLoadError::Labels {
            path: path.to_path_buf(),
            message: "label list is empty".to_string(),
        });
    }
    Ok(labels)
}

impl ModelLoader for OnnxModelLoader {
    fn load(&self) -> Result<Arc<dyn ImageClassifier>, ModelLoadError> {
        let path = self.model_path();
        if !path.exists() {
            return Err(ModelLoadError::NotFound { path });
        }

        let labels = self.resolve_labels()?;

        let session_error = |message: String| ModelLoadError::Session {
            path: path.clone(),
            message,
        };
        let builder = create_session_builder(&self.runtime).map_err(|e| session_error(e.to_string()))?;
        let session = builder
            .commit_from_file(&path)
            .map_err(|e| session_error(e.to_string()))?;

        let (input_name, layout, input_size) = Self::validate(&session)?;
        log::info!(
            "Model '{}' ready: input '{}' ({:?}, {:?}), {} labels",
            self.model.model_name,
            input_name,
            layout,
            input_size,
            labels.len()
        );

        Ok(Arc::new(OnnxClassifier {
            session,
            input_name,
            layout,
            input_size,
            labels,
            input_scale: self.model.input_scale,
            apply_softmax: self.model.apply_softmax,
        }))
    }

    fn describe(&self) -> String {
        format!("ONNX model '{}' from {:?}", self.model.model_name, self.model_path())
    }
}

/// A committed ONNX Runtime session plus the label order of its output.
pub struct OnnxClassifier {
    session: Session,
    input_name: String,
    layout: InputLayout,
    input_size: Option<(usize, usize)>,
    labels: Vec<String>,
    input_scale: f32,
    apply_softmax: bool,
}

impl OnnxClassifier {
    /// Scaled copy of `pixels` with a leading batch axis, in the model's layout.
    fn prepare_input(&self, pixels: ArrayView3<'_, f32>) -> Array4<f32> {
        let scale = self.input_scale;
        let scaled = pixels.mapv(|v| v * scale);
        match self.layout {
            InputLayout::Nhwc => scaled.insert_axis(Axis(0)),
            InputLayout::Nchw => scaled.permuted_axes([2, 0, 1]).insert_axis(Axis(0)),
        }
    }
}

impl ImageClassifier for OnnxClassifier {
    fn classify(&self, tensor: &ImageTensor) -> Result<HashMap<String, f32>, InferenceError> {
        let pixels = tensor.view().ok_or(InferenceError::TensorReleased)?;
        let (h, w, c) = pixels.dim();
        if c != 3 {
            return Err(InferenceError::Shape(format!("expected 3 channels, got {}", c)));
        }
        if let Some((mh, mw)) = self.input_size {
            if (mh, mw) != (h, w) {
                return Err(InferenceError::Shape(format!(
                    "model expects {}x{} input, got {}x{}",
                    mw, mh, w, h
                )));
            }
        }

        let input_dyn = self.prepare_input(pixels).into_dyn();
        let input = input_dyn.as_standard_layout();

        let mut input_tensors = HashMap::new();
        input_tensors.insert(self.input_name.as_str(), Tensor::from_array(&input)?);

        let outputs = self.session.run(input_tensors)?;
        let output_tensor = outputs[0].try_extract_tensor::<f32>()?;
        let mut scores: Vec<f32> = output_tensor.iter().cloned().collect();

        if scores.len() != self.labels.len() {
            return Err(InferenceError::Shape(format!(
                "model produced {} scores for {} labels",
                scores.len(),
                self.labels.len()
            )));
        }
        if self.apply_softmax {
            scores = softmax(&scores);
        }

        Ok(self.labels.iter().cloned().zip(scores).collect())
    }

    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }
}
