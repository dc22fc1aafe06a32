use ort::Error as OrtError;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

/// Failure to turn a source file into a normalized image.
///
/// Every variant names the offending path. None of these are retryable
/// without the caller changing the input.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Image file is empty: {path:?}")]
    Empty { path: PathBuf },
    #[error("Unsupported image format for {path:?}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },
    #[error("Corrupt or undecodable image {path:?}: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("Failed to materialize normalized image for {path:?}: {message}")]
    Materialize { path: PathBuf, message: String },
    #[error("Failed to encode normalized image for {path:?}: {message}")]
    Encode { path: PathBuf, message: String },
}

impl DecodeError {
    /// The source path the failure is attributed to.
    pub fn path(&self) -> &PathBuf {
        match self {
            Self::Io { path, .. }
            | Self::Empty { path }
            | Self::UnsupportedFormat { path, .. }
            | Self::Corrupt { path, .. }
            | Self::Materialize { path, .. }
            | Self::Encode { path, .. } => path,
        }
    }
}

/// The classifier could not be brought up. A later call may retry the load.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ModelLoadError {
    #[error("Model file not found: {path:?}")]
    NotFound { path: PathBuf },
    #[error("Failed to create inference session from {path:?}: {message}")]
    Session { path: PathBuf, message: String },
    #[error("Invalid model: {0}")]
    InvalidModel(String),
    #[error("Failed to read labels from {path:?}: {message}")]
    Labels { path: PathBuf, message: String },
    #[error("Model loading task failed: {0}")]
    Task(String),
}

/// The classifier failed on a well-formed tensor.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("Tensor has already been released")]
    TensorReleased,
    #[error("Unexpected tensor shape: {0}")]
    Shape(String),
    #[error("Inference failed: {0}")]
    Run(String),
    #[error("Classifier produced a non-finite score for '{label}'")]
    NonFiniteScore { label: String },
}

impl From<OrtError> for InferenceError {
    fn from(err: OrtError) -> Self {
        InferenceError::Run(err.to_string())
    }
}

/// Any failure of a single item's classification.
#[derive(Debug, thiserror::Error)]
pub enum ClassificationError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Inference(#[from] InferenceError),
    #[error("Timed out after {after:?} while {stage}")]
    Timeout { stage: String, after: Duration },
    #[error("Classification task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for ClassificationError {
    fn from(err: tokio::task::JoinError) -> Self {
        ClassificationError::Task(err.to_string())
    }
}

/// The builder was given settings no classifier can run with.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
