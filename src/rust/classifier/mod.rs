use std::time::Duration;

pub mod error;
mod prediction;
pub mod builder;
#[allow(clippy::module_inception)]
mod classifier;

pub use error::{BuildError, ClassificationError, DecodeError, InferenceError, ModelLoadError};
pub use prediction::{BatchResult, Category, ClassificationResult, ItemState, PredictionVector};
pub use classifier::Classifier;
pub use builder::ClassifierBuilder;

/// Information about the current state and configuration of a classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierInfo {
    /// Width of the normalized image fed to the model
    pub target_width: u32,
    /// Height of the normalized image fed to the model
    pub target_height: u32,
    /// Items processed at once across all batches, if capped
    pub max_concurrency: Option<usize>,
    /// Deadline for a single item
    pub item_timeout: Option<Duration>,
    /// Whether the shared model has been loaded yet
    pub model_loaded: bool,
}
