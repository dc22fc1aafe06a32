//! NSFW image classification: a fixed-geometry normalization pipeline in front
//! of a lazily-loaded, shared ONNX classifier.
//!
//! Every image is decoded, oriented, cover-cropped to 299x299, colour
//! normalized and re-encoded before being wrapped in a tensor and scored
//! against five categories (porn, sexy, hentai, neutral, drawing).
//!
//! # Basic Usage
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use nsfwsense::{Classifier, ImageSource};
//!
//! let classifier = Classifier::builder().build()?;
//!
//! let result = classifier
//!     .classify_one(&ImageSource::new("/tmp/upload-7f3a", "holiday.jpg"))
//!     .await;
//! println!("{}", serde_json::to_string(&result)?);
//! # Ok(())
//! # }
//! ```
//!
//! # Batches
//!
//! `classify_many` runs items concurrently and returns one result per input,
//! in input order. A corrupt file yields an error entry for that file only.
//!
//! ```no_run
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use nsfwsense::{Classifier, ImageSource};
//! use std::time::Duration;
//!
//! let classifier = Classifier::builder()
//!     .with_concurrency(Some(4))
//!     .with_timeout(Some(Duration::from_secs(10)))
//!     .build()?;
//!
//! let batch = classifier
//!     .classify_many(vec![
//!         ImageSource::from_path("a.png"),
//!         ImageSource::from_path("b.webp"),
//!     ])
//!     .await;
//! assert_eq!(batch.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod classifier;
pub mod config;
pub mod model_manager;
pub mod models;
pub mod normalize;
mod runtime;
pub mod session;
pub mod tensor;

pub use classifier::{
    BatchResult, BuildError, Category, ClassificationError, ClassificationResult, Classifier,
    ClassifierBuilder, ClassifierInfo, DecodeError, InferenceError, ItemState, ModelLoadError,
    PredictionVector,
};
pub use config::{ClassifierConfig, CropStrategy, LinearTransform, ModelConfig, NormalizeConfig, SourceFormat};
pub use model_manager::{ModelError, ModelManager};
pub use models::{BuiltinModel, ModelCharacteristics, ModelSource};
pub use normalize::{ImageNormalizer, ImageSource, NormalizedImage, Normalizer};
pub use runtime::{create_session_builder, RuntimeConfig, RuntimeError};
pub use session::{ImageClassifier, InferenceSession, ModelLoader, OnnxClassifier, OnnxModelLoader};
pub use tensor::{ImageTensor, ReleaseHook, TensorAdapter};

pub fn init_logger() {
    env_logger::init();
}
