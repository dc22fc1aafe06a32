use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use super::error::ClassificationError;
use super::prediction::{BatchResult, ClassificationResult, ItemState, PredictionVector};
use super::ClassifierInfo;
use crate::normalize::{ImageNormalizer, ImageSource};
use crate::session::InferenceSession;
use crate::tensor::TensorAdapter;

/// Drives images through normalization, tensor adaptation and inference.
///
/// Cheap to clone; clones share the session, the normalizer and the
/// concurrency limit.
///
/// # Example
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// use nsfwsense::{Classifier, ImageSource};
///
/// let classifier = Classifier::builder().build()?;
/// let batch = classifier
///     .classify_many(vec![
///         ImageSource::new("/tmp/upload-a", "beach.jpg"),
///         ImageSource::new("/tmp/upload-b", "sketch.png"),
///     ])
///     .await;
/// for result in batch.iter() {
///     println!("{}: {:?}", result.filename(), result.prediction());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Classifier {
    pub(super) normalizer: Arc<dyn ImageNormalizer>,
    pub(super) adapter: TensorAdapter,
    pub(super) session: Arc<InferenceSession>,
    pub(super) limiter: Option<Arc<Semaphore>>,
    pub(super) max_concurrency: Option<usize>,
    pub(super) item_timeout: Option<Duration>,
}

/// A concurrency slot shared with any blocking work the item has started, so
/// the slot frees only once that work is done, even after a timeout.
type HeldPermit = Option<Arc<OwnedSemaphorePermit>>;

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    pub fn info(&self) -> ClassifierInfo {
        let (target_width, target_height) = self.normalizer.target_size();
        ClassifierInfo {
            target_width,
            target_height,
            max_concurrency: self.max_concurrency,
            item_timeout: self.item_timeout,
            model_loaded: self.session.is_loaded(),
        }
    }

    pub fn session(&self) -> &Arc<InferenceSession> {
        &self.session
    }

    /// Classifies one image, surfacing the first failure.
    ///
    /// The tensor built for the image is released before this returns, on
    /// every path. The source file is only read.
    pub async fn try_classify_one(&self, source: &ImageSource) -> Result<PredictionVector, ClassificationError> {
        self.classify_holding(source, None).await
    }

    /// Classifies one image, capturing any failure in the result.
    pub async fn classify_one(&self, source: &ImageSource) -> ClassificationResult {
        self.capture(source, None).await
    }

    async fn capture(&self, source: &ImageSource, permit: HeldPermit) -> ClassificationResult {
        let outcome = self.classify_holding(source, permit).await;
        match &outcome {
            Ok(prediction) => log::debug!("{}: mostly {}", source.filename, prediction.top()),
            Err(e) => log::warn!("Classification failed for {}: {}", source.filename, e),
        }
        ClassificationResult::from_outcome(source.filename.clone(), outcome)
    }

    async fn classify_holding(
        &self,
        source: &ImageSource,
        permit: HeldPermit,
    ) -> Result<PredictionVector, ClassificationError> {
        let state = Arc::new(AtomicU8::new(ItemState::Pending.as_u8()));
        let work = self.run(source.clone(), Arc::clone(&state), permit);

        match self.item_timeout {
            None => work.await,
            Some(after) => match tokio::time::timeout(after, work).await {
                Ok(result) => result,
                Err(_) => {
                    let stage = ItemState::from_u8(state.load(Ordering::SeqCst));
                    log::warn!("{}: timed out after {:?} while {}", source.filename, after, stage);
                    Err(ClassificationError::Timeout {
                        stage: stage.to_string(),
                        after,
                    })
                }
            },
        }
    }

    /// Classifies every source concurrently. The result has one entry per
    /// source, in input order, whatever order the items finish in.
    pub async fn classify_many(&self, sources: Vec<ImageSource>) -> BatchResult {
        let started = Instant::now();
        let total = sources.len();

        let handles: Vec<(String, JoinHandle<ClassificationResult>)> = sources
            .into_iter()
            .map(|source| {
                let filename = source.filename.clone();
                let this = self.clone();
                let handle = tokio::spawn(async move {
                    let permit = match &this.limiter {
                        Some(limiter) => match Arc::clone(limiter).acquire_owned().await {
                            Ok(permit) => Some(Arc::new(permit)),
                            Err(e) => {
                                return ClassificationResult::from_outcome(
                                    source.filename,
                                    Err(ClassificationError::Task(e.to_string())),
                                )
                            }
                        },
                        None => None,
                    };
                    this.capture(&source, permit).await
                });
                (filename, handle)
            })
            .collect();

        let mut results = Vec::with_capacity(total);
        for (filename, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => {
                    log::error!("Classification task for {} did not complete: {}", filename, e);
                    ClassificationResult::from_outcome(filename, Err(e.into()))
                }
            };
            results.push(result);
        }

        let batch = BatchResult { results };
        log::info!(
            "Classified batch of {} in {:?}: {} succeeded, {} failed",
            total,
            started.elapsed(),
            batch.success_count(),
            batch.failure_count()
        );
        batch
    }

    async fn run(
        &self,
        source: ImageSource,
        state: Arc<AtomicU8>,
        permit: HeldPermit,
    ) -> Result<PredictionVector, ClassificationError> {
        let result = self.stages(&source, &state, permit).await;
        let done = if result.is_ok() { ItemState::Succeeded } else { ItemState::Failed };
        transition(&state, &source, done);
        result
    }

    async fn stages(
        &self,
        source: &ImageSource,
        state: &AtomicU8,
        permit: HeldPermit,
    ) -> Result<PredictionVector, ClassificationError> {
        let classifier = self.session.ensure_loaded().await?;

        transition(state, source, ItemState::Normalizing);
        let normalizer = Arc::clone(&self.normalizer);
        let adapter = self.adapter.clone();
        let owned = source.clone();
        let held = permit.clone();
        let tensor = tokio::task::spawn_blocking(move || {
            let _held = held;
            let normalized = normalizer.normalize(&owned)?;
            adapter.adapt(&normalized)
        })
        .await??;
        transition(state, source, ItemState::Adapted);

        transition(state, source, ItemState::Classifying);
        let scores = tokio::task::spawn_blocking(move || {
            let _held = permit;
            let mut tensor = tensor;
            let scores = classifier.classify(&tensor);
            tensor.release();
            scores
        })
        .await??;

        Ok(PredictionVector::from_scores(&scores)?)
    }
}

fn transition(state: &AtomicU8, source: &ImageSource, next: ItemState) {
    let previous = ItemState::from_u8(state.swap(next.as_u8(), Ordering::SeqCst));
    log::debug!("{}: {} -> {}", source.filename, previous, next);
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("adapter", &self.adapter)
            .field("session", &self.session)
            .field("max_concurrency", &self.max_concurrency)
            .field("item_timeout", &self.item_timeout)
            .finish()
    }
}
