//! Lazily-loaded, shared classifier.
//!
//! `InferenceSession` wraps a `ModelLoader` and guarantees that concurrent
//! first calls trigger exactly one load. Callers that queued behind a failed
//! load get that same failure; later calls try again.

pub mod onnx;

use lazy_static::lazy_static;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::Mutex;

use crate::classifier::error::{InferenceError, ModelLoadError};
use crate::config::ClassifierConfig;
use crate::tensor::ImageTensor;

pub use onnx::{OnnxClassifier, OnnxModelLoader};

/// A loaded model that maps an RGB tensor to per-label scores.
pub trait ImageClassifier: Send + Sync {
    /// Scores keyed by label. Must not mutate or release `tensor`.
    fn classify(&self, tensor: &ImageTensor) -> Result<HashMap<String, f32>, InferenceError>;

    fn labels(&self) -> Vec<String>;
}

/// Produces a ready `ImageClassifier`. Called on the blocking pool.
pub trait ModelLoader: Send + Sync {
    fn load(&self) -> Result<Arc<dyn ImageClassifier>, ModelLoadError>;

    fn describe(&self) -> String {
        "model".to_string()
    }
}

pub struct InferenceSession {
    loader: Arc<dyn ModelLoader>,
    state: Arc<LoadState>,
    /// Serializes load attempts and holds the error of the most recent one.
    load_lock: Arc<Mutex<Option<ModelLoadError>>>,
}

/// Outcome of past loads, shared with the task running the current one.
struct LoadState {
    classifier: OnceLock<Arc<dyn ImageClassifier>>,
    failed_loads: AtomicU64,
    load_attempts: AtomicUsize,
}

lazy_static! {
    static ref GLOBAL_SESSION: Arc<InferenceSession> = {
        let config = ClassifierConfig::from_env();
        Arc::new(InferenceSession::new(Arc::new(OnnxModelLoader::new(
            config.model,
            config.runtime,
        ))))
    };
}

impl InferenceSession {
    pub fn new(loader: Arc<dyn ModelLoader>) -> Self {
        Self {
            loader,
            state: Arc::new(LoadState {
                classifier: OnceLock::new(),
                failed_loads: AtomicU64::new(0),
                load_attempts: AtomicUsize::new(0),
            }),
            load_lock: Arc::new(Mutex::new(None)),
        }
    }

    /// Process-wide session backed by the ONNX model named in the environment.
    pub fn global() -> Arc<InferenceSession> {
        Arc::clone(&GLOBAL_SESSION)
    }

    pub fn is_loaded(&self) -> bool {
        self.state.classifier.get().is_some()
    }

    /// How many times the loader has been invoked.
    pub fn load_count(&self) -> usize {
        self.state.load_attempts.load(Ordering::SeqCst)
    }

    pub fn classifier(&self) -> Option<Arc<dyn ImageClassifier>> {
        self.state.classifier.get().cloned()
    }

    /// Returns the loaded classifier, loading it first if needed.
    ///
    /// The load runs in its own task and holds the load lock until it has
    /// recorded its outcome, so a caller that stops waiting (a timeout, a
    /// dropped future) neither discards the result nor lets a second load
    /// start alongside it.
    pub async fn ensure_loaded(&self) -> Result<Arc<dyn ImageClassifier>, ModelLoadError> {
        if let Some(classifier) = self.state.classifier.get() {
            return Ok(Arc::clone(classifier));
        }

        let failures_seen = self.state.failed_loads.load(Ordering::SeqCst);
        let last_error = Arc::clone(&self.load_lock).lock_owned().await;

        if let Some(classifier) = self.state.classifier.get() {
            return Ok(Arc::clone(classifier));
        }
        // The load we queued behind failed; share its outcome.
        if self.state.failed_loads.load(Ordering::SeqCst) != failures_seen {
            if let Some(err) = last_error.as_ref() {
                return Err(err.clone());
            }
        }

        self.state.load_attempts.fetch_add(1, Ordering::SeqCst);
        let loader = Arc::clone(&self.loader);
        let state = Arc::clone(&self.state);

        let load = tokio::spawn(async move {
            let mut last_error = last_error;
            let description = loader.describe();
            log::info!("Loading {}", description);
            let started = Instant::now();

            let blocking = Arc::clone(&loader);
            let result = match tokio::task::spawn_blocking(move || blocking.load()).await {
                Ok(result) => result,
                Err(e) => Err(ModelLoadError::Task(e.to_string())),
            };

            match result {
                Ok(classifier) => {
                    log::info!("Loaded {} in {:?}", description, started.elapsed());
                    *last_error = None;
                    let stored = state.classifier.get_or_init(|| classifier);
                    Ok(Arc::clone(stored))
                }
                Err(err) => {
                    log::error!("Failed to load {}: {}", description, err);
                    *last_error = Some(err.clone());
                    state.failed_loads.fetch_add(1, Ordering::SeqCst);
                    Err(err)
                }
            }
        });

        match load.await {
            Ok(result) => result,
            Err(e) => Err(ModelLoadError::Task(e.to_string())),
        }
    }
}

impl fmt::Debug for InferenceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InferenceSession")
            .field("model", &self.loader.describe())
            .field("loaded", &self.is_loaded())
            .field("load_count", &self.load_count())
            .finish()
    }
}
