use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use super::classifier::Classifier;
use super::error::BuildError;
use crate::config::{ClassifierConfig, NormalizeConfig};
use crate::normalize::{ImageNormalizer, Normalizer};
use crate::session::{InferenceSession, ModelLoader, OnnxModelLoader};
use crate::tensor::{ReleaseHook, TensorAdapter};

/// A builder for constructing a Classifier with a fluent interface.
///
/// Without an explicit session or loader the classifier uses the process-wide
/// `InferenceSession::global()`, unless `with_config` supplied model settings,
/// in which case it gets a private session for that model.
pub struct ClassifierBuilder {
    config: ClassifierConfig,
    custom_model: bool,
    normalizer: Option<Arc<dyn ImageNormalizer>>,
    session: Option<Arc<InferenceSession>>,
    loader: Option<Arc<dyn ModelLoader>>,
    release_hook: Option<ReleaseHook>,
}

impl Default for ClassifierBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifierBuilder {
    /// Starts from `ClassifierConfig::from_env()`.
    pub fn new() -> Self {
        Self {
            config: ClassifierConfig::from_env(),
            custom_model: false,
            normalizer: None,
            session: None,
            loader: None,
            release_hook: None,
        }
    }

    pub fn with_config(mut self, config: ClassifierConfig) -> Self {
        self.config = config;
        self.custom_model = true;
        self
    }

    pub fn with_normalize_config(mut self, config: NormalizeConfig) -> Self {
        self.config.normalize = config;
        self
    }

    /// Replaces the built-in `Normalizer`.
    pub fn with_normalizer(mut self, normalizer: Arc<dyn ImageNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Shares an existing session, e.g. between several classifiers.
    pub fn with_session(mut self, session: Arc<InferenceSession>) -> Self {
        self.session = Some(session);
        self
    }

    /// Gives the classifier a private session around `loader`.
    pub fn with_loader(mut self, loader: Arc<dyn ModelLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Invoked every time one of the classifier's tensors is released.
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release_hook = Some(hook);
        self
    }

    /// Caps how many items are processed at once. `None` removes the cap.
    ///
    /// A timed-out item keeps its slot until its background work finishes.
    pub fn with_concurrency(mut self, limit: Option<usize>) -> Self {
        self.config.max_concurrency = limit;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config.item_timeout = timeout;
        self
    }

    pub fn build(self) -> Result<Classifier, BuildError> {
        let config = self.config;

        if config.max_concurrency == Some(0) {
            return Err(BuildError::InvalidConfig(
                "max_concurrency must be at least 1 (use None for no limit)".to_string(),
            ));
        }
        if config.item_timeout == Some(Duration::ZERO) {
            return Err(BuildError::InvalidConfig("item_timeout must be non-zero".to_string()));
        }

        let normalizer: Arc<dyn ImageNormalizer> = match self.normalizer {
            Some(normalizer) => normalizer,
            None => {
                let normalize = &config.normalize;
                if normalize.target_width == 0 || normalize.target_height == 0 {
                    return Err(BuildError::InvalidConfig(format!(
                        "target size {}x{} is empty",
                        normalize.target_width, normalize.target_height
                    )));
                }
                if !(0.0..=100.0).contains(&normalize.clip_percentiles.0)
                    || !(0.0..=100.0).contains(&normalize.clip_percentiles.1)
                    || normalize.clip_percentiles.0 >= normalize.clip_percentiles.1
                {
                    return Err(BuildError::InvalidConfig(format!(
                        "clip percentiles {:?} must be increasing and within 0..=100",
                        normalize.clip_percentiles
                    )));
                }
                Arc::new(Normalizer::new(config.normalize.clone()))
            }
        };

        let session = match (self.session, self.loader) {
            (Some(session), _) => session,
            (None, Some(loader)) => Arc::new(InferenceSession::new(loader)),
            (None, None) if self.custom_model => Arc::new(InferenceSession::new(Arc::new(
                OnnxModelLoader::new(config.model.clone(), config.runtime.clone()),
            ))),
            (None, None) => InferenceSession::global(),
        };

        let (width, height) = normalizer.target_size();
        let adapter = match self.release_hook {
            Some(hook) => TensorAdapter::new(width, height).with_release_hook(hook),
            None => TensorAdapter::new(width, height),
        };

        log::debug!(
            "Building classifier: {}x{} input, concurrency {:?}, timeout {:?}",
            width,
            height,
            config.max_concurrency,
            config.item_timeout
        );

        Ok(Classifier {
            normalizer,
            adapter,
            session,
            limiter: config.max_concurrency.map(|n| Arc::new(Semaphore::new(n))),
            max_concurrency: config.max_concurrency,
            item_timeout: config.item_timeout,
        })
    }
}

impl std::fmt::Debug for ClassifierBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassifierBuilder")
            .field("config", &self.config)
            .field("custom_model", &self.custom_model)
            .field("has_session", &self.session.is_some())
            .field("has_loader", &self.loader.is_some())
            .finish()
    }
}
