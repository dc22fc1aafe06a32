use ort::session::builder::{GraphOptimizationLevel, SessionBuilder};
use ort::session::Session;
use std::sync::OnceLock;

static INIT: OnceLock<Result<(), String>> = OnceLock::new();

#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("Failed to initialize ONNX Runtime environment: {0}")]
    Init(String),
    #[error("Failed to configure ONNX Runtime session: {0}")]
    Builder(String),
}

impl From<ort::Error> for RuntimeError {
    fn from(err: ort::Error) -> Self {
        RuntimeError::Builder(err.to_string())
    }
}

#[derive(Debug)]
pub struct RuntimeConfig {
    pub inter_threads: usize,
    pub intra_threads: usize,
    pub optimization_level: GraphOptimizationLevel,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            inter_threads: 0, // Let ONNX Runtime decide
            intra_threads: 0, // Let ONNX Runtime decide
            optimization_level: GraphOptimizationLevel::Level3,
        }
    }
}

fn copy_level(level: &GraphOptimizationLevel) -> GraphOptimizationLevel {
    match level {
        GraphOptimizationLevel::Level1 => GraphOptimizationLevel::Level1,
        GraphOptimizationLevel::Level2 => GraphOptimizationLevel::Level2,
        GraphOptimizationLevel::Level3 => GraphOptimizationLevel::Level3,
        GraphOptimizationLevel::Disable => GraphOptimizationLevel::Disable,
    }
}

impl Clone for RuntimeConfig {
    fn clone(&self) -> Self {
        Self {
            inter_threads: self.inter_threads,
            intra_threads: self.intra_threads,
            optimization_level: copy_level(&self.optimization_level),
        }
    }
}

/// Commits the process-wide ONNX Runtime environment once. A failed commit is
/// remembered and reported to every later caller.
pub fn ensure_initialized() -> Result<(), RuntimeError> {
    INIT.get_or_init(|| {
        log::debug!("Initializing ONNX Runtime environment");
        ort::init()
            .with_name("nsfwsense")
            .commit()
            .map(|_| ())
            .map_err(|e| e.to_string())
    })
    .clone()
    .map_err(RuntimeError::Init)
}

pub fn create_session_builder(config: &RuntimeConfig) -> Result<SessionBuilder, RuntimeError> {
    ensure_initialized()?;
    let mut builder = Session::builder()?;

    if config.inter_threads > 0 {
        builder = builder.with_inter_threads(config.inter_threads)?;
    }
    if config.intra_threads > 0 {
        builder = builder.with_intra_threads(config.intra_threads)?;
    }

    builder = builder.with_optimization_level(copy_level(&config.optimization_level))?;

    Ok(builder)
}
