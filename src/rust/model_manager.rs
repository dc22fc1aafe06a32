use std::path::{Path, PathBuf};
use std::fs;
use std::io;
use std::sync::Arc;
use std::env;
use tokio::sync::Mutex;
use reqwest;
use sha2::{Sha256, Digest};
use dirs;
use log;

use crate::models::ModelSource;

pub const MODEL_FILE: &str = "model.onnx";
pub const LABELS_FILE: &str = "labels.json";

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model not downloaded: {0}")]
    NotDownloaded(String),
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Model verification failed")]
    VerificationFailed,
    #[error("Hash mismatch: expected {expected}, got {actual} for {file_type} file")]
    HashMismatch {
        file_type: String,
        expected: String,
        actual: String,
    },
}

/// Lowercase hex SHA-256 of `bytes`.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Owns the on-disk model cache: `<models_dir>/<name>/model.onnx` plus an
/// optional `labels.json` next to it.
#[derive(Clone, Debug)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        Self::models_dir_under(env::var("NSFWSENSE_CACHE").ok())
    }

    fn models_dir_under(cache_override: Option<String>) -> PathBuf {
        // 1. Explicit cache root
        if let Some(path) = cache_override {
            return PathBuf::from(path).join("models");
        }

        // 2. Use platform-specific cache directory
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("nsfwsense").join("models");
        }

        // 3. Fallback to user's home directory
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("nsfwsense").join("models");
        }

        // 4. If all else fails, use system temp directory (platform agnostic)
        env::temp_dir().join("nsfwsense").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_dir(&self, name: &str) -> PathBuf {
        self.models_dir.join(name)
    }

    pub fn get_model_path(&self, name: &str) -> PathBuf {
        self.get_model_dir(name).join(MODEL_FILE)
    }

    pub fn get_labels_path(&self, name: &str) -> PathBuf {
        self.get_model_dir(name).join(LABELS_FILE)
    }

    pub fn is_model_downloaded(&self, name: &str) -> bool {
        let model_path = self.get_model_path(name);
        log::debug!("Model path: {:?} (exists: {})", model_path, model_path.exists());
        model_path.exists()
    }

    fn verify_file(&self, path: &Path, expected_hash: &str) -> Result<bool, ModelError> {
        let bytes = fs::read(path)?;
        let hash = sha256_hex(&bytes);
        log::debug!("Verifying {:?}: {} bytes, hash {}, expected {}", path, bytes.len(), hash, expected_hash);
        Ok(hash.eq_ignore_ascii_case(expected_hash))
    }

    pub fn verify_model(&self, source: &ModelSource) -> Result<bool, ModelError> {
        let model_path = self.get_model_path(&source.name);
        if !model_path.exists() {
            log::info!("Model file {:?} does not exist", model_path);
            return Ok(false);
        }

        let ok = self.verify_file(&model_path, &source.sha256)?;
        log::info!("Model hash verification for '{}': {}", source.name, ok);
        Ok(ok)
    }

    pub async fn download_model(&self, source: &ModelSource) -> Result<(), ModelError> {
        let _lock = self.download_lock.lock().await;

        let model_dir = self.get_model_dir(&source.name);
        log::info!("Creating model directory at {:?}", model_dir);
        fs::create_dir_all(&model_dir)?;

        let model_path = self.get_model_path(&source.name);
        if model_path.exists() && self.verify_file(&model_path, &source.sha256)? {
            log::info!("Existing model file verified successfully");
            return Ok(());
        }

        match self.download_and_verify_file(&source.url, &model_path, &source.sha256, "model").await {
            Ok(()) => {
                log::info!("Model '{}' ready to use", source.name);
                Ok(())
            }
            Err(e) => {
                log::error!("Failed to setup model file: {}", e);
                // Cleanup on failure
                let _ = self.remove_download(&source.name);
                Err(e)
            }
        }
    }

    async fn download_and_verify_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: &str,
        file_type: &str,
    ) -> Result<(), ModelError> {
        log::info!("Downloading {} file from {} to {:?}", file_type, url, path);
        let response = reqwest::get(url).await?.error_for_status()?;
        log::info!("Download response status: {}", response.status());
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        let hash = sha256_hex(&bytes);
        if !hash.eq_ignore_ascii_case(expected_hash) {
            log::error!("{} hash mismatch: expected {}, got {}", file_type, expected_hash, hash);
            return Err(ModelError::HashMismatch {
                file_type: file_type.to_string(),
                expected: expected_hash.to_string(),
                actual: hash,
            });
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, &bytes)?;

        if !self.verify_file(path, expected_hash)? {
            return Err(ModelError::VerificationFailed);
        }

        log::info!("{} file downloaded and verified successfully", file_type);
        Ok(())
    }

    /// Deletes the model file and its labels, if present.
    pub fn remove_download(&self, name: &str) -> Result<(), ModelError> {
        for path in [self.get_model_path(name), self.get_labels_path(name)] {
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    /// Ensures that a model is downloaded and verified.
    /// If the model doesn't exist, it will be downloaded.
    /// If verification fails, it will be re-downloaded.
    pub async fn ensure_model_downloaded(&self, source: &ModelSource) -> Result<(), ModelError> {
        log::info!("Checking if model '{}' is downloaded...", source.name);
        if !self.is_model_downloaded(&source.name) {
            log::info!("Model not found, downloading...");
            self.download_model(source).await?;
        } else if !self.verify_model(source)? {
            log::info!("Model verification failed, re-downloading...");
            self.remove_download(&source.name)?;
            self.download_model(source).await?;
        } else {
            log::info!("Model verification successful");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn source(name: &str, sha256: &str) -> ModelSource {
        ModelSource {
            name: name.to_string(),
            // Nothing listens on the discard port, so downloads fail fast.
            url: "http://127.0.0.1:9/model.onnx".to_string(),
            sha256: sha256.to_string(),
        }
    }

    #[test]
    fn test_paths() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path()).unwrap();
        assert_eq!(manager.get_model_path("inception_v3"), dir.path().join("inception_v3").join("model.onnx"));
        assert_eq!(manager.get_labels_path("inception_v3"), dir.path().join("inception_v3").join("labels.json"));
        assert!(!manager.is_model_downloaded("inception_v3"));
    }

    #[test]
    fn test_verify_and_remove() -> Result<(), ModelError> {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path())?;
        fs::create_dir_all(manager.get_model_dir("tiny"))?;
        fs::write(manager.get_model_path("tiny"), b"onnx bytes")?;
        fs::write(manager.get_labels_path("tiny"), b"[\"Neutral\"]")?;

        let good = source("tiny", &sha256_hex(b"onnx bytes"));
        assert!(manager.is_model_downloaded("tiny"));
        assert!(manager.verify_model(&good)?);
        assert!(!manager.verify_model(&source("tiny", &sha256_hex(b"other")))?);

        manager.remove_download("tiny")?;
        assert!(!manager.is_model_downloaded("tiny"));
        assert!(!manager.get_labels_path("tiny").exists());
        assert!(!manager.verify_model(&good)?);
        Ok(())
    }

    #[tokio::test]
    async fn test_ensure_skips_download_when_verified() -> Result<(), ModelError> {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path())?;
        fs::create_dir_all(manager.get_model_dir("cached"))?;
        fs::write(manager.get_model_path("cached"), b"cached model")?;

        manager.ensure_model_downloaded(&source("cached", &sha256_hex(b"cached model"))).await?;
        assert_eq!(fs::read(manager.get_model_path("cached"))?, b"cached model");
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_download_cleans_up() {
        let dir = TempDir::new().unwrap();
        let manager = ModelManager::new(dir.path()).unwrap();
        fs::create_dir_all(manager.get_model_dir("stale")).unwrap();
        fs::write(manager.get_model_path("stale"), b"stale").unwrap();

        let result = manager.ensure_model_downloaded(&source("stale", &sha256_hex(b"fresh"))).await;
        assert!(matches!(result, Err(ModelError::DownloadError(_))));
        assert!(!manager.is_model_downloaded("stale"));
    }

    #[test]
    fn test_default_models_dir() {
        let path = ModelManager::models_dir_under(Some("/tmp/test-cache".to_string()));
        assert_eq!(path, PathBuf::from("/tmp/test-cache/models"));

        let path = ModelManager::models_dir_under(None);
        assert!(path.to_string_lossy().contains("nsfwsense"));
    }
}
