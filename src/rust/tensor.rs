use ndarray::{Array3, ArrayView3};
use std::fmt;
use std::sync::Arc;

use crate::classifier::error::DecodeError;
use crate::normalize::NormalizedImage;

/// Called once each time a live tensor is released.
pub type ReleaseHook = Arc<dyn Fn() + Send + Sync>;

/// `[height, width, 3]` RGB pixel values in `0.0..=255.0`.
///
/// Owns its buffer until `release` is called or the value is dropped,
/// whichever comes first. Releasing twice is a no-op.
pub struct ImageTensor {
    data: Option<Array3<f32>>,
    on_release: Option<ReleaseHook>,
}

impl ImageTensor {
    pub fn new(data: Array3<f32>) -> Self {
        Self { data: Some(data), on_release: None }
    }

    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.on_release = Some(hook);
        self
    }

    pub fn view(&self) -> Option<ArrayView3<'_, f32>> {
        self.data.as_ref().map(|d| d.view())
    }

    /// `[height, width, channels]`, or `None` once released.
    pub fn shape(&self) -> Option<[usize; 3]> {
        self.data.as_ref().map(|d| {
            let s = d.shape();
            [s[0], s[1], s[2]]
        })
    }

    pub fn is_released(&self) -> bool {
        self.data.is_none()
    }

    pub fn release(&mut self) {
        if self.data.take().is_some() {
            if let Some(hook) = &self.on_release {
                hook();
            }
        }
    }
}

impl Drop for ImageTensor {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for ImageTensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageTensor")
            .field("shape", &self.shape())
            .field("has_release_hook", &self.on_release.is_some())
            .finish()
    }
}

/// Wraps normalized images into `ImageTensor`s of a fixed geometry.
#[derive(Clone)]
pub struct TensorAdapter {
    width: u32,
    height: u32,
    release_hook: Option<ReleaseHook>,
}

impl TensorAdapter {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, release_hook: None }
    }

    /// Every tensor this adapter creates will invoke `hook` on release.
    pub fn with_release_hook(mut self, hook: ReleaseHook) -> Self {
        self.release_hook = Some(hook);
        self
    }

    pub fn adapt(&self, image: &NormalizedImage) -> Result<ImageTensor, DecodeError> {
        let rgb = image.decode().map_err(|e| DecodeError::Corrupt {
            path: image.source().to_path_buf(),
            message: format!("normalized buffer could not be decoded: {}", e),
        })?;

        if rgb.dimensions() != (self.width, self.height) {
            return Err(DecodeError::Corrupt {
                path: image.source().to_path_buf(),
                message: format!(
                    "normalized image is {}x{}, expected {}x{}",
                    rgb.width(),
                    rgb.height(),
                    self.width,
                    self.height
                ),
            });
        }

        let (w, h) = (self.width as usize, self.height as usize);
        let values: Vec<f32> = rgb.into_raw().into_iter().map(f32::from).collect();
        let data = Array3::from_shape_vec((h, w, 3), values).map_err(|e| DecodeError::Corrupt {
            path: image.source().to_path_buf(),
            message: format!("failed to shape tensor: {}", e),
        })?;

        let tensor = ImageTensor::new(data);
        Ok(match &self.release_hook {
            Some(hook) => tensor.with_release_hook(Arc::clone(hook)),
            None => tensor,
        })
    }
}

impl fmt::Debug for TensorAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TensorAdapter")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}
