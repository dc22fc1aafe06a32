use image::imageops::FilterType;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::model_manager::ModelManager;
use crate::models::BuiltinModel;
use crate::runtime::RuntimeConfig;

/// Edge length of the reference classifier's square input.
pub const DEFAULT_TARGET_SIZE: u32 = 299;

/// Upstream per-request file cap. Informational only, never checked here.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 20;

/// Source codecs the normalizer knows how to recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Heic,
    Bmp,
    Tiff,
    Avif,
}

impl SourceFormat {
    pub const ALL: [SourceFormat; 8] = [
        SourceFormat::Jpeg,
        SourceFormat::Png,
        SourceFormat::Gif,
        SourceFormat::WebP,
        SourceFormat::Heic,
        SourceFormat::Bmp,
        SourceFormat::Tiff,
        SourceFormat::Avif,
    ];

    pub fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(Self::Jpeg),
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Gif => Some(Self::Gif),
            image::ImageFormat::WebP => Some(Self::WebP),
            image::ImageFormat::Bmp => Some(Self::Bmp),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            image::ImageFormat::Avif => Some(Self::Avif),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Gif => "gif",
            Self::WebP => "webp",
            Self::Heic => "heic",
            Self::Bmp => "bmp",
            Self::Tiff => "tiff",
            Self::Avif => "avif",
        }
    }
}

/// How the overflow of a "cover" resize is cropped away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropStrategy {
    /// Keep the window with the most edge, saturation and skin-tone energy.
    /// Falls back to `Center` when the image carries no usable signal.
    Attention,
    Center,
}

/// Per-channel `value * gain + offset`, applied to 0..=255 sRGB values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearTransform {
    pub gain: f32,
    pub offset: f32,
}

impl LinearTransform {
    pub const IDENTITY: LinearTransform = LinearTransform { gain: 1.0, offset: 0.0 };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for LinearTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[derive(Debug, Clone)]
pub struct NormalizeConfig {
    pub target_width: u32,
    pub target_height: u32,
    pub allowed_formats: Vec<SourceFormat>,
    pub resize_filter: FilterType,
    pub crop: CropStrategy,
    /// Resampling happens in linear light using this gamma. 1.0 disables it.
    pub gamma: f32,
    pub linear: LinearTransform,
    /// Lower and upper luminance percentiles mapped to 0 and 255.
    pub clip_percentiles: (f32, f32),
    pub sharpen_sigma: f32,
    pub sharpen_threshold: i32,
    pub jpeg_quality: u8,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            target_width: DEFAULT_TARGET_SIZE,
            target_height: DEFAULT_TARGET_SIZE,
            allowed_formats: SourceFormat::ALL.to_vec(),
            resize_filter: FilterType::Lanczos3,
            crop: CropStrategy::Attention,
            gamma: 2.2,
            linear: LinearTransform::IDENTITY,
            clip_percentiles: (1.0, 99.0),
            sharpen_sigma: 0.5,
            sharpen_threshold: 2,
            jpeg_quality: 90,
        }
    }
}

impl NormalizeConfig {
    /// Resampling kernel actually used. Nearest-neighbour aliases badly enough
    /// to skew classification, so it is swapped for Lanczos3.
    pub fn effective_filter(&self) -> FilterType {
        match self.resize_filter {
            FilterType::Nearest => FilterType::Lanczos3,
            other => other,
        }
    }

    pub fn is_allowed(&self, format: SourceFormat) -> bool {
        self.allowed_formats.contains(&format)
    }
}

#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub models_dir: PathBuf,
    pub model_name: String,
    /// Overrides both `labels.json` and the built-in label order.
    pub labels: Option<Vec<String>>,
    /// Multiplier applied to 0..=255 pixel values before inference.
    pub input_scale: f32,
    pub apply_softmax: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models_dir: ModelManager::get_default_models_dir(),
            model_name: BuiltinModel::InceptionV3.name().to_string(),
            labels: None,
            input_scale: 1.0 / 255.0,
            apply_softmax: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClassifierConfig {
    pub model: ModelConfig,
    pub normalize: NormalizeConfig,
    pub runtime: RuntimeConfig,
    /// Cap on items in flight across all batches. `None` fans out without limit.
    pub max_concurrency: Option<usize>,
    pub item_timeout: Option<Duration>,
    pub max_batch_size: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            normalize: NormalizeConfig::default(),
            runtime: RuntimeConfig::default(),
            max_concurrency: Some(default_concurrency()),
            item_timeout: None,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl ClassifierConfig {
    /// Builds the default configuration, then applies `NSFWSENSE_MODEL`,
    /// `NSFWSENSE_CONCURRENCY` and `NSFWSENSE_ITEM_TIMEOUT_MS`.
    /// `NSFWSENSE_CACHE` is honoured through the default models directory.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Like `from_env`, but reads each variable through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("NSFWSENSE_MODEL") {
            if !name.is_empty() {
                config.model.model_name = name;
            }
        }

        if let Some(value) = lookup("NSFWSENSE_CONCURRENCY") {
            match value.parse::<usize>() {
                Ok(0) => config.max_concurrency = None,
                Ok(n) => config.max_concurrency = Some(n),
                Err(_) => log::warn!("Ignoring invalid NSFWSENSE_CONCURRENCY={:?}", value),
            }
        }

        if let Some(value) = lookup("NSFWSENSE_ITEM_TIMEOUT_MS") {
            match value.parse::<u64>() {
                Ok(0) => config.item_timeout = None,
                Ok(ms) => config.item_timeout = Some(Duration::from_millis(ms)),
                Err(_) => log::warn!("Ignoring invalid NSFWSENSE_ITEM_TIMEOUT_MS={:?}", value),
            }
        }

        config
    }
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
