//! Turns an arbitrary uploaded image into the fixed-size RGB buffer the
//! classifier consumes.
//!
//! Stages, in order:
//! 1. Format unification: decode, apply EXIF orientation, convert to a
//!    canonical 8-bit pixel layout.
//! 2. Geometry: "cover" crop (saliency-anchored, else centred) and a
//!    high-quality resample in linear light.
//! 3. Colour: back to sRGB, linear gain/offset, percentile contrast stretch,
//!    alpha removed.
//! 4. Materialization: draw through an in-memory canvas, falling back to a
//!    raw-pixel reconstruction.
//! 5. Mild unsharp mask and JPEG encoding.

pub mod color;
pub mod geometry;
pub mod materialize;
pub mod orientation;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, ImageReader, ImageResult, RgbImage};
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::classifier::error::DecodeError;
use crate::config::{NormalizeConfig, SourceFormat};

/// A file to classify and the name it was uploaded under.
///
/// The path is only ever read; its lifetime belongs to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageSource {
    pub path: PathBuf,
    pub filename: String,
}

impl ImageSource {
    pub fn new(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filename: filename.into(),
        }
    }

    /// Uses the path's final component as the filename.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, filename }
    }
}

/// Output of the pipeline: a JPEG-encoded, exactly `width` x `height` RGB image.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    source: PathBuf,
    width: u32,
    height: u32,
    encoded: Vec<u8>,
}

impl NormalizedImage {
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn encoded(&self) -> &[u8] {
        &self.encoded
    }

    pub fn decode(&self) -> ImageResult<RgbImage> {
        Ok(image::load_from_memory_with_format(&self.encoded, image::ImageFormat::Jpeg)?.to_rgb8())
    }
}

/// Anything that can produce a `NormalizedImage` from a source file.
pub trait ImageNormalizer: Send + Sync {
    fn normalize(&self, source: &ImageSource) -> Result<NormalizedImage, DecodeError>;

    /// `(width, height)` of every image this normalizer produces.
    fn target_size(&self) -> (u32, u32);
}

#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizeConfig,
}

impl Normalizer {
    pub fn new(config: NormalizeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizeConfig {
        &self.config
    }

    /// Runs the whole pipeline over already-read file contents.
    /// `path` is only used to attribute errors.
    pub fn normalize_bytes(&self, bytes: &[u8], path: &Path) -> Result<NormalizedImage, DecodeError> {
        let unified = self.unify(bytes, path)?;
        log::debug!("{:?}: decoded {}x{}", path, unified.width(), unified.height());

        let linear = geometry::cover(&unified, &self.config);
        let rgb = color::normalize_color(&linear, &self.config);
        let rgb = materialize::materialize(rgb, path)?;
        let encoded = self.sharpen_and_encode(&rgb, path)?;

        Ok(NormalizedImage {
            source: path.to_path_buf(),
            width: rgb.width(),
            height: rgb.height(),
            encoded,
        })
    }

    fn unify(&self, bytes: &[u8], path: &Path) -> Result<DynamicImage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty { path: path.to_path_buf() });
        }

        if is_heif(bytes) {
            return Err(DecodeError::UnsupportedFormat {
                path: path.to_path_buf(),
                format: SourceFormat::Heic.name().to_string(),
            });
        }

        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|source| DecodeError::Io { path: path.to_path_buf(), source })?;

        let format = reader.format().ok_or_else(|| DecodeError::Corrupt {
            path: path.to_path_buf(),
            message: "unrecognized image signature".into(),
        })?;

        let unsupported = || DecodeError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: format!("{:?}", format).to_lowercase(),
        };
        let source_format = SourceFormat::from_image_format(format).ok_or_else(unsupported)?;
        if !self.config.is_allowed(source_format) || !format.reading_enabled() {
            return Err(unsupported());
        }

        let decoded = reader.decode().map_err(|e| DecodeError::Corrupt {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(DecodeError::Corrupt {
                path: path.to_path_buf(),
                message: "image has no pixels".into(),
            });
        }

        let oriented = orientation::apply_orientation(decoded, orientation::read_exif_orientation(bytes));

        Ok(match oriented {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => oriented,
            other => DynamicImage::ImageRgba8(other.to_rgba8()),
        })
    }

    fn sharpen_and_encode(&self, rgb: &RgbImage, path: &Path) -> Result<Vec<u8>, DecodeError> {
        let sharpened;
        let output = if self.config.sharpen_sigma > 0.0 {
            sharpened = imageops::unsharpen(rgb, self.config.sharpen_sigma, self.config.sharpen_threshold);
            &sharpened
        } else {
            rgb
        };

        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.config.jpeg_quality.clamp(1, 100))
            .encode_image(output)
            .map_err(|e| DecodeError::Encode {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        Ok(encoded)
    }
}

impl ImageNormalizer for Normalizer {
    fn normalize(&self, source: &ImageSource) -> Result<NormalizedImage, DecodeError> {
        let bytes = fs::read(&source.path).map_err(|e| DecodeError::Io {
            path: source.path.clone(),
            source: e,
        })?;
        self.normalize_bytes(&bytes, &source.path)
    }

    fn target_size(&self) -> (u32, u32) {
        (self.config.target_width, self.config.target_height)
    }
}

/// ISO-BMFF `ftyp` brands used by HEIC/HEIF files, which have no decoder here.
fn is_heif(bytes: &[u8]) -> bool {
    const BRANDS: [&[u8; 4]; 6] = [b"heic", b"heix", b"hevc", b"hevx", b"mif1", b"msf1"];
    bytes.len() >= 12 && &bytes[4..8] == b"ftyp" && BRANDS.iter().any(|b| &bytes[8..12] == *b)
}
