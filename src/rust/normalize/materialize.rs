use image::{imageops, DynamicImage, ImageFormat, ImageResult, Rgba, RgbImage, RgbaImage};
use std::io::Cursor;
use std::path::Path;

use crate::classifier::error::DecodeError;

/// Primary path: round-trips the pixels through the PNG codec and draws them
/// onto an opaque in-memory canvas of the same size.
pub fn draw_on_canvas(img: &RgbImage) -> ImageResult<RgbImage> {
    let (w, h) = img.dimensions();

    let mut encoded = Vec::new();
    img.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;
    let decoded = image::load_from_memory_with_format(&encoded, ImageFormat::Png)?.to_rgba8();

    let mut canvas = RgbaImage::from_pixel(w, h, Rgba([0, 0, 0, 255]));
    imageops::overlay(&mut canvas, &decoded, 0, 0);
    Ok(DynamicImage::ImageRgba8(canvas).to_rgb8())
}

/// Fallback path: rebuilds the image straight from its raw RGB bytes.
pub fn reconstruct_from_raw(width: u32, height: u32, raw: Vec<u8>) -> Option<RgbImage> {
    RgbImage::from_raw(width, height, raw)
}

pub fn materialize(img: RgbImage, path: &Path) -> Result<RgbImage, DecodeError> {
    materialize_with(img, path, draw_on_canvas)
}

/// Runs `primary`, and if it fails or changes the geometry, reconstructs the
/// image from raw pixel data instead.
pub fn materialize_with<F>(img: RgbImage, path: &Path, primary: F) -> Result<RgbImage, DecodeError>
where
    F: FnOnce(&RgbImage) -> ImageResult<RgbImage>,
{
    let (w, h) = img.dimensions();

    match primary(&img) {
        Ok(drawn) if drawn.dimensions() == (w, h) => return Ok(drawn),
        Ok(drawn) => log::warn!(
            "Canvas draw for {:?} produced {:?}, expected {:?}; rebuilding from raw pixels",
            path,
            drawn.dimensions(),
            (w, h)
        ),
        Err(e) => log::warn!("Canvas draw failed for {:?}: {}; rebuilding from raw pixels", path, e),
    }

    reconstruct_from_raw(w, h, img.into_raw()).ok_or_else(|| DecodeError::Materialize {
        path: path.to_path_buf(),
        message: format!("raw pixel buffer does not hold {}x{} RGB pixels", w, h),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::ImageError;
    use image::Rgb;

    fn sample() -> RgbImage {
        let mut img = RgbImage::from_pixel(8, 4, Rgb([10, 20, 30]));
        img.put_pixel(7, 3, Rgb([250, 1, 2]));
        img
    }

    #[test]
    fn test_primary_path_preserves_pixels() {
        let img = sample();
        let out = materialize(img.clone(), Path::new("a.png")).unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_failing_primary_falls_back_to_raw() {
        let img = sample();
        let out = materialize_with(img.clone(), Path::new("a.png"), |_| {
            Err(ImageError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                "canvas unavailable",
            )))
        })
        .unwrap();
        assert_eq!(out, img);
    }

    #[test]
    fn test_wrong_geometry_falls_back_to_raw() {
        let img = sample();
        let out = materialize_with(img.clone(), Path::new("a.png"), |_| Ok(RgbImage::new(1, 1))).unwrap();
        assert_eq!(out.dimensions(), (8, 4));
        assert_eq!(out, img);
    }

    #[test]
    fn test_raw_reconstruction_rejects_short_buffer() {
        assert!(reconstruct_from_raw(4, 4, vec![0; 10]).is_none());
    }
}
