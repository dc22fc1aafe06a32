use image::{Rgba32FImage, RgbImage, RgbaImage};

use crate::config::{LinearTransform, NormalizeConfig};

/// Re-encodes linear-light floats as 8-bit sRGB, keeping alpha.
pub fn to_srgb8(linear: &Rgba32FImage, gamma: f32) -> RgbaImage {
    let inverse = if gamma > 0.0 { 1.0 / gamma } else { 1.0 };
    let (w, h) = linear.dimensions();
    let mut out = RgbaImage::new(w, h);

    for (src, dst) in linear.pixels().zip(out.pixels_mut()) {
        for c in 0..3 {
            let v = src.0[c].clamp(0.0, 1.0).powf(inverse);
            dst.0[c] = (v * 255.0).round() as u8;
        }
        dst.0[3] = (src.0[3].clamp(0.0, 1.0) * 255.0).round() as u8;
    }
    out
}

pub fn apply_linear(img: &mut RgbaImage, transform: LinearTransform) {
    if transform.is_identity() {
        return;
    }
    for pixel in img.pixels_mut() {
        for c in pixel.0.iter_mut().take(3) {
            *c = (*c as f32 * transform.gain + transform.offset).round().clamp(0.0, 255.0) as u8;
        }
    }
}

pub fn luminance_histogram(img: &RgbaImage) -> [u64; 256] {
    let mut histogram = [0u64; 256];
    for pixel in img.pixels() {
        let [r, g, b, _] = pixel.0;
        let l = 0.2126 * r as f32 + 0.7152 * g as f32 + 0.0722 * b as f32;
        histogram[l.round().clamp(0.0, 255.0) as usize] += 1;
    }
    histogram
}

/// Luminance values at the `low` and `high` percentiles of the histogram.
pub fn percentile_bounds(histogram: &[u64; 256], low: f32, high: f32) -> (u8, u8) {
    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return (0, 255);
    }

    let find = |pct: f32| -> u8 {
        let threshold = (total as f64 * (pct.clamp(0.0, 100.0) as f64) / 100.0).ceil().max(1.0) as u64;
        let mut seen = 0u64;
        for (value, count) in histogram.iter().enumerate() {
            seen += count;
            if seen >= threshold {
                return value as u8;
            }
        }
        255
    };

    (find(low), find(high))
}

/// Maps `low..=high` onto `0..=255` on every colour channel.
/// A degenerate range (flat images) leaves the pixels untouched.
pub fn stretch_contrast(img: &mut RgbaImage, low: u8, high: u8) {
    if high <= low {
        return;
    }
    let range = (high - low) as f32;
    for pixel in img.pixels_mut() {
        for c in pixel.0.iter_mut().take(3) {
            let v = (*c as f32 - low as f32) * 255.0 / range;
            *c = v.round().clamp(0.0, 255.0) as u8;
        }
    }
}

pub fn strip_alpha(img: RgbaImage) -> RgbImage {
    let (w, h) = img.dimensions();
    let raw: Vec<u8> = img
        .into_raw()
        .chunks_exact(4)
        .flat_map(|p| [p[0], p[1], p[2]])
        .collect();
    RgbImage::from_vec(w, h, raw).unwrap_or_else(|| RgbImage::new(w, h))
}

/// sRGB, linear transform, percentile contrast stretch, alpha removal.
pub fn normalize_color(linear: &Rgba32FImage, config: &NormalizeConfig) -> RgbImage {
    let mut srgb = to_srgb8(linear, config.gamma);
    apply_linear(&mut srgb, config.linear);

    let (low_pct, high_pct) = config.clip_percentiles;
    let (low, high) = percentile_bounds(&luminance_histogram(&srgb), low_pct, high_pct);
    stretch_contrast(&mut srgb, low, high);

    strip_alpha(srgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_percentiles_ignore_outliers() {
        // 98 mid-grey pixels with one black and one white outlier.
        let mut histogram = [0u64; 256];
        histogram[0] = 1;
        histogram[100] = 49;
        histogram[150] = 49;
        histogram[255] = 1;
        let (low, high) = percentile_bounds(&histogram, 1.0, 99.0);
        assert_eq!((low, high), (0, 150));

        let (low, high) = percentile_bounds(&histogram, 2.0, 98.0);
        assert_eq!((low, high), (100, 150));
    }

    #[test]
    fn test_stretch_expands_range() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([100, 100, 100, 255]));
        img.put_pixel(1, 0, Rgba([150, 150, 150, 255]));
        stretch_contrast(&mut img, 100, 150);
        assert_eq!(img.get_pixel(0, 0).0[..3], [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 0).0[..3], [255, 255, 255]);
    }

    #[test]
    fn test_flat_image_is_untouched() {
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([77, 77, 77, 255]));
        let (low, high) = percentile_bounds(&luminance_histogram(&img), 1.0, 99.0);
        stretch_contrast(&mut img, low, high);
        assert!(img.pixels().all(|p| p.0 == [77, 77, 77, 255]));
    }

    #[test]
    fn test_linear_transform() {
        let mut img = RgbaImage::from_pixel(1, 1, Rgba([100, 200, 10, 255]));
        apply_linear(&mut img, LinearTransform { gain: 1.5, offset: -20.0 });
        assert_eq!(img.get_pixel(0, 0).0, [130, 255, 0, 255]);
    }

    #[test]
    fn test_strip_alpha_keeps_colour() {
        let img = RgbaImage::from_pixel(2, 2, Rgba([1, 2, 3, 0]));
        let rgb = strip_alpha(img);
        assert_eq!(rgb.dimensions(), (2, 2));
        assert!(rgb.pixels().all(|p| p.0 == [1, 2, 3]));
    }

    #[test]
    fn test_gamma_round_trip() {
        let linear = Rgba32FImage::from_pixel(1, 1, image::Rgba([0.6f32.powf(2.2), 0.0, 1.0, 1.0]));
        let srgb = to_srgb8(&linear, 2.2);
        assert_eq!(srgb.get_pixel(0, 0).0, [153, 0, 255, 255]);
    }
}
