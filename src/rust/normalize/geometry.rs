//! "Cover" geometry: scale so the shorter side fills the target, crop the rest.
//!
//! The crop window is chosen in source coordinates first and only the window is
//! resampled, so extreme aspect ratios never allocate a huge intermediate.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GenericImageView, Rgba32FImage, RgbImage};

use crate::config::{CropStrategy, NormalizeConfig};

/// Shorter side of the low-resolution proxy the saliency map is computed on.
const SALIENCY_PROXY_SHORT_SIDE: u32 = 64;

/// Crops larger than this multiple of the target are box-shrunk before the
/// high-quality resample.
const PRE_SHRINK_FACTOR: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropWindow {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Size of the largest window with the target's aspect ratio that fits the source.
pub fn cover_extent(src_w: u32, src_h: u32, target_w: u32, target_h: u32) -> (u32, u32) {
    let (sw, sh) = (src_w as u64, src_h as u64);
    let (tw, th) = (target_w as u64, target_h as u64);

    if sw * th > sh * tw {
        let w = ((sh * tw + th / 2) / th).clamp(1, sw);
        (w as u32, src_h)
    } else {
        let h = ((sw * th + tw / 2) / tw).clamp(1, sh);
        (src_w, h as u32)
    }
}

pub fn center_offset(len: u32, window: u32) -> u32 {
    len.saturating_sub(window) / 2
}

/// Start of the `window`-long run with the highest total energy.
///
/// Returns `None` when every placement scores the same (flat images), so the
/// caller can fall back to a centre crop. Ties go to the placement nearest the
/// centre.
pub fn attention_offset(energy: &[f64], window: usize) -> Option<usize> {
    if window == 0 || window >= energy.len() {
        return None;
    }

    let mut prefix = Vec::with_capacity(energy.len() + 1);
    prefix.push(0.0f64);
    for value in energy {
        let last = *prefix.last().unwrap_or(&0.0);
        prefix.push(last + value);
    }

    let sums: Vec<f64> = (0..=energy.len() - window)
        .map(|start| prefix[start + window] - prefix[start])
        .collect();

    let best = sums.iter().cloned().fold(f64::MIN, f64::max);
    let worst = sums.iter().cloned().fold(f64::MAX, f64::min);
    let tolerance = 1e-6 * best.abs().max(1.0);
    if best - worst <= tolerance {
        return None;
    }

    let centre = (energy.len() - window) as f64 / 2.0;
    sums.iter()
        .enumerate()
        .filter(|(_, s)| **s >= best - tolerance)
        .min_by(|a, b| {
            let da = (a.0 as f64 - centre).abs();
            let db = (b.0 as f64 - centre).abs();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(start, _)| start)
}

fn luma(p: &[u8]) -> f64 {
    0.2126 * p[0] as f64 + 0.7152 * p[1] as f64 + 0.0722 * p[2] as f64
}

fn is_skin(p: &[u8]) -> bool {
    let (r, g, b) = (p[0] as i32, p[1] as i32, p[2] as i32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    r > 95 && g > 40 && b > 20 && max - min > 15 && (r - g).abs() > 15 && r > g && r > b
}

/// Per-pixel interest: luminance edges, saturation and skin tone.
fn pixel_energy(img: &RgbImage, x: u32, y: u32) -> f64 {
    let p = img.get_pixel(x, y).0;
    let l = luma(&p);
    let dx = if x + 1 < img.width() { (luma(&img.get_pixel(x + 1, y).0) - l).abs() } else { 0.0 };
    let dy = if y + 1 < img.height() { (luma(&img.get_pixel(x, y + 1).0) - l).abs() } else { 0.0 };

    let max = p[0].max(p[1]).max(p[2]) as f64;
    let min = p[0].min(p[1]).min(p[2]) as f64;
    let saturation = max - min;
    let skin = if is_skin(&p) { 128.0 } else { 0.0 };

    dx + dy + 0.5 * saturation + skin
}

/// Energy summed across the axis the crop does not move along.
pub fn energy_profile(img: &RgbImage, horizontal: bool) -> Vec<f64> {
    let (w, h) = img.dimensions();
    if horizontal {
        (0..w).map(|x| (0..h).map(|y| pixel_energy(img, x, y)).sum()).collect()
    } else {
        (0..h).map(|y| (0..w).map(|x| pixel_energy(img, x, y)).sum()).collect()
    }
}

/// Picks the crop window for `img`, honouring the configured strategy.
pub fn select_crop(img: &DynamicImage, config: &NormalizeConfig) -> CropWindow {
    let (src_w, src_h) = img.dimensions();
    let (crop_w, crop_h) = cover_extent(src_w, src_h, config.target_width, config.target_height);
    let horizontal = crop_w < src_w;
    let vertical = crop_h < src_h;

    let mut window = CropWindow {
        x: center_offset(src_w, crop_w),
        y: center_offset(src_h, crop_h),
        width: crop_w,
        height: crop_h,
    };

    if config.crop == CropStrategy::Center || !(horizontal || vertical) {
        return window;
    }

    let short = src_w.min(src_h);
    let scale = (SALIENCY_PROXY_SHORT_SIDE as f64 / short as f64).min(1.0);
    let proxy_w = ((src_w as f64 * scale).round() as u32).max(1);
    let proxy_h = ((src_h as f64 * scale).round() as u32).max(1);
    let proxy = img.resize_exact(proxy_w, proxy_h, FilterType::Triangle).to_rgb8();

    let (len, crop_len, proxy_len) = if horizontal {
        (src_w, crop_w, proxy_w)
    } else {
        (src_h, crop_h, proxy_h)
    };
    let proxy_window = ((crop_len as f64 * scale).round() as usize).clamp(1, proxy_len as usize);
    let profile = energy_profile(&proxy, horizontal);

    match attention_offset(&profile, proxy_window) {
        Some(start) => {
            let offset = ((start as f64 / scale).round() as u32).min(len - crop_len);
            if horizontal {
                window.x = offset;
            } else {
                window.y = offset;
            }
        }
        None => log::debug!("No salient region found, using centre crop"),
    }

    window
}

/// Crops and resamples to exactly the target size, in linear light.
///
/// The result keeps the alpha channel; colour normalization strips it.
pub fn cover(img: &DynamicImage, config: &NormalizeConfig) -> Rgba32FImage {
    let (tw, th) = (config.target_width, config.target_height);
    let window = select_crop(img, config);
    let mut cropped = img.crop_imm(window.x, window.y, window.width, window.height);

    if window.width > tw * PRE_SHRINK_FACTOR && window.height > th * PRE_SHRINK_FACTOR {
        cropped = cropped.resize_exact(tw * PRE_SHRINK_FACTOR, th * PRE_SHRINK_FACTOR, FilterType::Triangle);
    }

    let mut linear = cropped.to_rgba32f();
    if (config.gamma - 1.0).abs() > f32::EPSILON {
        for pixel in linear.pixels_mut() {
            for c in pixel.0.iter_mut().take(3) {
                *c = c.max(0.0).powf(config.gamma);
            }
        }
    }

    imageops::resize(&linear, tw, th, config.effective_filter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_cover_extent() {
        assert_eq!(cover_extent(4000, 2000, 299, 299), (2000, 2000));
        assert_eq!(cover_extent(50, 800, 299, 299), (50, 50));
        assert_eq!(cover_extent(300, 300, 299, 299), (300, 300));
        assert_eq!(cover_extent(1, 100_000, 299, 299), (1, 1));
    }

    #[test]
    fn test_attention_offset_finds_peak() {
        let mut energy = vec![0.0; 20];
        energy[15] = 10.0;
        energy[16] = 10.0;
        let start = attention_offset(&energy, 4).unwrap();
        assert!(start <= 15 && start + 4 >= 17);
    }

    #[test]
    fn test_attention_offset_flat_is_none() {
        assert_eq!(attention_offset(&[1.0; 10], 4), None);
        assert_eq!(attention_offset(&[1.0; 4], 4), None);
    }

    #[test]
    fn test_select_crop_follows_detail() {
        // Flat grey landscape with a busy checkerboard on the right edge.
        let mut img = RgbImage::from_pixel(400, 100, Rgb([128, 128, 128]));
        for x in 300..400 {
            for y in 0..100 {
                let v = if (x / 4 + y / 4) % 2 == 0 { 0 } else { 255 };
                img.put_pixel(x, y, Rgb([v, v, v]));
            }
        }
        let window = select_crop(&DynamicImage::ImageRgb8(img), &NormalizeConfig::default());
        assert_eq!((window.width, window.height), (100, 100));
        assert!(window.x >= 250, "crop started at {}", window.x);
    }

    #[test]
    fn test_flat_image_falls_back_to_center() {
        let img = RgbImage::from_pixel(400, 100, Rgb([10, 10, 10]));
        let window = select_crop(&DynamicImage::ImageRgb8(img), &NormalizeConfig::default());
        assert_eq!(window.x, 150);
    }

    #[test]
    fn test_center_strategy() {
        let mut img = RgbImage::from_pixel(100, 300, Rgb([128, 128, 128]));
        img.put_pixel(50, 2, Rgb([255, 0, 0]));
        let config = NormalizeConfig {
            crop: CropStrategy::Center,
            ..NormalizeConfig::default()
        };
        let window = select_crop(&DynamicImage::ImageRgb8(img), &config);
        assert_eq!((window.x, window.y, window.width, window.height), (0, 100, 100, 100));
    }

    #[test]
    fn test_cover_output_is_exact() {
        for (w, h) in [(4000, 2000), (50, 800), (1, 1), (299, 299)] {
            let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([200, 100, 50])));
            let out = cover(&img, &NormalizeConfig::default());
            assert_eq!(out.dimensions(), (299, 299), "input {}x{}", w, h);
        }
    }
}
