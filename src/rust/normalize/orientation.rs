use image::DynamicImage;
use std::io::Cursor;

/// Reads the EXIF orientation tag (0x0112). Returns 1 when absent or unreadable.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Rotates/flips pixel data so it is right-side-up.
///
/// 1 = normal, 2 = mirrored, 3 = 180, 4 = flipped vertically,
/// 5 = mirrored + 90 CW, 6 = 90 CW, 7 = mirrored + 270 CW, 8 = 270 CW.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn landscape() -> DynamicImage {
        let mut img = RgbImage::new(4, 2);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_no_exif_is_normal() {
        let mut png = Vec::new();
        landscape()
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(read_exif_orientation(&png), 1);
        assert_eq!(read_exif_orientation(b"not an image"), 1);
    }

    #[test]
    fn test_quarter_turns_swap_dimensions() {
        for orientation in [5, 6, 7, 8] {
            let rotated = apply_orientation(landscape(), orientation);
            assert_eq!((rotated.width(), rotated.height()), (2, 4), "orientation {}", orientation);
        }
        for orientation in [1, 2, 3, 4, 42] {
            let same = apply_orientation(landscape(), orientation);
            assert_eq!((same.width(), same.height()), (4, 2), "orientation {}", orientation);
        }
    }

    #[test]
    fn test_rotate90_moves_top_left_to_top_right() {
        let rotated = apply_orientation(landscape(), 6).to_rgb8();
        assert_eq!(rotated.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }
}
