use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use nsfwsense::{CropStrategy, NormalizeConfig, Normalizer, TensorAdapter};
use std::io::Cursor;
use std::path::Path;

fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 251) as u8, (y % 241) as u8, ((x ^ y) % 256) as u8])
    });
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("Normalize");

    // Configure sampling
    group.sample_size(20);
    group.warm_up_time(std::time::Duration::from_secs(1));

    let inputs = [
        ("small_png", encoded_image(320, 240, ImageFormat::Png)),
        ("photo_jpeg", encoded_image(1920, 1080, ImageFormat::Jpeg)),
        ("tall_png", encoded_image(200, 3000, ImageFormat::Png)),
    ];

    let normalizer = Normalizer::default();
    for (name, bytes) in &inputs {
        group.bench_function(*name, |b| b.iter(|| {
            normalizer.normalize_bytes(black_box(bytes), Path::new(name)).unwrap()
        }));
    }

    let centre = Normalizer::new(NormalizeConfig {
        crop: CropStrategy::Center,
        ..NormalizeConfig::default()
    });
    group.bench_function("photo_jpeg_center_crop", |b| b.iter(|| {
        centre.normalize_bytes(black_box(&inputs[1].1), Path::new("photo")).unwrap()
    }));

    group.finish();
}

fn bench_adapt(c: &mut Criterion) {
    let mut group = c.benchmark_group("Adapt");
    group.sample_size(50);

    let normalized = Normalizer::default()
        .normalize_bytes(&encoded_image(640, 480, ImageFormat::Png), Path::new("adapt"))
        .unwrap();
    let adapter = TensorAdapter::new(299, 299);

    group.bench_function("normalized_to_tensor", |b| b.iter(|| {
        let mut tensor = adapter.adapt(black_box(&normalized)).unwrap();
        tensor.release();
    }));

    group.finish();
}

criterion_group!(benches, bench_normalize, bench_adapt);
criterion_main!(benches);
