//! Criterion benchmarks for convimg critical paths
//!
//! Benchmarks the core performance-critical operations:
//! - Compression: ZX7, ZX0 and LZ4 over sprite-like data
//! - Quantization: median cut over gradient histograms
//! - Remapping: nearest-color lookup with and without dithering
//! - Encoding: RLE transparency rows and bpp packing

use convimg::color::Color;
use convimg::compress::{compress, CompressMode};
use convimg::convert::transform::{encode_rlet_row, pack_indices};
use convimg::convert::Bpp;
use convimg::quantize::{remap, Histogram, MedianCut, Quantizer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use image::{Rgba, RgbaImage};

// =============================================================================
// Test Data Generators
// =============================================================================

/// Palette indices resembling a sprite: long runs with some noise.
fn make_sprite_data(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491u32;
    (0..len)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if state % 8 == 0 {
                (state >> 8) as u8
            } else {
                (i / 24) as u8
            }
        })
        .collect()
}

fn make_gradient(size: u32) -> RgbaImage {
    RgbaImage::from_fn(size, size, |x, y| {
        Rgba([(x * 255 / size) as u8, (y * 255 / size) as u8, 128, 255])
    })
}

fn make_palette(n: usize) -> Vec<(u8, Color)> {
    (0..n).map(|i| (i as u8, Color::new((i * 37) as u8, (i * 91) as u8, (i * 13) as u8))).collect()
}

// =============================================================================
// Compression Benchmarks
// =============================================================================

fn bench_compression(c: &mut Criterion) {
    let mut group = c.benchmark_group("compression");

    for size in [1024usize, 16384] {
        let data = make_sprite_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        for mode in [CompressMode::Zx7, CompressMode::Zx0, CompressMode::Lz4] {
            group.bench_with_input(BenchmarkId::new(mode.to_string(), size), &data, |b, data| {
                b.iter(|| compress(mode, black_box(data)))
            });
        }
    }

    group.finish();
}

// =============================================================================
// Quantization Benchmarks
// =============================================================================

fn bench_quantize(c: &mut Criterion) {
    let mut group = c.benchmark_group("quantize");

    for size in [64u32, 128] {
        let image = make_gradient(size);
        let mut histogram = Histogram::new();
        histogram.add_rgba(image.as_raw()).unwrap();

        for speed in [1u8, 10] {
            group.bench_with_input(
                BenchmarkId::new(format!("median_cut_speed_{}", speed), size),
                &histogram,
                |b, histogram| b.iter(|| MedianCut.quantize(black_box(histogram), &[], 256, speed)),
            );
        }
    }

    group.finish();
}

// =============================================================================
// Remap Benchmarks
// =============================================================================

fn bench_remap(c: &mut Criterion) {
    let mut group = c.benchmark_group("remap");
    let image = make_gradient(64);
    let palette = make_palette(256);
    group.throughput(Throughput::Elements(64 * 64));

    group.bench_function("nearest_64x64", |b| b.iter(|| remap(black_box(&image), &palette, 0.0)));
    group.bench_function("dithered_64x64", |b| b.iter(|| remap(black_box(&image), &palette, 1.0)));

    group.finish();
}

// =============================================================================
// Encoding Benchmarks
// =============================================================================

fn bench_encoding(c: &mut Criterion) {
    let mut group = c.benchmark_group("encoding");
    let row: Vec<u8> = (0..255)
        .map(|i| if (i / 16) % 2 == 0 { 0 } else { (i % 7) as u8 + 1 })
        .collect();
    let data = make_sprite_data(255 * 255).iter().map(|b| b & 1).collect::<Vec<u8>>();

    group.bench_function("rlet_row_255", |b| {
        b.iter(|| {
            let mut out = Vec::with_capacity(512);
            encode_rlet_row(black_box(&row), 0, &mut out);
            out
        })
    });
    group.bench_function("pack_1bpp_255x255", |b| {
        b.iter(|| pack_indices(black_box(&data), Bpp::One))
    });

    group.finish();
}

criterion_group!(benches, bench_compression, bench_quantize, bench_remap, bench_encoding);
criterion_main!(benches);
