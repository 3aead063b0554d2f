//! Color quantization using the median cut algorithm.
//!
//! Provides the quantizer used to build palettes from an image corpus and the
//! remapper that maps pixels onto a finished palette. The quantizer sits
//! behind the [`Quantizer`] trait so a different backend can be plugged in.

use crate::color::Color;
use image::RgbaImage;
use std::collections::BTreeMap;
use thiserror::Error;

/// Maximum number of pixels a single palette may sample.
pub const MAX_PALETTE_PIXELS: u64 = 1 << 28;

/// Errors raised by quantization.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QuantizeError {
    /// More pinned colors than the palette can hold
    #[error("{fixed} fixed colors do not fit in {max} palette entries")]
    TooManyFixedColors { fixed: usize, max: usize },
    /// Corpus exceeds the sampling ceiling
    #[error("too many pixels to quantize (limit is {0})")]
    TooManyPixels(u64),
    /// Nothing to remap against
    #[error("cannot remap against an empty palette")]
    EmptyPalette,
}

/// Color histogram (ordered so quantization is deterministic).
#[derive(Debug, Clone)]
pub struct Histogram {
    colors: BTreeMap<Color, u32>,
    pixels: u64,
    max_pixels: u64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::with_limit(MAX_PALETTE_PIXELS)
    }

    pub fn with_limit(max_pixels: u64) -> Self {
        Self { colors: BTreeMap::new(), pixels: 0, max_pixels }
    }

    /// Add every pixel of an RGBA buffer.
    ///
    /// Alpha is clamped to binary: pixels with alpha below 128 are treated
    /// as fully transparent and not counted.
    pub fn add_rgba(&mut self, rgba: &[u8]) -> Result<(), QuantizeError> {
        let count = (rgba.len() / 4) as u64;
        if self.pixels + count > self.max_pixels {
            return Err(QuantizeError::TooManyPixels(self.max_pixels));
        }
        self.pixels += count;

        for px in rgba.chunks_exact(4) {
            if px[3] < 128 {
                continue;
            }
            *self.colors.entry(Color::new(px[0], px[1], px[2])).or_insert(0) += 1;
        }
        Ok(())
    }

    pub fn add_color(&mut self, color: Color, count: u32) {
        *self.colors.entry(color).or_insert(0) += count;
    }

    /// Number of distinct opaque colors.
    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Total pixels sampled (including transparent ones).
    pub fn pixels(&self) -> u64 {
        self.pixels
    }

    fn entries(&self) -> Vec<(Color, u32)> {
        self.colors.iter().map(|(c, n)| (*c, *n)).collect()
    }
}

/// A palette quantization backend.
pub trait Quantizer: Send + Sync {
    /// Reduce `histogram` to at most `max_colors` colors.
    ///
    /// Every color in `fixed` must appear verbatim in the result.
    /// `speed` ranges 1 (best) to 10 (fastest).
    fn quantize(
        &self,
        histogram: &Histogram,
        fixed: &[Color],
        max_colors: usize,
        speed: u8,
    ) -> Result<Vec<Color>, QuantizeError>;
}

/// Median cut quantizer with k-means refinement.
#[derive(Debug, Clone, Copy, Default)]
pub struct MedianCut;

impl Quantizer for MedianCut {
    fn quantize(
        &self,
        histogram: &Histogram,
        fixed: &[Color],
        max_colors: usize,
        speed: u8,
    ) -> Result<Vec<Color>, QuantizeError> {
        let mut pinned: Vec<Color> = Vec::with_capacity(fixed.len());
        for color in fixed {
            if !pinned.contains(color) {
                pinned.push(*color);
            }
        }
        if pinned.len() > max_colors {
            return Err(QuantizeError::TooManyFixedColors { fixed: pinned.len(), max: max_colors });
        }

        let free_slots = max_colors - pinned.len();
        let colors: Vec<(Color, u32)> =
            histogram.entries().into_iter().filter(|(c, _)| !pinned.contains(c)).collect();

        let mut result = pinned.clone();
        if colors.len() <= free_slots {
            result.extend(colors.into_iter().map(|(c, _)| c));
            return Ok(result);
        }
        if free_slots == 0 {
            return Ok(result);
        }

        let mut centroids = median_cut(colors.clone(), free_slots);
        let rounds = 11u8.saturating_sub(speed.clamp(1, 10));
        for _ in 0..rounds {
            if !refine(&colors, &pinned, &mut centroids) {
                break;
            }
        }

        for centroid in centroids {
            if !result.contains(&centroid) {
                result.push(centroid);
            }
        }
        Ok(result)
    }
}

/// A box of colors for median cut algorithm.
#[derive(Debug, Clone)]
struct ColorBox {
    colors: Vec<(Color, u32)>, // Color and count
}

#[derive(Debug, Clone, Copy)]
enum Channel {
    Red,
    Green,
    Blue,
}

impl ColorBox {
    fn new(colors: Vec<(Color, u32)>) -> Self {
        Self { colors }
    }

    /// Find which channel has the largest range.
    fn widest_channel(&self) -> Channel {
        let (mut min_r, mut max_r) = (255u8, 0u8);
        let (mut min_g, mut max_g) = (255u8, 0u8);
        let (mut min_b, mut max_b) = (255u8, 0u8);

        for (color, _) in &self.colors {
            min_r = min_r.min(color.r);
            max_r = max_r.max(color.r);
            min_g = min_g.min(color.g);
            max_g = max_g.max(color.g);
            min_b = min_b.min(color.b);
            max_b = max_b.max(color.b);
        }

        let range_r = max_r.saturating_sub(min_r);
        let range_g = max_g.saturating_sub(min_g);
        let range_b = max_b.saturating_sub(min_b);

        if range_r >= range_g && range_r >= range_b {
            Channel::Red
        } else if range_g >= range_b {
            Channel::Green
        } else {
            Channel::Blue
        }
    }

    /// Split the box into two along the widest channel.
    fn split(mut self) -> (ColorBox, ColorBox) {
        let channel = self.widest_channel();

        self.colors.sort_by_key(|(color, _)| match channel {
            Channel::Red => (color.r, color.g, color.b),
            Channel::Green => (color.g, color.r, color.b),
            Channel::Blue => (color.b, color.r, color.g),
        });

        // Find median by pixel count
        let total: u64 = self.colors.iter().map(|(_, count)| *count as u64).sum();
        let mut running = 0u64;
        let mut split_idx = self.colors.len() / 2;

        for (i, (_, count)) in self.colors.iter().enumerate() {
            running += *count as u64;
            if running >= total / 2 {
                split_idx = i + 1;
                break;
            }
        }

        // Ensure we don't create empty boxes
        split_idx = split_idx.max(1).min(self.colors.len() - 1);

        let right = self.colors.split_off(split_idx);
        (ColorBox::new(self.colors), ColorBox::new(right))
    }

    /// Get the average color of this box (weighted by pixel count).
    fn average_color(&self) -> Color {
        weighted_mean(self.colors.iter().map(|(c, n)| (*c, *n)))
    }

    /// Total pixel count in this box.
    fn pixel_count(&self) -> u64 {
        self.colors.iter().map(|(_, count)| *count as u64).sum()
    }
}

fn weighted_mean(colors: impl Iterator<Item = (Color, u32)>) -> Color {
    let (mut r, mut g, mut b, mut total) = (0u64, 0u64, 0u64, 0u64);
    for (c, count) in colors {
        let count = count as u64;
        r += c.r as u64 * count;
        g += c.g as u64 * count;
        b += c.b as u64 * count;
        total += count;
    }
    if total == 0 {
        return Color::default();
    }
    Color::new(
        ((r + total / 2) / total) as u8,
        ((g + total / 2) / total) as u8,
        ((b + total / 2) / total) as u8,
    )
}

/// Split the color set into at most `max_colors` boxes and average them.
fn median_cut(colors: Vec<(Color, u32)>, max_colors: usize) -> Vec<Color> {
    let mut boxes = vec![ColorBox::new(colors)];

    while boxes.len() < max_colors {
        // Find the box with the most pixels that can still be split
        let candidate = boxes
            .iter()
            .enumerate()
            .filter(|(_, b)| b.colors.len() > 1)
            .max_by(|(ia, a), (ib, b)| a.pixel_count().cmp(&b.pixel_count()).then(ib.cmp(ia)))
            .map(|(i, _)| i);

        let Some(idx) = candidate else {
            break;
        };

        let box_to_split = boxes.remove(idx);
        let (left, right) = box_to_split.split();
        boxes.push(left);
        boxes.push(right);
    }

    boxes.iter().map(ColorBox::average_color).collect()
}

/// One k-means round: reassign colors to the nearest center and move the
/// free centroids to the mean of their members. Pinned colors are centers
/// that never move. Returns whether any centroid changed.
fn refine(colors: &[(Color, u32)], pinned: &[Color], centroids: &mut [Color]) -> bool {
    let mut members: Vec<Vec<(Color, u32)>> = vec![Vec::new(); centroids.len()];

    for &(color, count) in colors {
        let pinned_distance = nearest(color, pinned.iter().copied()).map(|(_, d)| d);
        if let Some((i, d)) = nearest(color, centroids.iter().copied()) {
            // Colors closer to a pinned color belong to it
            if pinned_distance.map_or(true, |pd| d < pd) {
                members[i].push((color, count));
            }
        }
    }

    let mut changed = false;
    for (centroid, group) in centroids.iter_mut().zip(members) {
        if group.is_empty() {
            continue;
        }
        let mean = weighted_mean(group.into_iter());
        if mean != *centroid {
            *centroid = mean;
            changed = true;
        }
    }
    changed
}

fn distance(a: Color, b: Color) -> u32 {
    let dr = a.r as i32 - b.r as i32;
    let dg = a.g as i32 - b.g as i32;
    let db = a.b as i32 - b.b as i32;
    (dr * dr + dg * dg + db * db) as u32
}

/// Index and distance of the closest color; ties go to the lowest index.
fn nearest(color: Color, candidates: impl Iterator<Item = Color>) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, candidate) in candidates.enumerate() {
        let d = distance(color, candidate);
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best
}

/// Result of mapping an image onto a palette.
#[derive(Debug, Clone)]
pub struct Remapped {
    /// One palette index per pixel, row-major
    pub indices: Vec<u8>,
    /// Mean squared error per opaque pixel
    pub error: f64,
}

/// Map every pixel of `rgba` to the closest palette color.
///
/// `palette` pairs an on-device index with its color. `dither` in `0.0..=1.0`
/// scales Floyd-Steinberg error diffusion (0 disables it). Fully transparent
/// pixels neither receive nor spread error.
pub fn remap(
    rgba: &RgbaImage,
    palette: &[(u8, Color)],
    dither: f32,
) -> Result<Remapped, QuantizeError> {
    if palette.is_empty() {
        return Err(QuantizeError::EmptyPalette);
    }

    let width = rgba.width() as usize;
    let height = rgba.height() as usize;
    let dither = dither.clamp(0.0, 1.0);
    let raw = rgba.as_raw();

    let mut indices = Vec::with_capacity(width * height);
    let mut current = vec![[0f32; 3]; width + 2];
    let mut next = vec![[0f32; 3]; width + 2];
    let mut total_error = 0f64;
    let mut opaque = 0u64;

    for y in 0..height {
        for x in 0..width {
            let px = &raw[(y * width + x) * 4..(y * width + x) * 4 + 4];
            if px[3] == 0 {
                indices.push(palette[0].0);
                continue;
            }

            let carried = current[x + 1];
            let wanted = [
                px[0] as f32 + carried[0],
                px[1] as f32 + carried[1],
                px[2] as f32 + carried[2],
            ];
            let target = Color::new(
                wanted[0].round().clamp(0.0, 255.0) as u8,
                wanted[1].round().clamp(0.0, 255.0) as u8,
                wanted[2].round().clamp(0.0, 255.0) as u8,
            );

            let (slot, _) = nearest(target, palette.iter().map(|(_, c)| *c)).unwrap_or((0, 0));
            let (index, chosen) = palette[slot];
            indices.push(index);

            total_error += distance(Color::new(px[0], px[1], px[2]), chosen) as f64;
            opaque += 1;

            if dither > 0.0 {
                let err = [
                    (wanted[0] - chosen.r as f32) * dither,
                    (wanted[1] - chosen.g as f32) * dither,
                    (wanted[2] - chosen.b as f32) * dither,
                ];
                for c in 0..3 {
                    current[x + 2][c] += err[c] * 7.0 / 16.0;
                    next[x][c] += err[c] * 3.0 / 16.0;
                    next[x + 1][c] += err[c] * 5.0 / 16.0;
                    next[x + 2][c] += err[c] * 1.0 / 16.0;
                }
            }
        }
        std::mem::swap(&mut current, &mut next);
        next.iter_mut().for_each(|e| *e = [0.0; 3]);
    }

    let error = if opaque == 0 { 0.0 } else { total_error / opaque as f64 };
    Ok(Remapped { indices, error })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn histogram_of(colors: &[(Color, u32)]) -> Histogram {
        let mut h = Histogram::new();
        for (c, n) in colors {
            h.add_color(*c, *n);
        }
        h
    }

    #[test]
    fn test_histogram_clamps_alpha() {
        let mut h = Histogram::new();
        h.add_rgba(&[255, 0, 0, 255, 0, 255, 0, 127, 0, 0, 255, 128]).unwrap();
        assert_eq!(h.len(), 2);
        assert_eq!(h.pixels(), 3);
    }

    #[test]
    fn test_histogram_limit() {
        let mut h = Histogram::with_limit(2);
        assert_eq!(h.add_rgba(&[0; 12]), Err(QuantizeError::TooManyPixels(2)));
    }

    #[test]
    fn test_quantize_no_reduction_needed() {
        let h = histogram_of(&[
            (Color::new(255, 0, 0), 10),
            (Color::new(0, 255, 0), 10),
            (Color::new(0, 0, 255), 10),
        ]);
        let result = MedianCut.quantize(&h, &[], 4, 3).unwrap();
        assert_eq!(result.len(), 3);
    }

    #[test]
    fn test_quantize_reduces_colors() {
        let mut colors = Vec::new();
        for i in 0..20u8 {
            colors.push((Color::new(i * 10, i * 5, i * 2), 1));
        }
        let result = MedianCut.quantize(&histogram_of(&colors), &[], 4, 3).unwrap();
        assert!(result.len() <= 4);
        assert!(!result.is_empty());
    }

    #[test]
    fn test_quantize_keeps_fixed_colors() {
        let mut colors = Vec::new();
        for i in 0..50u8 {
            colors.push((Color::new(i * 5, 255 - i * 5, i), 3));
        }
        let magenta = Color::new(255, 0, 128);
        let result = MedianCut.quantize(&histogram_of(&colors), &[magenta], 8, 1).unwrap();
        assert!(result.len() <= 8);
        assert_eq!(result[0], magenta);
    }

    #[test]
    fn test_quantize_too_many_fixed() {
        let fixed = [Color::new(1, 1, 1), Color::new(2, 2, 2), Color::new(3, 3, 3)];
        let err = MedianCut.quantize(&Histogram::new(), &fixed, 2, 5).unwrap_err();
        assert_eq!(err, QuantizeError::TooManyFixedColors { fixed: 3, max: 2 });
    }

    #[test]
    fn test_quantize_is_deterministic() {
        let mut colors = Vec::new();
        for i in 0..64u8 {
            colors.push((Color::new(i * 4, (i * 7) % 255, 255 - i), (i % 5) as u32 + 1));
        }
        let h = histogram_of(&colors);
        let a = MedianCut.quantize(&h, &[], 16, 2).unwrap();
        let b = MedianCut.quantize(&h, &[], 16, 2).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_remap_nearest() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([30, 30, 30, 255]));
        img.put_pixel(1, 0, Rgba([200, 200, 200, 255]));
        let palette = [(4u8, Color::new(0, 0, 0)), (9u8, Color::new(255, 255, 255))];

        let remapped = remap(&img, &palette, 0.0).unwrap();
        assert_eq!(remapped.indices, vec![4, 9]);
        assert!(remapped.error > 0.0);
    }

    #[test]
    fn test_remap_exact_colors_have_no_error() {
        let mut img = RgbaImage::new(2, 2);
        for (x, y, p) in img.enumerate_pixels_mut() {
            *p = if (x + y) % 2 == 0 { Rgba([255, 0, 0, 255]) } else { Rgba([0, 0, 255, 255]) };
        }
        let palette = [(0u8, Color::new(255, 0, 0)), (1u8, Color::new(0, 0, 255))];
        let remapped = remap(&img, &palette, 1.0).unwrap();
        assert_eq!(remapped.indices, vec![0, 1, 1, 0]);
        assert_eq!(remapped.error, 0.0);
    }

    #[test]
    fn test_remap_empty_palette() {
        let img = RgbaImage::new(1, 1);
        assert_eq!(remap(&img, &[], 0.0).unwrap_err(), QuantizeError::EmptyPalette);
    }
}
