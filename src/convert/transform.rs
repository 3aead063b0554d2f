//! Per-image transform stages.
//!
//! Each stage consumes an [`Image`] and hands back the transformed value.
//! Stages that do not apply to the convert's settings return the image
//! untouched. [`STAGES`] fixes the order they run in.

use super::{Bpp, ConvertError, ConvertSettings, Dimensions, Image, Style};
use crate::color::{encode_into, Color};
use crate::compress::{self, CompressMode};
use crate::palette::{Palette, MAX_PALETTE_ENTRIES};
use crate::quantize::remap;

/// Everything a stage may read besides the image itself.
#[derive(Debug, Clone, Copy)]
pub struct StageContext<'a> {
    pub settings: &'a ConvertSettings,
    pub palette: Option<&'a Palette>,
}

pub type Stage = fn(Image, &StageContext<'_>) -> Result<Image, ConvertError>;

/// Stages in the order they are applied.
pub const STAGES: [Stage; 8] = [
    quantize,
    apply_palette_offset,
    encode_rlet,
    omit_indices,
    pack_bpp,
    encode_direct,
    prefix_dimensions,
    compress_data,
];

/// Run every stage over `image`.
pub fn run(image: Image, ctx: &StageContext<'_>) -> Result<Image, ConvertError> {
    check_dimensions(&image, ctx.settings)?;
    let mut image = STAGES.iter().try_fold(image, |image, stage| stage(image, ctx))?;
    image.release_source();
    Ok(image)
}

/// A width/height prefix stores each dimension in one byte.
pub fn check_dimensions(image: &Image, settings: &ConvertSettings) -> Result<(), ConvertError> {
    if settings.dimensions != Dimensions::None && (image.width > 255 || image.height > 255) {
        return Err(ConvertError::TooLarge {
            name: image.name.clone(),
            width: image.width,
            height: image.height,
        });
    }
    Ok(())
}

fn uses_palette(style: Style) -> bool {
    matches!(style, Style::Palette | Style::Rlet)
}

/// Map pixels to palette indices, then force transparent and exact pixels.
pub fn quantize(mut image: Image, ctx: &StageContext<'_>) -> Result<Image, ConvertError> {
    if !uses_palette(ctx.settings.style) {
        return Ok(image);
    }
    let palette = ctx.palette.ok_or_else(|| ConvertError::MissingPalette(image.name.clone()))?;

    let remapped = remap(&image.source, &palette.remap_colors(), ctx.settings.dither)?;
    let mut indices = remapped.indices;
    let exact = palette.exact_entries();
    let transparent = ctx.settings.transparent_index;
    let mut partial_alpha = 0usize;

    for (index, px) in indices.iter_mut().zip(image.source.pixels()) {
        let [r, g, b, a] = px.0;
        if a == 0 {
            *index = transparent;
            continue;
        }
        if a != 255 {
            partial_alpha += 1;
        }
        let color = Color::new(r, g, b);
        if let Some((exact_index, _)) = exact.iter().find(|(_, c)| *c == color) {
            *index = *exact_index;
        }
    }

    if partial_alpha > 0 {
        log::warn!("{}: {} pixels have partial transparency", image.name, partial_alpha);
    }
    log::debug!("{}: remap error {:.2}", image.name, remapped.error);

    image.data = indices;
    Ok(image)
}

pub fn apply_palette_offset(
    mut image: Image,
    ctx: &StageContext<'_>,
) -> Result<Image, ConvertError> {
    let offset = ctx.settings.palette_offset;
    if offset == 0 || !uses_palette(ctx.settings.style) {
        return Ok(image);
    }
    let entries = ctx.palette.map_or(0, |p| p.nr_entries);
    if offset as usize + entries > MAX_PALETTE_ENTRIES {
        return Err(ConvertError::PaletteOffset { offset, entries });
    }
    for index in &mut image.data {
        *index = index.wrapping_add(offset);
    }
    Ok(image)
}

/// Encode one row as `(transparent_len, opaque_len, opaque...)` runs.
pub fn encode_rlet_row(row: &[u8], transparent: u8, out: &mut Vec<u8>) {
    let mut x = 0;
    loop {
        let mut run = 0u8;
        while x < row.len() && row[x] == transparent && run < u8::MAX {
            run += 1;
            x += 1;
        }
        out.push(run);
        if x == row.len() {
            break;
        }

        let start = x;
        let mut run = 0u8;
        while x < row.len() && row[x] != transparent && run < u8::MAX {
            run += 1;
            x += 1;
        }
        out.push(run);
        out.extend_from_slice(&row[start..x]);
        if x == row.len() {
            break;
        }
    }
}

pub fn encode_rlet(mut image: Image, ctx: &StageContext<'_>) -> Result<Image, ConvertError> {
    if ctx.settings.style != Style::Rlet {
        return Ok(image);
    }
    let transparent = ctx.settings.transparent_index.wrapping_add(ctx.settings.palette_offset);
    let width = image.width as usize;
    let mut out = Vec::with_capacity(image.data.len() + image.height as usize * 2);
    if width > 0 {
        for row in image.data.chunks(width) {
            encode_rlet_row(row, transparent, &mut out);
        }
    }
    image.data = out;
    Ok(image)
}

pub fn omit_indices(mut image: Image, ctx: &StageContext<'_>) -> Result<Image, ConvertError> {
    let omit = &ctx.settings.omit_indices;
    if omit.is_empty() || !uses_palette(ctx.settings.style) {
        return Ok(image);
    }
    image.data.retain(|b| !omit.contains(b));
    Ok(image)
}

/// Pack `8 / bpp` indices per byte, first index in the high bits.
pub fn pack_indices(data: &[u8], bpp: Bpp) -> Vec<u8> {
    let bits = bpp.bits();
    let per_byte = bpp.pixels_per_byte();
    let mask = ((1u16 << bits) - 1) as u8;
    data.chunks(per_byte)
        .map(|chunk| {
            let packed = chunk.iter().fold(0u8, |acc, &v| (acc << bits) | (v & mask));
            packed << (bits * (per_byte - chunk.len()) as u32)
        })
        .collect()
}

pub fn pack_bpp(mut image: Image, ctx: &StageContext<'_>) -> Result<Image, ConvertError> {
    let bpp = ctx.settings.bpp;
    if bpp == Bpp::Eight || !uses_palette(ctx.settings.style) {
        return Ok(image);
    }
    if image.width as usize % bpp.pixels_per_byte() != 0 {
        return Err(ConvertError::BppWidth {
            name: image.name.clone(),
            width: image.width,
            bpp: bpp.bits(),
        });
    }
    let max = 1u16 << bpp.bits();
    if image.data.iter().any(|&v| v as u16 >= max) {
        log::warn!("{}: indices above {} are truncated at {} bpp", image.name, max - 1, bpp.bits());
    }
    image.data = pack_indices(&image.data, bpp);
    Ok(image)
}

pub fn encode_direct(mut image: Image, ctx: &StageContext<'_>) -> Result<Image, ConvertError> {
    if ctx.settings.style != Style::Direct {
        return Ok(image);
    }
    let format = ctx.settings.color_format;
    let mut out = Vec::with_capacity(image.source.len() / 4 * format.bytes_per_color());
    let mut translucent = 0usize;
    for px in image.source.pixels() {
        let [r, g, b, a] = px.0;
        if a != 255 {
            translucent += 1;
        }
        encode_into(Color::new(r, g, b), format, &mut out);
    }
    if translucent > 0 {
        log::warn!("{}: {} pixels are not opaque; alpha ignored", image.name, translucent);
    }
    image.data = out;
    Ok(image)
}

pub fn prefix_dimensions(mut image: Image, ctx: &StageContext<'_>) -> Result<Image, ConvertError> {
    let (w, h) = (image.width as u8, image.height as u8);
    let prefix = match ctx.settings.dimensions {
        Dimensions::None => return Ok(image),
        Dimensions::WidthHeight => [w, h],
        Dimensions::HeightWidth => [h, w],
    };
    let mut data = Vec::with_capacity(image.data.len() + 2);
    data.extend_from_slice(&prefix);
    data.append(&mut image.data);
    image.data = data;
    Ok(image)
}

pub fn compress_data(mut image: Image, ctx: &StageContext<'_>) -> Result<Image, ConvertError> {
    image.uncompressed_size = image.data.len();
    if ctx.settings.compress == CompressMode::None {
        return Ok(image);
    }
    image.data = compress::compress(ctx.settings.compress, &image.data)?;
    image.compressed = true;
    log::debug!(
        "{}: {} compressed {} -> {} bytes",
        image.name,
        ctx.settings.compress,
        image.uncompressed_size,
        image.data.len()
    );
    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::ColorFormat;
    use crate::palette::FixedEntry;
    use crate::quantize::MedianCut;
    use image::{Rgba, RgbaImage};
    use std::path::PathBuf;

    const RED: [u8; 4] = [255, 0, 0, 255];
    const BLUE: [u8; 4] = [0, 0, 255, 255];
    const CLEAR: [u8; 4] = [0, 0, 0, 0];

    fn image_from(width: u32, height: u32, pixels: &[[u8; 4]]) -> Image {
        let mut rgba = RgbaImage::new(width, height);
        for (i, px) in pixels.iter().enumerate() {
            rgba.put_pixel(i as u32 % width, i as u32 / width, Rgba(*px));
        }
        Image::from_rgba("img", PathBuf::from("img.png"), rgba)
    }

    fn palette_of(colors: &[[u8; 4]], max: usize) -> Palette {
        let img = image_from(colors.len() as u32, 1, colors);
        let mut palette = Palette::new("pal").with_max_entries(max);
        palette.generate_from_images(&[img.source.clone()], &MedianCut).unwrap();
        palette
    }

    fn settings(style: Style) -> ConvertSettings {
        ConvertSettings { style, dimensions: Dimensions::None, ..Default::default() }
    }

    fn decode_rlet(data: &[u8], width: usize, transparent: u8) -> Vec<u8> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos < data.len() {
            let mut x = 0;
            loop {
                let t = data[pos] as usize;
                pos += 1;
                out.extend(std::iter::repeat(transparent).take(t));
                x += t;
                if x == width {
                    break;
                }
                let o = data[pos] as usize;
                pos += 1;
                out.extend_from_slice(&data[pos..pos + o]);
                pos += o;
                x += o;
                if x == width {
                    break;
                }
            }
        }
        out
    }

    fn unpack(data: &[u8], bpp: Bpp, count: usize) -> Vec<u8> {
        let bits = bpp.bits();
        let mask = ((1u16 << bits) - 1) as u8;
        let mut out = Vec::new();
        for byte in data {
            for i in (0..bpp.pixels_per_byte()).rev() {
                out.push((byte >> (i as u32 * bits)) & mask);
            }
        }
        out.truncate(count);
        out
    }

    #[test]
    fn test_rlet_rows_round_trip() {
        let rows: Vec<Vec<u8>> = vec![
            vec![0; 8],
            vec![3; 8],
            vec![0, 0, 1, 2, 0, 0, 0, 5],
            vec![1, 0, 0, 0, 0, 0, 0, 0],
            vec![0; 300],
            vec![7; 600],
            (0..520).map(|i| if i < 260 { 0 } else { 9 }).collect(),
        ];
        for row in rows {
            let mut encoded = Vec::new();
            encode_rlet_row(&row, 0, &mut encoded);
            assert_eq!(decode_rlet(&encoded, row.len(), 0), row);
        }
    }

    #[test]
    fn test_rlet_split_runs() {
        let mut encoded = Vec::new();
        encode_rlet_row(&[0; 300], 0, &mut encoded);
        assert_eq!(encoded, vec![255, 0, 45]);

        encoded.clear();
        encode_rlet_row(&[4; 256], 0, &mut encoded);
        assert_eq!(encoded[0], 0);
        assert_eq!(encoded[1], 255);
        assert_eq!(&encoded[257..], &[0, 1, 4]);
    }

    #[test]
    fn test_rlet_row_ends_after_opaque_run() {
        let mut encoded = Vec::new();
        encode_rlet_row(&[0, 0, 2, 2], 0, &mut encoded);
        assert_eq!(encoded, vec![2, 2, 2, 2]);
    }

    #[test]
    fn test_pack_round_trip() {
        let source: Vec<u8> = (0..64u8).collect();
        for bpp in [Bpp::One, Bpp::Two, Bpp::Four] {
            let max = 1u8 << bpp.bits();
            let values: Vec<u8> = source.iter().map(|v| v % max).collect();
            let packed = pack_indices(&values, bpp);
            assert_eq!(packed.len(), values.len() / bpp.pixels_per_byte());
            assert_eq!(unpack(&packed, bpp, values.len()), values);
        }
    }

    #[test]
    fn test_pack_first_pixel_high_bits() {
        assert_eq!(pack_indices(&[1, 2], Bpp::Four), vec![0x12]);
        assert_eq!(pack_indices(&[1, 0, 0, 0, 0, 0, 0, 1], Bpp::One), vec![0x81]);
    }

    #[test]
    fn test_pack_width_must_divide() {
        let palette = palette_of(&[RED, BLUE], 4);
        let s = ConvertSettings { bpp: Bpp::Two, ..settings(Style::Palette) };
        let ctx = StageContext { settings: &s, palette: Some(&palette) };
        let err = run(image_from(3, 1, &[RED, BLUE, RED]), &ctx).unwrap_err();
        assert!(matches!(err, ConvertError::BppWidth { width: 3, bpp: 2, .. }));
    }

    #[test]
    fn test_quantize_forces_transparent_index() {
        let palette = palette_of(&[RED, BLUE], 4);
        let s = ConvertSettings { transparent_index: 7, ..settings(Style::Palette) };
        let ctx = StageContext { settings: &s, palette: Some(&palette) };
        let out = run(image_from(3, 1, &[RED, CLEAR, BLUE]), &ctx).unwrap();
        assert_eq!(out.data[1], 7);
        assert_ne!(out.data[0], out.data[2]);
    }

    #[test]
    fn test_exact_entries_win() {
        let white = Color::new(255, 255, 255);
        let mut palette = Palette::new("pal")
            .with_max_entries(4)
            .with_fixed_entry(FixedEntry { color: white, index: 3, exact: true });
        let corpus = image_from(2, 1, &[RED, BLUE]);
        palette.generate_from_images(&[corpus.source.clone()], &MedianCut).unwrap();

        let s = settings(Style::Palette);
        let ctx = StageContext { settings: &s, palette: Some(&palette) };
        let out = run(image_from(2, 1, &[[255, 255, 255, 255], RED]), &ctx).unwrap();
        assert_eq!(out.data[0], 3);
    }

    #[test]
    fn test_palette_offset_bounds() {
        let palette = palette_of(&[RED, BLUE], 4);
        let s = ConvertSettings { palette_offset: 255, ..settings(Style::Palette) };
        let ctx = StageContext { settings: &s, palette: Some(&palette) };
        let err = run(image_from(1, 1, &[RED]), &ctx).unwrap_err();
        assert!(matches!(err, ConvertError::PaletteOffset { offset: 255, entries: 2 }));

        let s = ConvertSettings { palette_offset: 10, ..settings(Style::Palette) };
        let ctx = StageContext { settings: &s, palette: Some(&palette) };
        let out = run(image_from(2, 1, &[RED, BLUE]), &ctx).unwrap();
        assert!(out.data.iter().all(|&i| i >= 10 && i < 12));
    }

    #[test]
    fn test_rlet_style_image() {
        let palette = palette_of(&[RED], 2);
        let s = ConvertSettings { transparent_index: 1, ..settings(Style::Rlet) };
        let ctx = StageContext { settings: &s, palette: Some(&palette) };
        let pixels = [CLEAR, CLEAR, RED, RED, RED, CLEAR, CLEAR, CLEAR];
        let out = run(image_from(4, 2, &pixels), &ctx).unwrap();
        let red = palette.remap_colors()[0].0;
        assert_eq!(out.data, vec![2, 2, red, red, 0, 1, red, 3]);
    }

    #[test]
    fn test_omit_indices() {
        let palette = palette_of(&[RED, BLUE], 4);
        let s = ConvertSettings {
            omit_indices: vec![0],
            transparent_index: 0,
            ..settings(Style::Palette)
        };
        let ctx = StageContext { settings: &s, palette: Some(&palette) };
        let out = run(image_from(3, 1, &[CLEAR, RED, CLEAR]), &ctx).unwrap();
        assert_eq!(out.data.len(), 1);
    }

    #[test]
    fn test_direct_style_ignores_palette() {
        let s = ConvertSettings { color_format: ColorFormat::Rgb565, ..settings(Style::Direct) };
        let ctx = StageContext { settings: &s, palette: None };
        let out = run(image_from(2, 1, &[RED, BLUE]), &ctx).unwrap();
        assert_eq!(out.data, vec![0x00, 0xF8, 0x1F, 0x00]);

        let s = ConvertSettings { color_format: ColorFormat::Bgr888, ..settings(Style::Direct) };
        let ctx = StageContext { settings: &s, palette: None };
        let out = run(image_from(1, 1, &[[1, 2, 3, 128]]), &ctx).unwrap();
        assert_eq!(out.data, vec![3, 2, 1]);
    }

    #[test]
    fn test_dimension_prefix() {
        let s = ConvertSettings {
            dimensions: Dimensions::HeightWidth,
            color_format: ColorFormat::Rgb888,
            ..settings(Style::Direct)
        };
        let ctx = StageContext { settings: &s, palette: None };
        let out = run(image_from(2, 1, &[RED, RED]), &ctx).unwrap();
        assert_eq!(&out.data[..2], &[1, 2]);
        assert_eq!(out.data.len(), 8);
    }

    #[test]
    fn test_oversized_image_rejected_with_prefix() {
        let s = ConvertSettings { dimensions: Dimensions::WidthHeight, ..settings(Style::Direct) };
        let ctx = StageContext { settings: &s, palette: None };
        let image = Image::from_rgba("wide", PathBuf::from("wide.png"), RgbaImage::new(256, 1));
        assert!(matches!(run(image, &ctx), Err(ConvertError::TooLarge { width: 256, .. })));
    }

    #[test]
    fn test_compression_records_uncompressed_size() {
        let s = ConvertSettings { compress: CompressMode::Zx7, ..settings(Style::Direct) };
        let ctx = StageContext { settings: &s, palette: None };
        let image = Image::from_rgba("big", PathBuf::from("big.png"), RgbaImage::new(32, 32));
        let out = run(image, &ctx).unwrap();
        assert!(out.compressed);
        assert_eq!(out.uncompressed_size, 32 * 32 * 2);
        assert!(out.data.len() < out.uncompressed_size);
    }

    #[test]
    fn test_missing_palette() {
        let s = settings(Style::Palette);
        let ctx = StageContext { settings: &s, palette: None };
        let result = run(image_from(1, 1, &[RED]), &ctx);
        assert!(matches!(result, Err(ConvertError::MissingPalette(_))));
    }
}
