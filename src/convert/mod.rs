//! Image and tileset conversion.
//!
//! A convert groups images and tilesets that share one palette and one set
//! of encoding options. Each source bitmap is loaded, oriented and then run
//! through the stages in [`transform`], producing the bytes the outputs
//! write.

pub mod tileset;
pub mod transform;

pub use tileset::{Tileset, TilesetGroup};

use crate::bitmap::{self, BitmapError, Orientation};
use crate::color::ColorFormat;
use crate::compress::{CompressError, CompressMode};
use crate::palette::Palette;
use crate::quantize::QuantizeError;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use transform::StageContext;

/// Errors raised while converting images.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error(transparent)]
    Bitmap(#[from] BitmapError),
    #[error(transparent)]
    Quantize(#[from] QuantizeError),
    #[error(transparent)]
    Compress(#[from] CompressError),
    /// Palette styles need a generated palette
    #[error("'{0}' needs a palette")]
    MissingPalette(String),
    /// Dimension prefix bytes cannot hold the size
    #[error("'{name}' is {width}x{height}; width and height prefixes need both at most 255")]
    TooLarge { name: String, width: u32, height: u32 },
    /// Offset indices would not fit in a byte
    #[error("palette offset {offset} plus {entries} palette entries exceeds 256")]
    PaletteOffset { offset: u8, entries: usize },
    /// Packed rows must fill whole bytes
    #[error("'{name}' width {width} is not a multiple of {} pixels for {bpp} bpp", 8 / bpp)]
    BppWidth { name: String, width: u32, bpp: u32 },
}

/// How pixels are encoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// One palette index per pixel
    #[default]
    Palette,
    /// Palette indices with run-length encoded transparency
    Rlet,
    /// Colors encoded directly, no palette
    Direct,
}

/// Bits per packed palette index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Bpp {
    One,
    Two,
    Four,
    #[default]
    Eight,
}

impl Bpp {
    pub fn bits(self) -> u32 {
        match self {
            Bpp::One => 1,
            Bpp::Two => 2,
            Bpp::Four => 4,
            Bpp::Eight => 8,
        }
    }

    pub fn pixels_per_byte(self) -> usize {
        8 / self.bits() as usize
    }
}

impl TryFrom<u8> for Bpp {
    type Error = String;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(Bpp::One),
            2 => Ok(Bpp::Two),
            4 => Ok(Bpp::Four),
            8 => Ok(Bpp::Eight),
            other => Err(format!("invalid bpp {}, expected 1, 2, 4 or 8", other)),
        }
    }
}

impl From<Bpp> for u8 {
    fn from(bpp: Bpp) -> u8 {
        bpp.bits() as u8
    }
}

/// Size bytes written in front of the image data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dimensions {
    None,
    #[default]
    WidthHeight,
    HeightWidth,
}

impl Dimensions {
    pub fn from_flags(width_and_height: bool, swap: bool) -> Self {
        match (width_and_height, swap) {
            (false, _) => Dimensions::None,
            (true, false) => Dimensions::WidthHeight,
            (true, true) => Dimensions::HeightWidth,
        }
    }

    pub fn is_none(self) -> bool {
        self == Dimensions::None
    }
}

/// Encoding options shared by every image of a convert.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvertSettings {
    pub style: Style,
    /// Encoding used by the direct style
    pub color_format: ColorFormat,
    pub transparent_index: u8,
    pub palette_offset: u8,
    pub omit_indices: Vec<u8>,
    pub bpp: Bpp,
    pub dimensions: Dimensions,
    pub compress: CompressMode,
    pub orientation: Orientation,
    /// Error diffusion strength, 0 disables dithering
    pub dither: f32,
}

impl Default for ConvertSettings {
    fn default() -> Self {
        Self {
            style: Style::Palette,
            color_format: ColorFormat::Rgb565,
            transparent_index: 0,
            palette_offset: 0,
            omit_indices: Vec::new(),
            bpp: Bpp::Eight,
            dimensions: Dimensions::WidthHeight,
            compress: CompressMode::None,
            orientation: Orientation::default(),
            dither: 0.0,
        }
    }
}

/// One converted bitmap or tile.
#[derive(Debug, Clone)]
pub struct Image {
    pub name: String,
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Encoded bytes
    pub data: Vec<u8>,
    /// Length of `data` before compression
    pub uncompressed_size: usize,
    pub compressed: bool,
    source: RgbaImage,
}

impl Image {
    pub fn from_rgba(name: impl Into<String>, path: PathBuf, source: RgbaImage) -> Self {
        let (width, height) = source.dimensions();
        Self {
            name: name.into(),
            path,
            width,
            height,
            data: Vec::new(),
            uncompressed_size: 0,
            compressed: false,
            source,
        }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Drop the decoded pixels once encoding is done.
    fn release_source(&mut self) {
        self.source = RgbaImage::new(0, 0);
    }
}

/// Identifier derived from a file name: the stem with anything that is not
/// alphanumeric replaced by `_`.
pub fn image_name(path: &Path) -> String {
    let stem = path.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    let mut name: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

/// A group of images and tilesets converted with the same settings.
#[derive(Debug, Clone)]
pub struct Convert {
    pub name: String,
    /// Palette used by palette and rlet styles
    pub palette: Option<String>,
    pub settings: ConvertSettings,
    pub image_paths: Vec<PathBuf>,
    pub tileset_group: Option<TilesetGroup>,
    pub images: Vec<Image>,
    pub tilesets: Vec<Tileset>,
}

impl Convert {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            palette: None,
            settings: ConvertSettings::default(),
            image_paths: Vec::new(),
            tileset_group: None,
            images: Vec::new(),
            tilesets: Vec::new(),
        }
    }

    pub fn with_palette(mut self, palette: impl Into<String>) -> Self {
        self.palette = Some(palette.into());
        self
    }

    pub fn with_settings(mut self, settings: ConvertSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_images(mut self, paths: Vec<PathBuf>) -> Self {
        self.image_paths = paths;
        self
    }

    pub fn with_tilesets(mut self, group: TilesetGroup) -> Self {
        self.tileset_group = Some(group);
        self
    }

    /// Every source path this convert reads, images first.
    pub fn source_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.image_paths.iter().chain(self.tileset_group.iter().flat_map(|g| g.images.iter()))
    }

    /// Load, orient and encode every image and tileset.
    pub fn generate(&mut self, palette: Option<&Palette>) -> Result<(), ConvertError> {
        let ctx = StageContext { settings: &self.settings, palette };

        let mut images = Vec::with_capacity(self.image_paths.len());
        for path in &self.image_paths {
            let source = self.settings.orientation.apply(bitmap::load(path)?);
            let image = Image::from_rgba(image_name(path), path.clone(), source);
            let image = transform::run(image, &ctx)?;
            log::info!(
                "converted {} ({}x{}, {} bytes)",
                image.name,
                image.width,
                image.height,
                image.size()
            );
            images.push(image);
        }

        let mut tilesets = Vec::new();
        if let Some(group) = &self.tileset_group {
            for path in &group.images {
                let tileset = tileset::convert(path, group, &ctx)?;
                log::info!(
                    "converted tileset {} ({} tiles of {}x{})",
                    tileset.name,
                    tileset.tiles.len(),
                    tileset.tile_width,
                    tileset.tile_height
                );
                tilesets.push(tileset);
            }
        }

        self.images = images;
        self.tilesets = tilesets;
        Ok(())
    }
}
