//! Source bitmap handling: decoding, rotation, flips and tile slicing.

use image::imageops;
use image::{GenericImageView, RgbaImage};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors raised while preparing source bitmaps.
#[derive(Debug, Error)]
pub enum BitmapError {
    /// Image could not be decoded
    #[error("failed to load '{path}': {source}")]
    Load {
        path: String,
        #[source]
        source: image::ImageError,
    },
    /// Image dimensions are not a multiple of the tile size
    #[error("image {width}x{height} is not a multiple of tile size {tile_width}x{tile_height}")]
    TileMismatch { width: u32, height: u32, tile_width: u32, tile_height: u32 },
    /// Zero-sized tiles
    #[error("tile size must be non-zero")]
    EmptyTile,
}

/// Clockwise rotation applied to a bitmap before conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl TryFrom<u16> for Rotation {
    type Error = String;

    fn try_from(degrees: u16) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Rotation::None),
            90 => Ok(Rotation::Cw90),
            180 => Ok(Rotation::Cw180),
            270 => Ok(Rotation::Cw270),
            other => Err(format!("invalid rotation {}, expected 0, 90, 180 or 270", other)),
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> u16 {
        match rotation {
            Rotation::None => 0,
            Rotation::Cw90 => 90,
            Rotation::Cw180 => 180,
            Rotation::Cw270 => 270,
        }
    }
}

/// Orientation changes applied to raw pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Orientation {
    pub rotate: Rotation,
    pub flip_x: bool,
    pub flip_y: bool,
}

impl Orientation {
    pub fn is_identity(&self) -> bool {
        self.rotate == Rotation::None && !self.flip_x && !self.flip_y
    }

    /// Rotate, then flip.
    pub fn apply(&self, image: RgbaImage) -> RgbaImage {
        if self.is_identity() {
            return image;
        }
        let mut out = match self.rotate {
            Rotation::None => image,
            Rotation::Cw90 => imageops::rotate90(&image),
            Rotation::Cw180 => imageops::rotate180(&image),
            Rotation::Cw270 => imageops::rotate270(&image),
        };
        if self.flip_x {
            imageops::flip_horizontal_in_place(&mut out);
        }
        if self.flip_y {
            imageops::flip_vertical_in_place(&mut out);
        }
        out
    }
}

/// Decode an image file into RGBA8.
pub fn load(path: &Path) -> Result<RgbaImage, BitmapError> {
    image::open(path)
        .map(|img| img.to_rgba8())
        .map_err(|source| BitmapError::Load { path: path.display().to_string(), source })
}

/// Slice `image` into `tile_width x tile_height` blocks, row-major from the
/// top-left.
pub fn slice_tiles(
    image: &RgbaImage,
    tile_width: u32,
    tile_height: u32,
) -> Result<Vec<RgbaImage>, BitmapError> {
    if tile_width == 0 || tile_height == 0 {
        return Err(BitmapError::EmptyTile);
    }
    let (width, height) = image.dimensions();
    if width % tile_width != 0 || height % tile_height != 0 {
        return Err(BitmapError::TileMismatch { width, height, tile_width, tile_height });
    }

    let mut tiles = Vec::with_capacity(((width / tile_width) * (height / tile_height)) as usize);
    for ty in (0..height).step_by(tile_height as usize) {
        for tx in (0..width).step_by(tile_width as usize) {
            tiles.push(image.view(tx, ty, tile_width, tile_height).to_image());
        }
    }
    Ok(tiles)
}
