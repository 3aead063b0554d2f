//! Tileset slicing and conversion.

use super::transform::{self, StageContext};
use super::{image_name, ConvertError, Image};
use crate::bitmap;
use std::path::{Path, PathBuf};

/// Tileset options shared by every tileset image of a convert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilesetGroup {
    pub tile_width: u32,
    pub tile_height: u32,
    /// Emit a table of pointers to each tile
    pub pointer_table: bool,
    pub images: Vec<PathBuf>,
}

/// A converted tileset. Tiles are ordered row-major from the top-left.
#[derive(Debug, Clone)]
pub struct Tileset {
    pub name: String,
    pub path: PathBuf,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tiles: Vec<Image>,
    pub pointer_table: bool,
}

impl Tileset {
    /// Total encoded size of all tiles.
    pub fn size(&self) -> usize {
        self.tiles.iter().map(Image::size).sum()
    }
}

/// Slice `path` into tiles and encode each one.
pub fn convert(
    path: &Path,
    group: &TilesetGroup,
    ctx: &StageContext<'_>,
) -> Result<Tileset, ConvertError> {
    let name = image_name(path);
    let source = bitmap::load(path)?;
    let blocks = bitmap::slice_tiles(&source, group.tile_width, group.tile_height)?;

    let mut tiles = Vec::with_capacity(blocks.len());
    for (i, block) in blocks.into_iter().enumerate() {
        let block = ctx.settings.orientation.apply(block);
        let tile = Image::from_rgba(format!("{}_tile_{}", name, i), path.to_path_buf(), block);
        tiles.push(transform::run(tile, ctx)?);
    }

    Ok(Tileset {
        name,
        path: path.to_path_buf(),
        tile_width: group.tile_width,
        tile_height: group.tile_height,
        tiles,
        pointer_table: group.pointer_table,
    })
}
