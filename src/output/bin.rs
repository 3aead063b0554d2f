//! Raw binary output. Every palette, image and tile becomes its own `.bin`
//! file, and the include file lists them with their sizes.

use super::{write_file, Items, Output, OutputError};
use crate::convert::Image;
use std::fmt::Write as _;
use std::path::PathBuf;

pub fn write(output: &Output, items: &Items<'_>) -> Result<Vec<PathBuf>, OutputError> {
    let dir = &output.directory;
    let mut written = Vec::new();
    let mut listing = String::new();

    let mut emit = |name: &str, data: &[u8]| -> Result<(), OutputError> {
        let file = format!("{}.bin", name);
        let _ = writeln!(listing, "{} {}", file, data.len());
        written.push(write_file(dir, &file, data)?);
        Ok(())
    };
    let image_name = |image: &Image| {
        if image.compressed {
            format!("{}_compressed", image.name)
        } else {
            image.name.clone()
        }
    };

    for palette in &items.palettes {
        emit(&palette.name, &palette.to_bytes())?;
    }
    for convert in &items.converts {
        for image in &convert.images {
            emit(&image_name(image), &image.data)?;
        }
        for tile in convert.tilesets.iter().flat_map(|t| t.tiles.iter()) {
            emit(&image_name(tile), &tile.data)?;
        }
    }

    written.push(write_file(dir, &output.include_file, listing)?);
    Ok(written)
}
