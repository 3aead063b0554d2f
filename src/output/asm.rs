//! Assembly source output.

use super::{asm_bytes, write_file, Items, Output, OutputError};
use crate::convert::{Image, Tileset};
use crate::palette::Palette;
use std::fmt::Write as _;
use std::path::PathBuf;

const BYTES_PER_LINE: usize = 16;

pub fn palette_source(palette: &Palette) -> String {
    format!(
        "{name}_size := {size}\n{name}:\n{data}",
        name = palette.name,
        size = palette.byte_size(),
        data = asm_bytes(&palette.to_bytes(), 2)
    )
}

fn image_block(out: &mut String, image: &Image) {
    let name = &image.name;
    let _ = writeln!(out, "{}_width := {}", name, image.width);
    let _ = writeln!(out, "{}_height := {}", name, image.height);
    let _ = writeln!(out, "{}_size := {}", name, image.uncompressed_size);
    if image.compressed {
        let _ = writeln!(out, "{}_compressed_size := {}", name, image.size());
        let _ = writeln!(out, "{}_compressed:", name);
    } else {
        let _ = writeln!(out, "{}:", name);
    }
    out.push_str(&asm_bytes(&image.data, BYTES_PER_LINE));
}

pub fn image_source(image: &Image) -> String {
    let mut out = String::new();
    image_block(&mut out, image);
    out
}

fn label(image: &Image) -> String {
    if image.compressed {
        format!("{}_compressed", image.name)
    } else {
        image.name.clone()
    }
}

pub fn tileset_source(tileset: &Tileset) -> String {
    let mut out = String::new();
    let name = &tileset.name;
    let _ = writeln!(out, "{}_tile_width := {}", name, tileset.tile_width);
    let _ = writeln!(out, "{}_tile_height := {}", name, tileset.tile_height);
    let _ = writeln!(out, "{}_num_tiles := {}", name, tileset.tiles.len());
    if tileset.pointer_table {
        let _ = writeln!(out, "{}_tiles:", name);
        for tile in &tileset.tiles {
            let _ = writeln!(out, "\tdl\t{}", label(tile));
        }
    }
    for tile in &tileset.tiles {
        image_block(&mut out, tile);
    }
    out
}

pub fn write(output: &Output, items: &Items<'_>) -> Result<Vec<PathBuf>, OutputError> {
    let dir = &output.directory;
    let mut written = Vec::new();
    let mut include = String::new();

    let mut emit = |file: String, contents: String| -> Result<(), OutputError> {
        let _ = writeln!(include, "include '{}'", file);
        written.push(write_file(dir, &file, contents)?);
        Ok(())
    };

    for palette in &items.palettes {
        emit(format!("{}.asm", palette.name), palette_source(palette))?;
    }
    for convert in &items.converts {
        for image in &convert.images {
            emit(format!("{}.asm", image.name), image_source(image))?;
        }
        for tileset in &convert.tilesets {
            emit(format!("{}.asm", tileset.name), tileset_source(tileset))?;
        }
    }

    written.push(write_file(dir, &output.include_file, include)?);
    Ok(written)
}
