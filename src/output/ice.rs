//! ICE output: one text file of hex strings that ICE programs paste into
//! their source.

use super::{hex_string, write_file, Items, Output, OutputError};
use crate::convert::Image;
use std::fmt::Write as _;
use std::path::PathBuf;

fn entry(out: &mut String, name: &str, data: &[u8]) {
    let _ = writeln!(out, "{} | {} bytes", name, data.len());
    let _ = writeln!(out, "\"{}\"", hex_string(data));
}

fn image_entry(out: &mut String, image: &Image) {
    let label = if image.compressed {
        format!("{}_compressed", image.name)
    } else {
        image.name.clone()
    };
    entry(out, &label, &image.data);
}

pub fn render(items: &Items<'_>) -> String {
    let mut out = String::new();
    for palette in &items.palettes {
        entry(&mut out, &palette.name, &palette.to_bytes());
    }
    for convert in &items.converts {
        for image in &convert.images {
            image_entry(&mut out, image);
        }
        for tile in convert.tilesets.iter().flat_map(|t| t.tiles.iter()) {
            image_entry(&mut out, tile);
        }
    }
    out
}

pub fn write(output: &Output, items: &Items<'_>) -> Result<Vec<PathBuf>, OutputError> {
    Ok(vec![write_file(&output.directory, &output.include_file, render(items))?])
}
