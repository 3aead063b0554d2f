//! C source output.

use super::{c_bytes, write_file, Items, Output, OutputError};
use crate::convert::{Convert, Dimensions, Image, Style, Tileset};
use crate::palette::Palette;
use std::fmt::Write as _;
use std::path::PathBuf;

const BYTES_PER_LINE: usize = 16;

fn qualifier(constant: bool) -> &'static str {
    if constant {
        "const "
    } else {
        ""
    }
}

/// Wrap `body` in an include guard with C++ linkage.
pub(crate) fn guarded(guard: &str, body: &str) -> String {
    format!(
        "#ifndef {guard}_include_file\n#define {guard}_include_file\n\
         \n#ifdef __cplusplus\nextern \"C\" {{\n#endif\n\
         \n{body}\
         \n#ifdef __cplusplus\n}}\n#endif\n\
         \n#endif\n"
    )
}

/// Sprite type an image's bytes can be cast to, if any.
pub(crate) fn sprite_type(convert: &Convert, image: &Image) -> Option<&'static str> {
    if image.compressed || convert.settings.dimensions == Dimensions::None {
        return None;
    }
    match convert.settings.style {
        Style::Palette => Some("gfx_sprite_t"),
        Style::Rlet => Some("gfx_rletsprite_t"),
        Style::Direct => None,
    }
}

pub fn palette_header(palette: &Palette, constant: bool) -> String {
    let name = &palette.name;
    let body = format!(
        "#define sizeof_{name} {size}\nextern {q}unsigned char {name}[{size}];\n",
        size = palette.byte_size(),
        q = qualifier(constant),
    );
    guarded(name, &body)
}

pub fn palette_source(palette: &Palette, constant: bool) -> String {
    let mut out = format!(
        "{}unsigned char {}[{}] =\n{{\n",
        qualifier(constant),
        palette.name,
        palette.byte_size()
    );
    for entry in &palette.entries[..palette.nr_entries] {
        let target = if entry.valid { entry.target } else { 0 };
        let [lo, hi] = target.to_le_bytes();
        let _ = writeln!(
            out,
            "    0x{:02x}, 0x{:02x}, /* {:3}: {} */",
            lo, hi, entry.index, entry.color
        );
    }
    out.push_str("};\n");
    out
}

fn image_defines(out: &mut String, convert: &Convert, image: &Image, constant: bool) {
    let name = &image.name;
    let _ = writeln!(out, "#define {}_width {}", name, image.width);
    let _ = writeln!(out, "#define {}_height {}", name, image.height);
    let _ = writeln!(out, "#define {}_size {}", name, image.uncompressed_size);
    let q = qualifier(constant);
    if image.compressed {
        let _ = writeln!(out, "#define {}_compressed_size {}", name, image.size());
        let _ = writeln!(out, "extern {}unsigned char {}_compressed[{}];", q, name, image.size());
    } else {
        let _ = writeln!(out, "extern {}unsigned char {}_data[{}];", q, name, image.size());
        if let Some(kind) = sprite_type(convert, image) {
            let _ = writeln!(out, "#define {} (({}*){}_data)", name, kind, name);
        }
    }
}

fn array_name(image: &Image) -> String {
    if image.compressed {
        format!("{}_compressed", image.name)
    } else {
        format!("{}_data", image.name)
    }
}

pub fn convert_header(convert: &Convert, constant: bool) -> String {
    let mut body = String::new();
    for image in &convert.images {
        image_defines(&mut body, convert, image, constant);
        body.push('\n');
    }
    for tileset in &convert.tilesets {
        let name = &tileset.name;
        let _ = writeln!(body, "#define {}_tile_width {}", name, tileset.tile_width);
        let _ = writeln!(body, "#define {}_tile_height {}", name, tileset.tile_height);
        let _ = writeln!(body, "#define {}_num_tiles {}", name, tileset.tiles.len());
        for tile in &tileset.tiles {
            image_defines(&mut body, convert, tile, constant);
        }
        if tileset.pointer_table {
            let _ = writeln!(
                body,
                "extern unsigned char *{}_tiles_data[{}];",
                name,
                tileset.tiles.len()
            );
            let kind = tileset
                .tiles
                .first()
                .and_then(|t| sprite_type(convert, t))
                .unwrap_or("unsigned char");
            let _ = writeln!(body, "#define {}_tiles (({}**){}_tiles_data)", name, kind, name);
        }
        body.push('\n');
    }
    guarded(&convert.name, &body)
}

fn image_array(out: &mut String, image: &Image, constant: bool) {
    let _ = write!(
        out,
        "/* {} */\n{}unsigned char {}[{}] =\n{{\n{}\n}};\n",
        image.path.display(),
        qualifier(constant),
        array_name(image),
        image.size(),
        c_bytes(&image.data, BYTES_PER_LINE)
    );
}

pub fn image_source(image: &Image, constant: bool) -> String {
    let mut out = String::new();
    image_array(&mut out, image, constant);
    out
}

pub fn tileset_source(tileset: &Tileset, constant: bool) -> String {
    let mut out = String::new();
    for tile in &tileset.tiles {
        image_array(&mut out, tile, constant);
        out.push('\n');
    }
    if tileset.pointer_table {
        let count = tileset.tiles.len();
        let _ = writeln!(out, "unsigned char *{}_tiles_data[{}] =\n{{", tileset.name, count);
        for tile in &tileset.tiles {
            let _ = writeln!(out, "    (unsigned char*){},", array_name(tile));
        }
        out.push_str("};\n");
    }
    out
}

pub fn include_file(output: &Output, items: &Items<'_>) -> String {
    let mut body = String::new();
    for palette in &items.palettes {
        let _ = writeln!(body, "#include \"{}.h\"", palette.name);
    }
    for convert in &items.converts {
        let _ = writeln!(body, "#include \"{}.h\"", convert.name);
    }
    let guard: String = output
        .include_file
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    guarded(&guard, &body)
}

pub fn write(output: &Output, items: &Items<'_>) -> Result<Vec<PathBuf>, OutputError> {
    let dir = &output.directory;
    let constant = output.constant;
    let mut written = Vec::new();

    for palette in &items.palettes {
        let header = palette_header(palette, constant);
        written.push(write_file(dir, &format!("{}.h", palette.name), header)?);
        let source = palette_source(palette, constant);
        written.push(write_file(dir, &format!("{}.c", palette.name), source)?);
    }
    for convert in &items.converts {
        let header = convert_header(convert, constant);
        written.push(write_file(dir, &format!("{}.h", convert.name), header)?);
        for image in &convert.images {
            let source = image_source(image, constant);
            written.push(write_file(dir, &format!("{}.c", image.name), source)?);
        }
        for tileset in &convert.tilesets {
            let source = tileset_source(tileset, constant);
            written.push(write_file(dir, &format!("{}.c", tileset.name), source)?);
        }
    }
    written.push(write_file(dir, &output.include_file, include_file(output, items))?);
    Ok(written)
}
