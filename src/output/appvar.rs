//! AppVar output and its accessor source.
//!
//! Palettes, images and tilesets are packed into one AppVar in output order,
//! converts first unless `palettes-first` is set. The accessor source lets a
//! program find each item once the AppVar is loaded: without a LUT the item
//! offsets are baked into a pointer table that `init` rebases, with a LUT
//! `init` reads the offsets from the AppVar itself.

use super::c::{guarded, sprite_type};
use super::{write_file, AppVarOptions, Items, Output, OutputError, SourceFormat};
use crate::appvar::{AppVar, Layout, SegmentSize};
use crate::convert::{Convert, Image, Tileset};
use crate::palette::Palette;
use std::fmt::Write as _;
use std::path::PathBuf;

/// One segment of the AppVar.
#[derive(Debug, Clone, Copy)]
pub enum Item<'a> {
    Palette(&'a Palette),
    Image(&'a Convert, &'a Image),
    Tileset(&'a Convert, &'a Tileset),
}

impl Item<'_> {
    pub fn name(&self) -> &str {
        match self {
            Item::Palette(p) => &p.name,
            Item::Image(_, i) => &i.name,
            Item::Tileset(_, t) => &t.name,
        }
    }

    pub fn segment(&self) -> SegmentSize {
        match self {
            Item::Palette(p) => SegmentSize::plain(p.byte_size()),
            Item::Image(_, i) => SegmentSize::plain(i.size()),
            Item::Tileset(_, t) => SegmentSize::tileset(t.tiles.iter().map(Image::size).collect()),
        }
    }

    pub fn bytes(&self) -> Vec<u8> {
        match self {
            Item::Palette(p) => p.to_bytes(),
            Item::Image(_, i) => i.data.clone(),
            Item::Tileset(_, t) => {
                t.tiles.iter().flat_map(|tile| tile.data.iter().copied()).collect()
            }
        }
    }
}

/// Items in AppVar order.
pub fn ordered_items<'a>(options: &AppVarOptions, items: &Items<'a>) -> Vec<Item<'a>> {
    let palettes = items.palettes.iter().copied().map(Item::Palette);
    let converts = items.converts.iter().copied().flat_map(|c| {
        let images = c.images.iter().map(move |i| Item::Image(c, i));
        images.chain(c.tilesets.iter().map(move |t| Item::Tileset(c, t)))
    });
    if options.palettes_first {
        palettes.chain(converts).collect()
    } else {
        converts.chain(palettes).collect()
    }
}

pub fn layout(options: &AppVarOptions, items: &[Item<'_>]) -> Layout {
    let segments: Vec<SegmentSize> = items.iter().map(Item::segment).collect();
    Layout::new(options.header.len(), options.lut.then_some(options.entry_size), &segments)
}

/// Build the finalized AppVar.
pub fn build(options: &AppVarOptions, items: &[Item<'_>]) -> Result<(AppVar, Layout), OutputError> {
    let layout = layout(options, items);
    let mut appvar = AppVar::new(&options.name)?
        .with_comment(&options.comment)?
        .with_archived(options.archived)
        .with_compress(options.compress);

    appvar.init(&options.header, &layout)?;
    for item in items {
        appvar.append(&item.bytes())?;
    }
    appvar.finalize()?;
    Ok((appvar, layout))
}

fn entry_type(entry_size: usize) -> &'static str {
    if entry_size == 2 {
        "uint16_t"
    } else {
        "unsigned int"
    }
}

fn c_item_defines(out: &mut String, table: &str, index: usize, item: &Item<'_>) {
    match item {
        Item::Palette(p) => {
            let _ = writeln!(out, "#define sizeof_{} {}", p.name, p.byte_size());
            let _ = writeln!(out, "#define {} ({}[{}])", p.name, table, index);
        }
        Item::Image(convert, image) => {
            let name = &image.name;
            let _ = writeln!(out, "#define {}_width {}", name, image.width);
            let _ = writeln!(out, "#define {}_height {}", name, image.height);
            let _ = writeln!(out, "#define {}_size {}", name, image.uncompressed_size);
            if image.compressed {
                let _ = writeln!(out, "#define {}_compressed_size {}", name, image.size());
                let _ = writeln!(out, "#define {}_compressed ({}[{}])", name, table, index);
            } else if let Some(kind) = sprite_type(convert, image) {
                let _ = writeln!(out, "#define {} (({}*){}[{}])", name, kind, table, index);
            } else {
                let _ = writeln!(out, "#define {}_data ({}[{}])", name, table, index);
            }
        }
        Item::Tileset(convert, tileset) => {
            let name = &tileset.name;
            let count = tileset.tiles.len();
            let _ = writeln!(out, "#define {}_tile_width {}", name, tileset.tile_width);
            let _ = writeln!(out, "#define {}_tile_height {}", name, tileset.tile_height);
            let _ = writeln!(out, "#define {}_num_tiles {}", name, count);
            let kind = tileset
                .tiles
                .first()
                .and_then(|t| sprite_type(convert, t))
                .unwrap_or("unsigned char");
            let _ = writeln!(out, "extern unsigned char *{}_tiles_data[{}];", name, count);
            let _ = writeln!(out, "#define {}_tiles (({}**){}_tiles_data)", name, kind, name);
        }
    }
}

pub fn c_header(options: &AppVarOptions, items: &[Item<'_>]) -> String {
    let table = format!("{}_appvar", options.name);
    let mut body = String::new();
    let _ = writeln!(body, "#define {}_entries_num {}", options.name, items.len());
    let _ = writeln!(body, "extern unsigned char *{}[{}];", table, items.len());
    for (i, item) in items.iter().enumerate() {
        c_item_defines(&mut body, &table, i, item);
    }
    if options.source_init {
        let arg = if options.compress.is_none() { "void" } else { "void *data" };
        let _ = writeln!(body, "unsigned char {}_init({});", options.name, arg);
    }
    guarded(&options.name, &body)
}

fn tilesets<'a, 'b>(items: &'b [Item<'a>]) -> impl Iterator<Item = (usize, &'a Tileset)> + 'b {
    items.iter().enumerate().filter_map(|(i, item)| match item {
        Item::Tileset(_, t) => Some((i, *t)),
        _ => None,
    })
}

/// Code computing the base address of the AppVar data into `base`.
fn init_prologue(out: &mut String, options: &AppVarOptions) {
    if options.compress.is_none() {
        let _ = write!(
            out,
            "    appvar = ti_Open(\"{}\", \"r\");\
             \n    if (appvar == 0)\
             \n    {{\
             \n        return 0;\
             \n    }}\
             \n    base = (unsigned char*)ti_GetDataPtr(appvar);\
             \n    ti_Close(appvar);\n\n",
            options.name
        );
    } else {
        out.push_str("    base = (unsigned char*)data;\n\n");
    }
}

fn init_signature(options: &AppVarOptions) -> String {
    let arg = if options.compress.is_none() { "void" } else { "void *data" };
    format!("unsigned char {}_init({})\n{{\n", options.name, arg)
}

pub fn c_source(options: &AppVarOptions, items: &[Item<'_>], layout: &Layout) -> String {
    let table = format!("{}_appvar", options.name);
    let mut out = format!(
        "#include \"{}.h\"\n\n#include <stdint.h>\n#include <fileioc.h>\n\n",
        options.name
    );

    match layout.entry_size {
        None => {
            let _ = writeln!(out, "unsigned char *{}[{}] =\n{{", table, items.len());
            for (i, item) in items.iter().enumerate() {
                let offset = layout.offsets[i];
                let _ = writeln!(out, "    (unsigned char*){}, /* {} */", offset, item.name());
            }
            out.push_str("};\n\n");
            for (tileset_index, (item_index, tileset)) in tilesets(items).enumerate() {
                let count = tileset.tiles.len();
                let name = &tileset.name;
                let _ = writeln!(out, "unsigned char *{}_tiles_data[{}] =\n{{", name, count);
                let base = layout.offsets[item_index];
                for offset in &layout.tile_offsets[tileset_index] {
                    let _ = writeln!(out, "    (unsigned char*){},", base + offset);
                }
                out.push_str("};\n\n");
            }

            if options.source_init {
                out.push_str(&init_signature(options));
                out.push_str("    unsigned char *base;\n    unsigned int i;\n");
                if options.compress.is_none() {
                    out.push_str("    uint8_t appvar;\n");
                }
                out.push('\n');
                init_prologue(&mut out, options);
                let _ = write!(
                    out,
                    "    for (i = 0; i < {}; i++)\
                     \n    {{\
                     \n        {}[i] += (unsigned int)base;\
                     \n    }}\n",
                    items.len(),
                    table
                );
                for (_, tileset) in tilesets(items) {
                    let _ = write!(
                        out,
                        "    for (i = 0; i < {}; i++)\
                         \n    {{\
                         \n        {}_tiles_data[i] += (unsigned int)base;\
                         \n    }}\n",
                        tileset.tiles.len(),
                        tileset.name
                    );
                }
                out.push_str("\n    return 1;\n}\n");
            }
        }
        Some(entry_size) => {
            let entry = entry_type(entry_size);
            let _ = writeln!(out, "unsigned char *{}[{}];", table, items.len());
            for (_, tileset) in tilesets(items) {
                let count = tileset.tiles.len();
                let _ = writeln!(out, "unsigned char *{}_tiles_data[{}];", tileset.name, count);
            }
            out.push('\n');

            if options.source_init {
                out.push_str(&init_signature(options));
                let _ = writeln!(
                    out,
                    "    unsigned char *base;\n    {} *lut;\n    unsigned int i;",
                    entry
                );
                if options.compress.is_none() {
                    out.push_str("    uint8_t appvar;\n");
                }
                out.push('\n');
                init_prologue(&mut out, options);
                let _ = write!(
                    out,
                    "    base += {header};\
                     \n    lut = ({entry}*)base;\
                     \n    if (lut[0] != {count})\
                     \n    {{\
                     \n        return 0;\
                     \n    }}\
                     \n\
                     \n    for (i = 0; i < {count}; i++)\
                     \n    {{\
                     \n        {table}[i] = base + lut[i + 1];\
                     \n    }}\n",
                    header = layout.header_len,
                    entry = entry,
                    count = items.len(),
                    table = table
                );
                for (tileset_index, (item_index, tileset)) in tilesets(items).enumerate() {
                    let _ = write!(
                        out,
                        "\n    lut = ({entry}*)(base + {page});\
                         \n    for (i = 0; i < {count}; i++)\
                         \n    {{\
                         \n        {name}_tiles_data[i] = {table}[{item}] + lut[i];\
                         \n    }}\n",
                        entry = entry,
                        page = layout.tile_pages[tileset_index],
                        count = tileset.tiles.len(),
                        name = tileset.name,
                        table = table,
                        item = item_index
                    );
                }
                out.push_str("\n    return 1;\n}\n");
            }
        }
    }
    out
}

pub fn asm_source(options: &AppVarOptions, items: &[Item<'_>], layout: &Layout) -> String {
    let name = &options.name;
    let mut out = String::new();
    let _ = writeln!(out, "{}_header_size := {}", name, layout.header_len);
    let _ = writeln!(out, "{}_entries_num := {}", name, items.len());
    if let Some(entry_size) = layout.entry_size {
        let _ = writeln!(out, "{}_lut_entry_size := {}", name, entry_size);
    }
    for (i, item) in items.iter().enumerate() {
        let _ = writeln!(out, "{}_offset := {}", item.name(), layout.offsets[i]);
        if let Item::Image(_, image) = item {
            let _ = writeln!(out, "{}_width := {}", image.name, image.width);
            let _ = writeln!(out, "{}_height := {}", image.name, image.height);
        }
    }
    for (tileset_index, (_, tileset)) in tilesets(items).enumerate() {
        if let Some(page) = layout.tile_pages.get(tileset_index) {
            let _ = writeln!(out, "{}_tile_page := {}", tileset.name, page);
        }
        for (tile, offset) in tileset.tiles.iter().zip(&layout.tile_offsets[tileset_index]) {
            let _ = writeln!(out, "{}_offset := {}", tile.name, offset);
        }
    }
    out
}

pub fn write(
    output: &Output,
    options: &AppVarOptions,
    items: &Items<'_>,
) -> Result<Vec<PathBuf>, OutputError> {
    let dir = &output.directory;
    let ordered = ordered_items(options, items);
    let (mut appvar, layout) = build(options, &ordered)?;

    let path = dir.join(format!("{}.8xv", options.name));
    appvar.write(&path)?;
    log::info!(
        "appvar {}: {} items, {} bytes ({} uncompressed)",
        options.name,
        ordered.len(),
        appvar.size(),
        appvar.uncompressed_size()
    );

    let mut written = vec![path];
    let name = &options.name;
    match options.source {
        SourceFormat::C => {
            let header = c_header(options, &ordered);
            written.push(write_file(dir, &format!("{}.h", name), header)?);
            let source = c_source(options, &ordered, &layout);
            written.push(write_file(dir, &format!("{}.c", name), source)?);
        }
        SourceFormat::Asm => {
            let source = asm_source(options, &ordered, &layout);
            written.push(write_file(dir, &format!("{}.asm", name), source)?);
        }
        SourceFormat::None => {}
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compress::CompressMode;
    use crate::convert::TilesetGroup;
    use image::RgbaImage;

    fn image(name: &str, data: Vec<u8>) -> Image {
        let mut image = Image::from_rgba(name, PathBuf::from("x.png"), RgbaImage::new(2, 2));
        image.uncompressed_size = data.len();
        image.data = data;
        image
    }

    fn convert() -> Convert {
        let mut convert = Convert::new("sprites");
        convert.images.push(image("ball", vec![2, 2, 1, 1, 1, 1]));
        convert.tilesets.push(Tileset {
            name: "map".to_string(),
            path: PathBuf::from("map.png"),
            tile_width: 1,
            tile_height: 1,
            tiles: vec![image("map_tile_0", vec![1, 1, 5]), image("map_tile_1", vec![1, 1, 6])],
            pointer_table: true,
        });
        convert.tileset_group = Some(TilesetGroup {
            tile_width: 1,
            tile_height: 1,
            pointer_table: true,
            images: vec![],
        });
        convert
    }

    fn palette() -> Palette {
        let mut palette = Palette::new("pal");
        palette.nr_entries = 2;
        palette.entries[0].valid = true;
        palette.entries[0].target = 0x1234;
        palette.entries[1].valid = true;
        palette.entries[1].target = 0xFFFF;
        palette
    }

    #[test]
    fn test_item_order() {
        let (p, c) = (palette(), convert());
        let items = Items { palettes: vec![&p], converts: vec![&c] };
        let mut options = AppVarOptions::new("GFX");

        let ordered = ordered_items(&options, &items);
        let names: Vec<&str> = ordered.iter().map(|i| i.name()).collect();
        assert_eq!(names, vec!["ball", "map", "pal"]);

        options.palettes_first = true;
        let ordered = ordered_items(&options, &items);
        assert_eq!(ordered[0].name(), "pal");
    }

    #[test]
    fn test_lut_appvar_contents() {
        let (p, c) = (palette(), convert());
        let items = Items { palettes: vec![&p], converts: vec![&c] };
        let mut options = AppVarOptions::new("GFX");
        options.lut = true;
        options.palettes_first = true;
        let ordered = ordered_items(&options, &items);
        let (appvar, layout) = build(&options, &ordered).unwrap();

        // 4 entries of 3 bytes, then a 2 tile page
        assert_eq!(layout.lut_len, 18);
        let data = appvar.data();
        assert_eq!(&data[..3], &[3, 0, 0]);
        assert_eq!(&data[3..6], &[18, 0, 0]);
        assert_eq!(&data[18..22], &[0x34, 0x12, 0xFF, 0xFF]);
        assert_eq!(&data[6..9], &[22, 0, 0]);
        assert_eq!(&data[22..28], &[2, 2, 1, 1, 1, 1]);
        assert_eq!(&data[9..12], &[28, 0, 0]);
        assert_eq!(&data[12..18], &[0, 0, 0, 3, 0, 0]);
        assert_eq!(&data[28..], &[1, 1, 5, 1, 1, 6]);
    }

    #[test]
    fn test_c_source_without_lut() {
        let (p, c) = (palette(), convert());
        let items = Items { palettes: vec![&p], converts: vec![&c] };
        let options = AppVarOptions::new("GFX");
        let ordered = ordered_items(&options, &items);
        let layout = layout(&options, &ordered);

        let source = c_source(&options, &ordered, &layout);
        assert!(source.contains("unsigned char *GFX_appvar[3] =\n{\n"));
        assert!(source.contains("{\n    (unsigned char*)0, /* ball */"));
        assert!(source.contains("    (unsigned char*)6, /* map */"));
        assert!(source.contains("    (unsigned char*)12, /* pal */"));
        assert!(source.contains(
            "unsigned char *map_tiles_data[2] =\n{\n    (unsigned char*)6,\n    (unsigned char*)9,"
        ));
        assert!(source.contains("ti_Open(\"GFX\", \"r\")"));
        assert!(source.contains("GFX_appvar[i] += (unsigned int)base;"));

        let header = c_header(&options, &ordered);
        assert!(header.contains("#define ball ((gfx_sprite_t*)GFX_appvar[0])"));
        assert!(header.contains("#define pal (GFX_appvar[2])"));
        assert!(header.contains("unsigned char GFX_init(void);"));
    }

    #[test]
    fn test_c_source_with_lut() {
        let (p, c) = (palette(), convert());
        let items = Items { palettes: vec![&p], converts: vec![&c] };
        let mut options = AppVarOptions::new("GFX");
        options.lut = true;
        options.entry_size = 2;
        options.compress = CompressMode::Zx0;
        let ordered = ordered_items(&options, &items);
        let layout = layout(&options, &ordered);

        let source = c_source(&options, &ordered, &layout);
        assert!(source.contains("unsigned char GFX_init(void *data)"));
        assert!(source.contains("uint16_t *lut;"));
        assert!(source.contains("if (lut[0] != 3)"));
        assert!(source.contains("lut = (uint16_t*)(base + 8);"));
        assert!(source.contains("map_tiles_data[i] = GFX_appvar[1] + lut[i];"));
        assert!(!source.contains("ti_Open"));
    }

    #[test]
    fn test_write_files() {
        let dir = tempfile::tempdir().unwrap();
        let (p, c) = (palette(), convert());
        let mut options = AppVarOptions::new("GFX");
        options.source = SourceFormat::Asm;
        let output =
            Output::new(super::super::OutputFormat::AppVar(options)).with_directory(dir.path());
        let written = output.generate(&Items { palettes: vec![&p], converts: vec![&c] }).unwrap();

        assert_eq!(written, vec![dir.path().join("GFX.8xv"), dir.path().join("GFX.asm")]);
        let asm = std::fs::read_to_string(dir.path().join("GFX.asm")).unwrap();
        assert!(asm.contains("map_tile_1_offset := 3"));
        assert!(asm.contains("pal_offset := 12"));
        let file = std::fs::read(dir.path().join("GFX.8xv")).unwrap();
        assert_eq!(file.len(), 0x4A + 16 + 2);
    }
}
