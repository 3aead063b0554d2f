//! Configuration schema types for `convimg.toml`
//!
//! Defines the structure and validation rules for a conversion project.

use crate::appvar::AppVar;
use crate::bitmap::Rotation;
use crate::color::{parse_hex, Color, ColorFormat};
use crate::compress::CompressMode;
use crate::convert::{Bpp, Style};
use crate::output::SourceFormat;
use crate::palette::{builtin, FixedEntry, MAX_PALETTE_ENTRIES};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Where a palette gets its colors: the `"automatic"` keyword or a list of
/// image patterns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PaletteImages {
    Keyword(String),
    List(Vec<String>),
}

impl Default for PaletteImages {
    fn default() -> Self {
        Self::Keyword("automatic".to_string())
    }
}

impl PaletteImages {
    pub fn is_automatic(&self) -> bool {
        matches!(self, PaletteImages::Keyword(k) if k == "automatic")
    }
}

/// A pinned palette color, given either as `color = "#RRGGBB"` or as
/// separate `r`, `g`, `b` components.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct FixedEntryConfig {
    pub color: Option<String>,
    pub r: Option<u8>,
    pub g: Option<u8>,
    pub b: Option<u8>,
    pub index: u8,
    #[serde(default)]
    pub exact: bool,
}

impl FixedEntryConfig {
    pub fn to_fixed(&self) -> Result<FixedEntry, String> {
        let color = match (&self.color, self.r, self.g, self.b) {
            (Some(hex), None, None, None) => parse_hex(hex).map_err(|e| e.to_string())?,
            (None, Some(r), Some(g), Some(b)) => Color::new(r, g, b),
            _ => return Err("needs either 'color' or all of 'r', 'g' and 'b'".to_string()),
        };
        Ok(FixedEntry { color, index: self.index, exact: self.exact })
    }
}

/// `[[palettes]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PaletteConfig {
    pub name: String,
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
    #[serde(default = "default_quantize_speed")]
    pub quantize_speed: u8,
    #[serde(default)]
    pub color_format: ColorFormat,
    #[serde(default)]
    pub images: PaletteImages,
    #[serde(default)]
    pub fixed_entries: Vec<FixedEntryConfig>,
}

fn default_max_entries() -> usize {
    MAX_PALETTE_ENTRIES
}

fn default_quantize_speed() -> u8 {
    4
}

fn default_true() -> bool {
    true
}

/// `tilesets` table of a convert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TilesetConfig {
    pub tile_width: u32,
    pub tile_height: u32,
    #[serde(default = "default_true")]
    pub pointer_table: bool,
    pub images: Vec<String>,
}

/// `[[converts]]` entry
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConvertConfig {
    pub name: String,
    pub palette: Option<String>,
    #[serde(default)]
    pub images: Vec<String>,
    pub tilesets: Option<TilesetConfig>,
    #[serde(default)]
    pub style: Style,
    #[serde(default = "default_direct_format")]
    pub color_format: ColorFormat,
    #[serde(default)]
    pub transparent_index: u8,
    #[serde(default)]
    pub palette_offset: u8,
    #[serde(default)]
    pub omit_indices: Vec<u8>,
    #[serde(default)]
    pub bpp: Bpp,
    #[serde(default = "default_true")]
    pub width_and_height: bool,
    #[serde(default)]
    pub swap_width_height: bool,
    #[serde(default)]
    pub compress: CompressMode,
    #[serde(default)]
    pub rotate: Rotation,
    #[serde(default)]
    pub flip_x: bool,
    #[serde(default)]
    pub flip_y: bool,
    #[serde(default)]
    pub dither: f32,
}

fn default_direct_format() -> ColorFormat {
    ColorFormat::Rgb565
}

/// Output type keyword
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    C,
    Asm,
    Bin,
    #[serde(alias = "basic")]
    Ice,
    Appvar,
}

/// `[[outputs]]` entry. The appvar keys are ignored by the other types.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct OutputConfig {
    #[serde(rename = "type")]
    pub output_type: OutputType,
    #[serde(default)]
    pub directory: PathBuf,
    pub include_file: Option<String>,
    #[serde(default)]
    pub palettes: Vec<String>,
    #[serde(default)]
    pub converts: Vec<String>,
    #[serde(default, rename = "const")]
    pub constant: bool,

    pub name: Option<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "default_true")]
    pub archived: bool,
    #[serde(default)]
    pub source_format: SourceFormat,
    #[serde(default = "default_true")]
    pub source_init: bool,
    #[serde(default)]
    pub lut_entries: bool,
    #[serde(default = "default_lut_entry_size")]
    pub lut_entry_size: usize,
    #[serde(default)]
    pub header_string: String,
    #[serde(default)]
    pub compress: CompressMode,
    #[serde(default)]
    pub palettes_first: bool,
}

fn default_lut_entry_size() -> usize {
    3
}

/// Complete convimg.toml configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConvimgConfig {
    #[serde(default)]
    pub palettes: Vec<PaletteConfig>,
    #[serde(default)]
    pub converts: Vec<ConvertConfig>,
    #[serde(default)]
    pub outputs: Vec<OutputConfig>,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "converts.sprites.bpp")
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "convimg.toml: '{}' {}", self.field, self.message)
    }
}

impl ConvimgConfig {
    /// Whether `name` refers to a declared palette or a built-in one.
    pub fn has_palette(&self, name: &str) -> bool {
        builtin::is_builtin(name) || self.palettes.iter().any(|p| p.name == name)
    }

    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: String, message: &str| {
            errors.push(ConfigValidationError { field, message: message.to_string() });
        };

        let mut seen = HashSet::new();
        for palette in &self.palettes {
            let field = format!("palettes.{}", palette.name);
            if palette.name.is_empty() {
                push("palettes.name".to_string(), "must be a non-empty string");
            }
            if !seen.insert(palette.name.as_str()) {
                push(field.clone(), "is declared more than once");
            }
            if !(2..=MAX_PALETTE_ENTRIES).contains(&palette.max_entries) {
                push(format!("{}.max-entries", field), "must be between 2 and 256");
            }
            if !(1..=10).contains(&palette.quantize_speed) {
                push(format!("{}.quantize-speed", field), "must be between 1 and 10");
            }
            match &palette.images {
                PaletteImages::Keyword(_) if !palette.images.is_automatic() => {
                    push(format!("{}.images", field), "must be \"automatic\" or a list of images");
                }
                PaletteImages::List(_) if builtin::is_builtin(&palette.name) => {
                    push(format!("{}.images", field), "cannot be set on a built-in palette");
                }
                _ => {}
            }
            if !palette.color_format.is_16bit() {
                push(format!("{}.color-format", field), "must be a 16-bit format for a palette");
            }
            let mut indices = HashSet::new();
            for entry in &palette.fixed_entries {
                let entry_field = format!("{}.fixed-entries.{}", field, entry.index);
                if let Err(message) = entry.to_fixed() {
                    push(entry_field.clone(), &message);
                }
                if entry.index as usize >= palette.max_entries {
                    push(entry_field.clone(), "index must be below max-entries");
                }
                if !indices.insert(entry.index) {
                    push(entry_field, "index is pinned more than once");
                }
            }
        }

        let mut seen = HashSet::new();
        for convert in &self.converts {
            let field = format!("converts.{}", convert.name);
            if convert.name.is_empty() {
                push("converts.name".to_string(), "must be a non-empty string");
            }
            if !seen.insert(convert.name.as_str()) {
                push(field.clone(), "is declared more than once");
            }
            match &convert.palette {
                Some(name) if !self.has_palette(name) => {
                    push(format!("{}.palette", field), "names an unknown palette");
                }
                None if convert.style != Style::Direct => {
                    push(format!("{}.palette", field), "is required unless style is \"direct\"");
                }
                _ => {}
            }
            if convert.style == Style::Rlet && convert.bpp != Bpp::Eight {
                push(format!("{}.bpp", field), "must be 8 for the rlet style");
            }
            if convert.style == Style::Direct && convert.bpp != Bpp::Eight {
                push(format!("{}.bpp", field), "must be 8 for the direct style");
            }
            if convert.style == Style::Direct && !convert.omit_indices.is_empty() {
                push(format!("{}.omit-indices", field), "has no effect on the direct style");
            }
            if convert.images.is_empty() && convert.tilesets.is_none() {
                push(
                    format!("{}.images", field),
                    "must contain at least one image or a tilesets table",
                );
            }
            if let Some(tilesets) = &convert.tilesets {
                if tilesets.tile_width == 0 || tilesets.tile_height == 0 {
                    push(format!("{}.tilesets", field), "tile dimensions must be positive");
                }
                if tilesets.images.is_empty() {
                    push(format!("{}.tilesets.images", field), "must contain at least one image");
                }
            }
            if !(0.0..=1.0).contains(&convert.dither) {
                push(format!("{}.dither", field), "must be between 0 and 1");
            }
        }

        for (i, output) in self.outputs.iter().enumerate() {
            let field = format!("outputs.{}", i);
            for name in &output.palettes {
                if !self.has_palette(name) {
                    let message = format!("names an unknown palette '{}'", name);
                    push(format!("{}.palettes", field), &message);
                }
            }
            for name in &output.converts {
                if !self.converts.iter().any(|c| &c.name == name) {
                    let message = format!("names an unknown convert '{}'", name);
                    push(format!("{}.converts", field), &message);
                }
            }
            if output.output_type != OutputType::Appvar {
                continue;
            }
            match &output.name {
                Some(name) => {
                    let appvar = AppVar::new(name).and_then(|a| a.with_comment(&output.comment));
                    if let Err(e) = appvar {
                        push(format!("{}.name", field), &e.to_string());
                    }
                }
                None => push(format!("{}.name", field), "is required for appvar outputs"),
            }
            if output.lut_entry_size != 2 && output.lut_entry_size != 3 {
                push(format!("{}.lut-entry-size", field), "must be 2 or 3");
            }
        }

        errors
    }
}
