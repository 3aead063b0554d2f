//! Configuration loading and discovery for `convimg.toml`
//!
//! Finds and parses the project file, then resolves it into a
//! [`Project`]: image patterns are expanded relative to the project file and
//! built-in palettes that are referenced but not declared are added.

use super::schema::{
    ConvertConfig, ConvimgConfig, OutputConfig, OutputType, PaletteConfig, PaletteImages,
};
use crate::bitmap::Orientation;
use crate::convert::{Convert, ConvertSettings, Dimensions, TilesetGroup};
use crate::output::{AppVarOptions, Output, OutputFormat};
use crate::palette::{builtin, Palette, PaletteSource};
use crate::pipeline::Project;
use glob::glob;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project file.
pub const CONFIG_FILE: &str = "convimg.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML parsing error
    #[error("failed to parse convimg.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// No project file in the current directory or its parents
    #[error("no convimg.toml found")]
    NotFound,
    /// Validation error
    #[error("config validation failed:\n{}", bulleted(.0))]
    Validation(Vec<String>),
}

fn bulleted(errors: &[String]) -> String {
    errors.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n")
}

/// Find convimg.toml by walking up from the current working directory.
pub fn find_config() -> Option<PathBuf> {
    env::current_dir().ok().and_then(find_config_from)
}

/// Find convimg.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Some(config_path);
        }
        if !current.pop() {
            return None;
        }
    }
}

/// Load and validate a project file.
///
/// With no `path` the file is located with [`find_config`]. Returns the path
/// that was read alongside the configuration.
pub fn load_config(path: Option<&Path>) -> Result<(PathBuf, ConvimgConfig), ConfigError> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => find_config().ok_or(ConfigError::NotFound)?,
    };

    let contents = fs::read_to_string(&config_path)
        .map_err(|source| ConfigError::Io { path: config_path.clone(), source })?;
    let config: ConvimgConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    Ok((config_path, config))
}

/// Directory containing the project file, against which relative paths
/// resolve.
pub fn project_root(config_path: &Path) -> &Path {
    config_path.parent().unwrap_or_else(|| Path::new(""))
}

/// Load a project file and resolve it into a runnable [`Project`].
pub fn load_project(path: Option<&Path>) -> Result<Project, ConfigError> {
    let (config_path, config) = load_config(path)?;
    resolve_project(&config, project_root(&config_path))
}

/// Resolve a validated configuration against `root`.
pub fn resolve_project(config: &ConvimgConfig, root: &Path) -> Result<Project, ConfigError> {
    let mut errors = Vec::new();
    let mut project = Project::default();

    for palette in &config.palettes {
        match resolve_palette(palette, root) {
            Ok(p) => project.palettes.push(p),
            Err(e) => errors.extend(e),
        }
    }

    let referenced = config
        .converts
        .iter()
        .filter_map(|c| c.palette.as_deref())
        .chain(config.outputs.iter().flat_map(|o| o.palettes.iter().map(String::as_str)));
    for name in referenced {
        let declared = project.palettes.iter().any(|p| p.name == name);
        if !declared && builtin::is_builtin(name) {
            log::debug!("using built-in palette '{}'", name);
            project.palettes.push(Palette::new(name));
        }
    }

    for convert in &config.converts {
        match resolve_convert(convert, root) {
            Ok(c) => project.converts.push(c),
            Err(e) => errors.extend(e),
        }
    }

    project.outputs = config.outputs.iter().map(|o| resolve_output(o, root)).collect();

    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors));
    }
    Ok(project)
}

/// Expand image patterns relative to `root`, keeping pattern order and
/// sorting the matches of each pattern.
pub fn expand_images(
    root: &Path,
    patterns: &[String],
    field: &str,
) -> Result<Vec<PathBuf>, Vec<String>> {
    let mut files = Vec::new();
    let mut errors = Vec::new();

    for pattern in patterns {
        let full_pattern = root.join(pattern);
        let paths = match glob(&full_pattern.to_string_lossy()) {
            Ok(paths) => paths,
            Err(e) => {
                errors.push(format!(
                    "convimg.toml: '{}' invalid pattern '{}': {}",
                    field, pattern, e
                ));
                continue;
            }
        };

        let mut matched: Vec<PathBuf> =
            paths.filter_map(Result::ok).filter(|p| p.is_file()).collect();
        if matched.is_empty() {
            errors.push(format!("convimg.toml: '{}' no image matches '{}'", field, pattern));
        }
        matched.sort();
        files.extend(matched);
    }

    if errors.is_empty() {
        Ok(files)
    } else {
        Err(errors)
    }
}

fn resolve_palette(config: &PaletteConfig, root: &Path) -> Result<Palette, Vec<String>> {
    let mut palette = Palette::new(&config.name)
        .with_max_entries(config.max_entries)
        .with_format(config.color_format)
        .with_quantize_speed(config.quantize_speed);

    for entry in &config.fixed_entries {
        let fixed = entry.to_fixed().map_err(|e| vec![e])?;
        palette = palette.with_fixed_entry(fixed);
    }

    if let PaletteImages::List(patterns) = &config.images {
        let field = format!("palettes.{}.images", config.name);
        let images = expand_images(root, patterns, &field)?;
        palette = palette.with_source(PaletteSource::Images(images));
    }
    Ok(palette)
}

fn resolve_convert(config: &ConvertConfig, root: &Path) -> Result<Convert, Vec<String>> {
    let settings = ConvertSettings {
        style: config.style,
        color_format: config.color_format,
        transparent_index: config.transparent_index,
        palette_offset: config.palette_offset,
        omit_indices: config.omit_indices.clone(),
        bpp: config.bpp,
        dimensions: Dimensions::from_flags(config.width_and_height, config.swap_width_height),
        compress: config.compress,
        orientation: Orientation {
            rotate: config.rotate,
            flip_x: config.flip_x,
            flip_y: config.flip_y,
        },
        dither: config.dither,
    };

    let mut errors = Vec::new();
    let field = format!("converts.{}.images", config.name);
    let images = expand_images(root, &config.images, &field).unwrap_or_else(|e| {
        errors.extend(e);
        Vec::new()
    });

    let mut convert = Convert::new(&config.name).with_settings(settings).with_images(images);
    if let Some(palette) = &config.palette {
        convert = convert.with_palette(palette);
    }

    if let Some(tilesets) = &config.tilesets {
        let field = format!("converts.{}.tilesets.images", config.name);
        match expand_images(root, &tilesets.images, &field) {
            Ok(images) => {
                convert = convert.with_tilesets(TilesetGroup {
                    tile_width: tilesets.tile_width,
                    tile_height: tilesets.tile_height,
                    pointer_table: tilesets.pointer_table,
                    images,
                });
            }
            Err(e) => errors.extend(e),
        }
    }

    if errors.is_empty() {
        Ok(convert)
    } else {
        Err(errors)
    }
}

fn resolve_output(config: &OutputConfig, root: &Path) -> Output {
    let format = match config.output_type {
        OutputType::C => OutputFormat::C,
        OutputType::Asm => OutputFormat::Asm,
        OutputType::Bin => OutputFormat::Bin,
        OutputType::Ice => OutputFormat::Ice,
        OutputType::Appvar => {
            let mut options = AppVarOptions::new(config.name.clone().unwrap_or_default());
            options.comment = config.comment.clone();
            options.archived = config.archived;
            options.source = config.source_format;
            options.source_init = config.source_init;
            options.lut = config.lut_entries;
            options.entry_size = config.lut_entry_size;
            options.header = config.header_string.as_bytes().to_vec();
            options.compress = config.compress;
            options.palettes_first = config.palettes_first;
            OutputFormat::AppVar(options)
        }
    };

    let mut output = Output::new(format)
        .with_directory(root.join(&config.directory))
        .with_palettes(config.palettes.clone())
        .with_converts(config.converts.clone());
    if let Some(include_file) = &config.include_file {
        output.include_file = include_file.clone();
    }
    output.constant = config.constant;
    output
}
