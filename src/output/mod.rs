//! Output formats.
//!
//! An output takes finished palettes and converts and writes them out in one
//! of the supported formats:
//!
//! - **C**: `.c`/`.h` pairs with byte arrays and `#define`s
//! - **Asm**: `.asm` files with labels and `db` data
//! - **Bin**: raw `.bin` files plus a listing
//! - **Ice**: hex strings for ICE programs
//! - **AppVar**: a `.8xv` file with optional C or assembly accessors

pub mod appvar;
pub mod asm;
pub mod bin;
pub mod c;
pub mod ice;

use crate::appvar::AppVarError;
use crate::compress::CompressMode;
use crate::convert::Convert;
use crate::palette::Palette;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while writing outputs.
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to write '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    AppVar(#[from] AppVarError),
}

/// Accessor source emitted next to an AppVar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    #[default]
    C,
    Asm,
    None,
}

/// AppVar specific output options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppVarOptions {
    pub name: String,
    pub comment: String,
    pub archived: bool,
    pub source: SourceFormat,
    /// Emit the `init` function in the accessor source
    pub source_init: bool,
    /// Store a lookup table of item offsets
    pub lut: bool,
    /// LUT entry width in bytes, 2 or 3
    pub entry_size: usize,
    /// Bytes copied to the start of the AppVar data
    pub header: Vec<u8>,
    pub compress: CompressMode,
    /// Lay out palettes before converts
    pub palettes_first: bool,
}

impl AppVarOptions {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            comment: String::new(),
            archived: true,
            source: SourceFormat::C,
            source_init: true,
            lut: false,
            entry_size: 3,
            header: Vec::new(),
            compress: CompressMode::None,
            palettes_first: false,
        }
    }
}

/// The format an output is written in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    C,
    Asm,
    Bin,
    Ice,
    AppVar(AppVarOptions),
}

impl OutputFormat {
    pub fn name(&self) -> &'static str {
        match self {
            OutputFormat::C => "c",
            OutputFormat::Asm => "asm",
            OutputFormat::Bin => "bin",
            OutputFormat::Ice => "ice",
            OutputFormat::AppVar(_) => "appvar",
        }
    }

    /// Include file written when the project does not name one.
    pub fn default_include_file(&self) -> &'static str {
        match self {
            OutputFormat::C => "gfx.h",
            OutputFormat::Asm => "gfx.inc",
            OutputFormat::Bin => "bin.txt",
            OutputFormat::Ice => "ice.txt",
            OutputFormat::AppVar(_) => "",
        }
    }
}

/// One `[[outputs]]` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Output {
    pub format: OutputFormat,
    pub directory: PathBuf,
    pub include_file: String,
    pub palettes: Vec<String>,
    pub converts: Vec<String>,
    /// Declare C arrays `const`
    pub constant: bool,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        let include_file = format.default_include_file().to_string();
        Self {
            format,
            directory: PathBuf::new(),
            include_file,
            palettes: Vec::new(),
            converts: Vec::new(),
            constant: false,
        }
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_palettes(mut self, palettes: Vec<String>) -> Self {
        self.palettes = palettes;
        self
    }

    pub fn with_converts(mut self, converts: Vec<String>) -> Self {
        self.converts = converts;
        self
    }

    /// Write every file of this output, returning their paths.
    pub fn generate(&self, items: &Items<'_>) -> Result<Vec<PathBuf>, OutputError> {
        fs::create_dir_all(&self.directory)
            .map_err(|source| OutputError::Io { path: self.directory.clone(), source })?;

        let written = match &self.format {
            OutputFormat::C => c::write(self, items)?,
            OutputFormat::Asm => asm::write(self, items)?,
            OutputFormat::Bin => bin::write(self, items)?,
            OutputFormat::Ice => ice::write(self, items)?,
            OutputFormat::AppVar(options) => appvar::write(self, options, items)?,
        };
        for path in &written {
            log::info!("wrote {}", path.display());
        }
        Ok(written)
    }
}

/// Finished palettes and converts an output reads, in output order.
#[derive(Debug, Clone, Default)]
pub struct Items<'a> {
    pub palettes: Vec<&'a Palette>,
    pub converts: Vec<&'a Convert>,
}

pub(crate) fn write_file(
    dir: &Path,
    name: &str,
    contents: impl AsRef<[u8]>,
) -> Result<PathBuf, OutputError> {
    let path = dir.join(name);
    fs::write(&path, contents).map_err(|source| OutputError::Io { path: path.clone(), source })?;
    Ok(path)
}

/// Comma separated `0x..` bytes, `per_line` to a line, indented.
pub(crate) fn c_bytes(data: &[u8], per_line: usize) -> String {
    let mut out = String::new();
    for (i, chunk) in data.chunks(per_line).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        out.push_str("    ");
        let line: Vec<String> = chunk.iter().map(|b| format!("0x{:02x}", b)).collect();
        out.push_str(&line.join(", "));
        out.push(',');
    }
    out
}

/// `db` lines of `$..` bytes.
pub(crate) fn asm_bytes(data: &[u8], per_line: usize) -> String {
    data.chunks(per_line)
        .map(|chunk| {
            let line: Vec<String> = chunk.iter().map(|b| format!("${:02X}", b)).collect();
            format!("\tdb\t{}\n", line.join(", "))
        })
        .collect()
}

pub(crate) fn hex_string(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_c_bytes() {
        assert_eq!(c_bytes(&[1, 2, 255], 2), "    0x01, 0x02,\n    0xff,");
        assert_eq!(c_bytes(&[], 4), "");
    }

    #[test]
    fn test_asm_bytes() {
        assert_eq!(asm_bytes(&[0xA, 0xB, 0xC], 2), "\tdb\t$0A, $0B\n\tdb\t$0C\n");
    }

    #[test]
    fn test_hex_string() {
        assert_eq!(hex_string(&[0xDE, 0xAD, 0x01]), "DEAD01");
    }

    #[test]
    fn test_default_include_files() {
        assert_eq!(Output::new(OutputFormat::C).include_file, "gfx.h");
        assert_eq!(Output::new(OutputFormat::Ice).include_file, "ice.txt");
        assert_eq!(OutputFormat::AppVar(AppVarOptions::new("X")).name(), "appvar");
    }
}
