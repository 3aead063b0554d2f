//! Compressors for image data and AppVar payloads.
//!
//! The calculator-side libraries ship decompressors for ZX7, ZX0 and raw LZ4
//! blocks, so those are the three formats offered here.

mod matcher;
pub mod zx0;
pub mod zx7;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Compression failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompressError {
    /// Nothing to compress
    #[error("cannot compress an empty buffer")]
    Empty,
}

/// Compression applied to an image or AppVar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressMode {
    #[default]
    None,
    Zx7,
    Zx0,
    Lz4,
}

impl CompressMode {
    pub fn is_none(self) -> bool {
        self == CompressMode::None
    }
}

impl fmt::Display for CompressMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompressMode::None => "none",
            CompressMode::Zx7 => "zx7",
            CompressMode::Zx0 => "zx0",
            CompressMode::Lz4 => "lz4",
        };
        f.write_str(name)
    }
}

/// Compress `data` with `mode`. `CompressMode::None` returns a copy.
pub fn compress(mode: CompressMode, data: &[u8]) -> Result<Vec<u8>, CompressError> {
    match mode {
        CompressMode::None => Ok(data.to_vec()),
        CompressMode::Zx7 => zx7::compress(data),
        CompressMode::Zx0 => zx0::compress(data),
        CompressMode::Lz4 => {
            if data.is_empty() {
                return Err(CompressError::Empty);
            }
            Ok(lz4_flex::block::compress(data))
        }
    }
}
