//! Convimg - Image conversion for TI-84 Plus CE programs
//!
//! This library provides functionality to:
//! - Quantize image corpora into 256-entry device palettes
//! - Encode images and tilesets as palette, RLE-transparent or direct sprites
//! - Compress data with ZX7, ZX0 or LZ4
//! - Package results as C, assembly, ICE, raw binary or `.8xv` AppVar files

pub mod appvar;
pub mod bitmap;
pub mod cli;
pub mod color;
pub mod compress;
pub mod config;
pub mod convert;
pub mod output;
pub mod palette;
pub mod pipeline;
pub mod pool;
pub mod quantize;
