//! Color codec for on-device pixel encodings
//!
//! Converts 8-bit RGB colors to and from the encodings the calculator
//! understands:
//! - `Rgb565` / `Bgr565`: 16-bit colors used by the LCD
//! - `Grgb1555`: the 1555 palette format used by the graphics library
//! - `Rgb888` / `Bgr888`: raw byte triples (direct style only)
//!
//! Also parses the `#RRGGBB` / `#RGB` color strings used in project files.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::ParseIntError;
use thiserror::Error;

/// Error type for color parsing failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    /// Input string was empty
    #[error("empty color string")]
    Empty,
    /// Input string doesn't start with '#'
    #[error("color must start with '#'")]
    MissingHash,
    /// Invalid length (must be 3 or 6 hex chars after #)
    #[error("invalid color length {0}, expected 3 or 6")]
    InvalidLength(usize),
    /// Contains non-hex characters
    #[error("invalid hex character '{0}'")]
    InvalidHex(char),
}

/// An 8-bit per channel RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Round-trip this color through `format` so it has the precision the
    /// final artifact will store.
    pub fn normalize(self, format: ColorFormat) -> Color {
        normalize(self, format)
    }

    /// Sort key used for palette ordering.
    pub fn key(self) -> (u8, u8, u8) {
        (self.r, self.g, self.b)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rgb({:3}, {:3}, {:3})", self.r, self.g, self.b)
    }
}

/// On-device color encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColorFormat {
    /// `rrrrrggg gggbbbbb`
    Rgb565,
    /// `bbbbbggg gggrrrrr`
    Bgr565,
    /// `grrrrrgg gggbbbbb`, low green bit stored in bit 15
    #[default]
    #[serde(alias = "gbgr1555")]
    Grgb1555,
    /// Raw `r, g, b` bytes
    Rgb888,
    /// Raw `b, g, r` bytes
    Bgr888,
}

impl ColorFormat {
    /// Number of bytes one encoded color occupies.
    pub fn bytes_per_color(self) -> usize {
        match self {
            ColorFormat::Rgb565 | ColorFormat::Bgr565 | ColorFormat::Grgb1555 => 2,
            ColorFormat::Rgb888 | ColorFormat::Bgr888 => 3,
        }
    }

    /// Whether the encoding fits the 16-bit palette table.
    pub fn is_16bit(self) -> bool {
        self.bytes_per_color() == 2
    }

    /// The 16-bit encoding used when this format has to fit a palette table.
    pub fn to_16bit(self) -> ColorFormat {
        match self {
            ColorFormat::Rgb888 => ColorFormat::Rgb565,
            ColorFormat::Bgr888 => ColorFormat::Bgr565,
            other => other,
        }
    }
}

impl fmt::Display for ColorFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColorFormat::Rgb565 => "rgb565",
            ColorFormat::Bgr565 => "bgr565",
            ColorFormat::Grgb1555 => "grgb1555",
            ColorFormat::Rgb888 => "rgb888",
            ColorFormat::Bgr888 => "bgr888",
        };
        f.write_str(name)
    }
}

/// Scale an 8-bit channel down to `max` (31 or 63) with rounding.
fn reduce(channel: u8, max: u32) -> u16 {
    ((channel as u32 * max * 2 + 255) / 510) as u16
}

/// Scale a 5- or 6-bit channel back up to 8 bits with rounding.
fn expand(value: u16, max: u32) -> u8 {
    ((value as u32 * 255 * 2 + max) / (max * 2)) as u8
}

pub fn to_565_rgb(color: Color) -> u16 {
    let r5 = reduce(color.r, 31);
    let g6 = reduce(color.g, 63);
    let b5 = reduce(color.b, 31);
    (r5 << 11) | (g6 << 5) | b5
}

pub fn to_565_bgr(color: Color) -> u16 {
    let r5 = reduce(color.r, 31);
    let g6 = reduce(color.g, 63);
    let b5 = reduce(color.b, 31);
    (b5 << 11) | (g6 << 5) | r5
}

pub fn to_1555_grgb(color: Color) -> u16 {
    let r5 = reduce(color.r, 31);
    let g6 = reduce(color.g, 63);
    let b5 = reduce(color.b, 31);
    ((g6 & 1) << 15) | (r5 << 10) | ((g6 >> 1) << 5) | b5
}

pub fn from_565_rgb(value: u16) -> Color {
    Color {
        r: expand((value >> 11) & 31, 31),
        g: expand((value >> 5) & 63, 63),
        b: expand(value & 31, 31),
    }
}

pub fn from_565_bgr(value: u16) -> Color {
    Color {
        r: expand(value & 31, 31),
        g: expand((value >> 5) & 63, 63),
        b: expand((value >> 11) & 31, 31),
    }
}

pub fn from_1555_grgb(value: u16) -> Color {
    let g6 = ((value >> 4) & 62) | (value >> 15);
    Color {
        r: expand((value >> 10) & 31, 31),
        g: expand(g6, 63),
        b: expand(value & 31, 31),
    }
}

/// Encode a color into its 16-bit on-device value.
///
/// The 888 formats have no 16-bit form and use [`ColorFormat::to_16bit`].
pub fn to_target(color: Color, format: ColorFormat) -> u16 {
    match format.to_16bit() {
        ColorFormat::Rgb565 | ColorFormat::Rgb888 => to_565_rgb(color),
        ColorFormat::Bgr565 | ColorFormat::Bgr888 => to_565_bgr(color),
        ColorFormat::Grgb1555 => to_1555_grgb(color),
    }
}

/// Round-trip a color through a target encoding.
pub fn normalize(color: Color, format: ColorFormat) -> Color {
    match format {
        ColorFormat::Rgb565 => from_565_rgb(to_565_rgb(color)),
        ColorFormat::Bgr565 => from_565_bgr(to_565_bgr(color)),
        ColorFormat::Grgb1555 => from_1555_grgb(to_1555_grgb(color)),
        ColorFormat::Rgb888 | ColorFormat::Bgr888 => color,
    }
}

/// Append the on-device byte sequence for `color` to `out`.
pub fn encode_into(color: Color, format: ColorFormat, out: &mut Vec<u8>) {
    match format {
        ColorFormat::Rgb888 => out.extend_from_slice(&[color.r, color.g, color.b]),
        ColorFormat::Bgr888 => out.extend_from_slice(&[color.b, color.g, color.r]),
        _ => out.extend_from_slice(&to_target(color, format).to_le_bytes()),
    }
}

/// Parse a `#RGB` or `#RRGGBB` color string.
///
/// # Examples
///
/// ```
/// use convimg::color::{parse_hex, Color};
///
/// assert_eq!(parse_hex("#F00").unwrap(), Color::new(255, 0, 0));
/// assert_eq!(parse_hex("#FF00FF").unwrap(), Color::new(255, 0, 255));
/// ```
pub fn parse_hex(s: &str) -> Result<Color, ColorError> {
    if s.is_empty() {
        return Err(ColorError::Empty);
    }
    let hex = s.strip_prefix('#').ok_or(ColorError::MissingHash)?;

    if let Some(c) = hex.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(ColorError::InvalidHex(c));
    }

    let invalid = |_: ParseIntError| ColorError::InvalidLength(hex.len());
    let digit = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map_err(invalid);
    let pair = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(invalid);

    match hex.len() {
        3 => Ok(Color::new(digit(0)? * 17, digit(1)? * 17, digit(2)? * 17)),
        6 => Ok(Color::new(pair(0)?, pair(2)?, pair(4)?)),
        len => Err(ColorError::InvalidLength(len)),
    }
}
