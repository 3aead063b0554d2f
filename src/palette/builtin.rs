//! Built-in palette definitions.
//!
//! The graphics library ships two 256-color palettes that programs may use
//! without converting one. Referencing either name skips quantization.

use crate::color::{from_1555_grgb, Color};

/// List of all available built-in palette names.
const BUILTIN_NAMES: &[&str] = &["xlibc", "rgb332"];

/// The xLIBC palette: index `i` holds the 1555 color `i | i << 8`, so an
/// 8-bit index expands to 16 bits by duplicating the byte.
pub static XLIBC: [[u8; 3]; 256] = build_xlibc();

/// The RGB332 palette: index bits are `rrrgggbb`.
pub static RGB332: [[u8; 3]; 256] = build_rgb332();

const fn scale(value: u32, max: u32) -> u8 {
    ((value * 255 * 2 + max) / (max * 2)) as u8
}

const fn build_xlibc() -> [[u8; 3]; 256] {
    let mut table = [[0u8; 3]; 256];
    let mut i = 0;
    while i < 256 {
        let value = (i as u32) | ((i as u32) << 8);
        let g6 = ((value >> 4) & 62) | (value >> 15);
        table[i] = [scale((value >> 10) & 31, 31), scale(g6, 63), scale(value & 31, 31)];
        i += 1;
    }
    table
}

const fn build_rgb332() -> [[u8; 3]; 256] {
    let mut table = [[0u8; 3]; 256];
    let mut i = 0;
    while i < 256 {
        let v = i as u32;
        table[i] = [scale((v >> 5) & 7, 7), scale((v >> 2) & 7, 7), scale(v & 3, 3)];
        i += 1;
    }
    table
}

/// Returns a list of all available built-in palette names.
pub fn list_builtins() -> Vec<&'static str> {
    BUILTIN_NAMES.to_vec()
}

/// Whether `name` refers to a built-in palette.
pub fn is_builtin(name: &str) -> bool {
    BUILTIN_NAMES.contains(&name)
}

/// Returns a built-in palette table by name, or None if not found.
pub fn get_builtin(name: &str) -> Option<&'static [[u8; 3]; 256]> {
    match name {
        "xlibc" => Some(&XLIBC),
        "rgb332" => Some(&RGB332),
        _ => None,
    }
}

/// Decode one xLIBC entry through the color codec.
pub fn xlibc_color(index: u8) -> Color {
    from_1555_grgb(index as u16 | ((index as u16) << 8))
}
