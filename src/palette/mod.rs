//! Palette engine.
//!
//! Builds the fixed 256-slot color table that images are converted
//! against. A palette is either one of the built-in tables or the result of
//! quantizing an image corpus, with caller-pinned ("fixed") colors re-homed
//! to their requested indices afterwards.
//!
//! Generation is deterministic: after quantization every free entry is
//! sorted by color, so two runs over the same corpus produce identical
//! bytes even when the quantizer visits colors in a different order.

pub mod builtin;

use crate::bitmap::{self, BitmapError};
use crate::color::{to_target, Color, ColorFormat};
use crate::quantize::{Histogram, QuantizeError, Quantizer, MAX_PALETTE_PIXELS};
use image::RgbaImage;
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// Number of slots in a palette table.
pub const MAX_PALETTE_ENTRIES: usize = 256;

/// Errors raised while generating a palette.
#[derive(Debug, Error)]
pub enum PaletteError {
    /// Image could not be loaded
    #[error(transparent)]
    Bitmap(#[from] BitmapError),
    /// Quantizer failure
    #[error(transparent)]
    Quantize(#[from] QuantizeError),
    /// Exact entries leave no room for quantized colors
    #[error("{exact} exact entries exceed max-entries {max}")]
    TooManyExactEntries { exact: usize, max: usize },
    /// A pinned index is outside the palette
    #[error("fixed entry index {index} is not below max-entries {max}")]
    FixedIndexOutOfRange { index: u8, max: usize },
    /// Two pinned entries share an index
    #[error("fixed entry index {0} is used more than once")]
    DuplicateFixedIndex(u8),
    /// A displaced color has nowhere to go
    #[error("no free palette slot to relocate the color at index {0}")]
    NoFreeSlot(u8),
}

/// One slot of the palette table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaletteEntry {
    /// Color at the precision of the palette format
    pub color: Color,
    /// Color as produced by the quantizer or the caller
    pub original_color: Color,
    pub index: u8,
    /// Unused slots are still emitted (as zero) to keep indices stable
    pub valid: bool,
    pub fixed: bool,
    pub exact: bool,
    /// Encoded on-device value
    pub target: u16,
}

/// A caller-pinned palette color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedEntry {
    pub color: Color,
    pub index: u8,
    /// Matched by identity during conversion and never quantized
    pub exact: bool,
}

/// Where a palette gets its colors from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaletteSource {
    /// Compiled-in table
    Builtin,
    /// Every image of every convert that uses this palette
    Automatic,
    /// An explicit image list
    Images(Vec<PathBuf>),
}

/// A palette and its generated table.
#[derive(Debug, Clone)]
pub struct Palette {
    pub name: String,
    pub entries: Vec<PaletteEntry>,
    pub fixed_entries: Vec<FixedEntry>,
    pub source: PaletteSource,
    /// Resolved corpus
    pub images: Vec<PathBuf>,
    pub max_entries: usize,
    pub quantize_speed: u8,
    pub format: ColorFormat,
    pub nr_entries: usize,
    /// Ceiling on the number of corpus pixels sampled
    pub max_pixels: u64,
}

impl Palette {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let source = if builtin::is_builtin(&name) {
            PaletteSource::Builtin
        } else {
            PaletteSource::Automatic
        };
        Self {
            name,
            entries: vec![PaletteEntry::default(); MAX_PALETTE_ENTRIES],
            fixed_entries: Vec::new(),
            source,
            images: Vec::new(),
            max_entries: MAX_PALETTE_ENTRIES,
            quantize_speed: 4,
            format: ColorFormat::default(),
            nr_entries: 0,
            max_pixels: MAX_PALETTE_PIXELS,
        }
    }

    /// Set the corpus source. Built-in names always keep their table.
    pub fn with_source(mut self, source: PaletteSource) -> Self {
        if builtin::is_builtin(&self.name) {
            return self;
        }
        if let PaletteSource::Images(paths) = &source {
            self.images = paths.clone();
        }
        self.source = source;
        self
    }

    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries.clamp(1, MAX_PALETTE_ENTRIES);
        self
    }

    pub fn with_fixed_entry(mut self, entry: FixedEntry) -> Self {
        self.fixed_entries.push(entry);
        self
    }

    /// Table entries are 16-bit, so 888 formats are stored as their 565 form.
    pub fn with_format(mut self, format: ColorFormat) -> Self {
        self.format = format.to_16bit();
        self
    }

    pub fn with_quantize_speed(mut self, speed: u8) -> Self {
        self.quantize_speed = speed.clamp(1, 10);
        self
    }

    pub fn is_automatic(&self) -> bool {
        self.source == PaletteSource::Automatic
    }

    /// Use `paths` as the corpus of an automatic palette.
    pub fn set_automatic_images<'a>(&mut self, paths: impl IntoIterator<Item = &'a PathBuf>) {
        let unique: BTreeSet<&PathBuf> = paths.into_iter().collect();
        self.images = unique.into_iter().cloned().collect();
    }

    /// Generate the palette table, loading the corpus from disk.
    pub fn generate(&mut self, quantizer: &dyn Quantizer) -> Result<(), PaletteError> {
        if self.source == PaletteSource::Builtin {
            self.load_builtin();
            return Ok(());
        }

        let mut corpus = Vec::with_capacity(self.images.len());
        for path in &self.images {
            corpus.push(bitmap::load(path)?);
        }
        self.generate_from_images(&corpus, quantizer)
    }

    /// Generate the palette table from already decoded images.
    pub fn generate_from_images(
        &mut self,
        corpus: &[RgbaImage],
        quantizer: &dyn Quantizer,
    ) -> Result<(), PaletteError> {
        if self.source == PaletteSource::Builtin {
            self.load_builtin();
            return Ok(());
        }

        let exact_count = self.fixed_entries.iter().filter(|f| f.exact).count();
        if exact_count > self.max_entries {
            return Err(PaletteError::TooManyExactEntries {
                exact: exact_count,
                max: self.max_entries,
            });
        }
        let max_quantizable = self.max_entries - exact_count;

        self.check_fixed_entries()?;

        let pinned: Vec<Color> =
            self.fixed_entries.iter().filter(|f| !f.exact).map(|f| f.color).collect();

        let mut histogram = Histogram::with_limit(self.max_pixels);
        for image in corpus {
            histogram.add_rgba(image.as_raw())?;
        }

        let colors = quantizer.quantize(&histogram, &pinned, max_quantizable, self.quantize_speed)?;

        self.entries = vec![PaletteEntry::default(); MAX_PALETTE_ENTRIES];
        for (i, color) in colors.iter().enumerate() {
            self.entries[i] = PaletteEntry {
                color: color.normalize(self.format),
                original_color: *color,
                index: i as u8,
                valid: true,
                fixed: false,
                exact: false,
                target: 0,
            };
        }

        let fixed = self.fixed_entries.clone();
        let reserved: BTreeSet<u8> = fixed.iter().map(|f| f.index).collect();

        for entry in fixed.iter().filter(|f| !f.exact) {
            self.rehome_fixed(entry, &reserved)?;
        }
        for entry in fixed.iter().filter(|f| f.exact) {
            self.place_pinned(entry, &reserved)?;
        }

        self.nr_entries = self.entries.iter().rposition(|e| e.valid).map_or(0, |i| i + 1);

        self.sort();
        self.encode_targets();

        log::debug!(
            "palette '{}': {} entries from {} pixels ({} colors)",
            self.name,
            self.nr_entries,
            histogram.pixels(),
            histogram.len()
        );
        Ok(())
    }

    fn check_fixed_entries(&self) -> Result<(), PaletteError> {
        let mut seen = BTreeSet::new();
        for entry in &self.fixed_entries {
            if entry.index as usize >= self.max_entries {
                return Err(PaletteError::FixedIndexOutOfRange {
                    index: entry.index,
                    max: self.max_entries,
                });
            }
            if !seen.insert(entry.index) {
                return Err(PaletteError::DuplicateFixedIndex(entry.index));
            }
        }
        Ok(())
    }

    /// Move a quantized fixed color to its pinned index.
    fn rehome_fixed(
        &mut self,
        fixed: &FixedEntry,
        reserved: &BTreeSet<u8>,
    ) -> Result<(), PaletteError> {
        let found = self
            .entries
            .iter()
            .position(|e| e.valid && !e.fixed && e.original_color == fixed.color);

        match found {
            Some(position) => {
                self.entries.swap(position, fixed.index as usize);
                let slot = &mut self.entries[fixed.index as usize];
                slot.fixed = true;
                Ok(())
            }
            // Same color pinned twice: the quantizer only kept one copy
            None => self.place_pinned(fixed, reserved),
        }
    }

    /// Write a pinned color directly into its index, relocating the occupant.
    fn place_pinned(
        &mut self,
        fixed: &FixedEntry,
        reserved: &BTreeSet<u8>,
    ) -> Result<(), PaletteError> {
        let index = fixed.index as usize;
        let occupant = self.entries[index];

        if occupant.valid {
            let free = (0..self.max_entries)
                .find(|&j| j != index && !self.entries[j].valid && !reserved.contains(&(j as u8)))
                .ok_or(PaletteError::NoFreeSlot(fixed.index))?;
            self.entries[free] = occupant;
        }

        self.entries[index] = PaletteEntry {
            color: fixed.color.normalize(self.format),
            original_color: fixed.color,
            index: fixed.index,
            valid: true,
            fixed: true,
            exact: fixed.exact,
            target: 0,
        };
        Ok(())
    }

    /// Sort the non-fixed entries by color.
    ///
    /// Adjacent out-of-order pairs are swapped and the scan restarts after
    /// every swap; fixed entries never move and equal colors keep their
    /// relative order.
    fn sort(&mut self) {
        let movable: Vec<usize> = (0..self.nr_entries)
            .filter(|&i| self.entries[i].valid && !self.entries[i].fixed)
            .collect();

        'iterate: loop {
            for pair in movable.windows(2) {
                let (a, b) = (pair[0], pair[1]);
                if self.entries[a].color.key() > self.entries[b].color.key() {
                    self.entries.swap(a, b);
                    continue 'iterate;
                }
            }
            break;
        }
    }

    fn encode_targets(&mut self) {
        let format = self.format;
        for (i, entry) in self.entries.iter_mut().enumerate() {
            entry.index = i as u8;
            if entry.valid {
                entry.target = to_target(entry.color, format);
            }
        }
    }

    fn load_builtin(&mut self) {
        let Some(table) = builtin::get_builtin(&self.name) else {
            return;
        };
        let xlibc = self.name == "xlibc" && self.format == ColorFormat::Grgb1555;
        for (i, [r, g, b]) in table.iter().enumerate() {
            let color = Color::new(*r, *g, *b);
            self.entries[i] = PaletteEntry {
                color,
                original_color: color,
                index: i as u8,
                valid: true,
                fixed: false,
                exact: false,
                target: if xlibc { (i as u16) * 257 } else { to_target(color, self.format) },
            };
        }
        self.max_entries = MAX_PALETTE_ENTRIES;
        self.nr_entries = MAX_PALETTE_ENTRIES;
    }

    /// The palette as stored on the device: little-endian 16-bit colors.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.nr_entries * 2);
        for entry in &self.entries[..self.nr_entries] {
            let value = if entry.valid { entry.target } else { 0 };
            out.extend_from_slice(&value.to_le_bytes());
        }
        out
    }

    /// Size of [`Palette::to_bytes`].
    pub fn byte_size(&self) -> usize {
        self.nr_entries * 2
    }

    /// Valid entries as `(index, color)` pairs for remapping.
    pub fn remap_colors(&self) -> Vec<(u8, Color)> {
        self.entries[..self.nr_entries]
            .iter()
            .filter(|e| e.valid)
            .map(|e| (e.index, e.color))
            .collect()
    }

    /// Exact entries as `(index, caller color)` pairs.
    pub fn exact_entries(&self) -> Vec<(u8, Color)> {
        self.entries
            .iter()
            .filter(|e| e.valid && e.exact)
            .map(|e| (e.index, e.original_color))
            .collect()
    }
}
