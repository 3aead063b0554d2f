//! Offset arithmetic for AppVar contents.
//!
//! An AppVar holds an optional header string, an optional lookup table and
//! then one segment per palette, image and tileset. The LUT base is the first
//! byte after the header string. LUT entries are little-endian integers of
//! `entry_size` bytes: entry 0 is the number of segments, entry `i` the
//! offset of segment `i - 1` from the LUT base. After the top-level entries
//! follows one page per tileset holding each tile's offset from the start of
//! that tileset's data.

use super::AppVarError;

/// Size of one segment as laid out in the AppVar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentSize {
    pub size: usize,
    /// Tile sizes for a tileset segment
    pub tiles: Option<Vec<usize>>,
}

impl SegmentSize {
    pub fn plain(size: usize) -> Self {
        Self { size, tiles: None }
    }

    pub fn tileset(tiles: Vec<usize>) -> Self {
        Self { size: tiles.iter().sum(), tiles: Some(tiles) }
    }
}

/// Where every segment lands inside the AppVar data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub header_len: usize,
    /// LUT entry width, `None` without a lookup table
    pub entry_size: Option<usize>,
    /// Segment offsets from the start of the AppVar data
    pub offsets: Vec<usize>,
    /// Per tileset segment: tile offsets from the tileset start
    pub tile_offsets: Vec<Vec<usize>>,
    /// Per tileset segment: offset of its LUT page from the LUT base
    pub tile_pages: Vec<usize>,
    pub lut_len: usize,
    /// Total length of header, LUT and segments
    pub len: usize,
}

impl Layout {
    pub fn new(header_len: usize, entry_size: Option<usize>, segments: &[SegmentSize]) -> Self {
        let tile_offsets: Vec<Vec<usize>> = segments
            .iter()
            .filter_map(|s| s.tiles.as_ref())
            .map(|tiles| {
                tiles
                    .iter()
                    .scan(0, |offset, size| {
                        let current = *offset;
                        *offset += size;
                        Some(current)
                    })
                    .collect()
            })
            .collect();

        let (lut_len, tile_pages) = match entry_size {
            Some(entry_size) => {
                let top = (segments.len() + 1) * entry_size;
                let mut pages = Vec::with_capacity(tile_offsets.len());
                let mut page = top;
                for tiles in &tile_offsets {
                    pages.push(page);
                    page += tiles.len() * entry_size;
                }
                (page, pages)
            }
            None => (0, Vec::new()),
        };

        let mut offsets = Vec::with_capacity(segments.len());
        let mut offset = header_len + lut_len;
        for segment in segments {
            offsets.push(offset);
            offset += segment.size;
        }

        Self { header_len, entry_size, offsets, tile_offsets, tile_pages, lut_len, len: offset }
    }

    /// LUT entry count including the count entry itself.
    pub fn total_entries(&self) -> usize {
        self.offsets.len() + 1
    }

    /// Offset of segment `i` from the LUT base.
    pub fn lut_offset(&self, i: usize) -> usize {
        self.offsets[i] - self.header_len
    }

    /// Serialize the lookup table.
    pub fn lut_bytes(&self) -> Result<Vec<u8>, AppVarError> {
        let Some(entry_size) = self.entry_size else {
            return Ok(Vec::new());
        };
        let max = (1usize << (8 * entry_size)) - 1;
        let mut out = Vec::with_capacity(self.lut_len);
        let mut put = |value: usize| -> Result<(), AppVarError> {
            if value > max {
                return Err(AppVarError::LutEntryOverflow { value, entry_size });
            }
            out.extend_from_slice(&value.to_le_bytes()[..entry_size]);
            Ok(())
        };

        put(self.total_entries() - 1)?;
        for i in 0..self.offsets.len() {
            put(self.lut_offset(i))?;
        }
        for tiles in &self.tile_offsets {
            for &offset in tiles {
                put(offset)?;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(bytes: &[u8], at: usize, size: usize) -> usize {
        bytes[at..at + size].iter().rev().fold(0, |acc, &b| acc << 8 | b as usize)
    }

    #[test]
    fn test_palette_and_image() {
        let layout = Layout::new(0, Some(3), &[SegmentSize::plain(8), SegmentSize::plain(258)]);
        assert_eq!(layout.total_entries(), 3);
        assert_eq!(layout.lut_len, 9);
        assert_eq!(layout.offsets, vec![9, 17]);
        assert_eq!(layout.len, 9 + 8 + 258);

        let lut = layout.lut_bytes().unwrap();
        assert_eq!(lut, vec![2, 0, 0, 9, 0, 0, 17, 0, 0]);
    }

    #[test]
    fn test_header_string_shifts_base() {
        let layout = Layout::new(4, Some(2), &[SegmentSize::plain(10)]);
        assert_eq!(layout.offsets, vec![8]);
        assert_eq!(layout.lut_offset(0), 4);
        assert_eq!(layout.lut_bytes().unwrap(), vec![1, 0, 4, 0]);
    }

    #[test]
    fn test_tile_pages_follow_top_level() {
        let segments = [
            SegmentSize::plain(4),
            SegmentSize::tileset(vec![6, 6, 5]),
            SegmentSize::tileset(vec![2, 2]),
        ];
        let layout = Layout::new(0, Some(2), &segments);

        // 4 top-level entries, then pages of 3 and 2 tiles
        assert_eq!(layout.tile_pages, vec![8, 14]);
        assert_eq!(layout.lut_len, 18);
        assert_eq!(layout.tile_offsets, vec![vec![0, 6, 12], vec![0, 2]]);

        let lut = layout.lut_bytes().unwrap();
        assert_eq!(lut.len(), 18);
        assert_eq!(read(&lut, 0, 2), 3);
        for i in 0..3 {
            assert_eq!(read(&lut, 2 + i * 2, 2), layout.offsets[i]);
        }
        assert_eq!(read(&lut, 8 + 2 * 2, 2), 12);
        assert_eq!(read(&lut, 14 + 2, 2), 2);
    }

    #[test]
    fn test_without_lut() {
        let segments = [SegmentSize::plain(5), SegmentSize::tileset(vec![1, 1])];
        let layout = Layout::new(2, None, &segments);
        assert_eq!(layout.lut_len, 0);
        assert_eq!(layout.offsets, vec![2, 7]);
        assert!(layout.lut_bytes().unwrap().is_empty());
    }

    #[test]
    fn test_entry_overflow() {
        let layout = Layout::new(0, Some(2), &[SegmentSize::plain(70000), SegmentSize::plain(1)]);
        assert!(matches!(
            layout.lut_bytes(),
            Err(AppVarError::LutEntryOverflow { entry_size: 2, .. })
        ));
    }
}
