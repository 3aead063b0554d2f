//! ZX7 encoder.
//!
//! Stream layout: the first byte is a literal, then each token starts with a
//! flag bit. `0` is followed by a literal byte. `1` is followed by the
//! Elias-gamma coded `length - 1` and the offset: `offset - 1` below 128 is a
//! single byte, larger offsets set bit 7 of that byte and add four more bits.
//! The end marker is a match whose gamma prefix has 16 zero bits.

use super::matcher::{BitWriter, MatchFinder};
use super::CompressError;

/// Largest offset one match can reach.
pub const MAX_OFFSET: usize = 2176;
/// Longest match length (gamma coded as `length - 1 < 65536`).
pub const MAX_LEN: usize = 65536;

fn write_elias_gamma(w: &mut BitWriter, value: usize) {
    let mut i = 2;
    while i <= value {
        w.bit(false);
        i <<= 1;
    }
    i >>= 1;
    while i > 0 {
        w.bit(value & i != 0);
        i >>= 1;
    }
}

fn write_offset(w: &mut BitWriter, offset: usize) {
    let value = offset - 1;
    if value < 128 {
        w.byte(value as u8);
    } else {
        let value = value - 128;
        w.byte(((value & 127) | 128) as u8);
        for mask in [1024, 512, 256, 128] {
            w.bit(value & mask != 0);
        }
    }
}

pub fn compress(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    let Some(&first) = data.first() else {
        return Err(CompressError::Empty);
    };

    let mut w = BitWriter::default();
    let mut finder = MatchFinder::new(data, MAX_OFFSET, MAX_LEN);
    w.byte(first);
    finder.insert(0);

    let mut pos = 1;
    while pos < data.len() {
        match finder.longest(pos) {
            Some((offset, len)) => {
                w.bit(true);
                write_elias_gamma(&mut w, len - 1);
                write_offset(&mut w, offset);
                for p in pos..pos + len {
                    finder.insert(p);
                }
                pos += len;
            }
            None => {
                w.bit(false);
                w.byte(data[pos]);
                finder.insert(pos);
                pos += 1;
            }
        }
    }

    w.bit(true);
    for _ in 0..16 {
        w.bit(false);
    }
    w.bit(true);

    Ok(w.into_inner())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    struct Reader<'a> {
        src: &'a [u8],
        pos: usize,
        mask: u8,
        bits: u8,
    }

    impl Reader<'_> {
        fn byte(&mut self) -> u8 {
            let b = self.src[self.pos];
            self.pos += 1;
            b
        }

        fn bit(&mut self) -> bool {
            if self.mask == 0 {
                self.mask = 0x80;
                self.bits = self.byte();
            }
            let b = self.bits & self.mask != 0;
            self.mask >>= 1;
            b
        }
    }

    /// Reference decoder.
    pub(crate) fn decompress(src: &[u8]) -> Vec<u8> {
        let mut r = Reader { src, pos: 0, mask: 0, bits: 0 };
        let mut out = vec![r.byte()];
        loop {
            if !r.bit() {
                out.push(r.byte());
                continue;
            }
            let mut zeros = 0;
            while !r.bit() {
                zeros += 1;
                if zeros == 16 {
                    return out;
                }
            }
            let mut value = 1usize;
            for _ in 0..zeros {
                value = value << 1 | r.bit() as usize;
            }
            let len = value + 1;

            let b = r.byte() as usize;
            let mut offset = b & 127;
            if b & 128 != 0 {
                let mut high = 0;
                for _ in 0..4 {
                    high = high << 1 | r.bit() as usize;
                }
                offset = (high << 7 | offset) + 128;
            }
            offset += 1;

            let start = out.len() - offset;
            for i in 0..len {
                out.push(out[start + i]);
            }
        }
    }

    #[test]
    fn test_empty_input_rejected() {
        assert_eq!(compress(&[]), Err(CompressError::Empty));
    }

    #[test]
    fn test_single_byte() {
        let packed = compress(&[42]).unwrap();
        assert_eq!(decompress(&packed), vec![42]);
    }

    #[test]
    fn test_runs_shrink() {
        let data = vec![0u8; 4096];
        let packed = compress(&data).unwrap();
        assert!(packed.len() < 32);
        assert_eq!(decompress(&packed), data);
    }

    #[test]
    fn test_long_offsets() {
        // Repeats beyond the one-byte offset range
        let mut data: Vec<u8> = (0..1500u32).map(|i| (i * 7 % 251) as u8).collect();
        let head = data[..600].to_vec();
        data.extend_from_slice(&head);
        let packed = compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(decompress(&packed), data);
    }

    #[test]
    fn test_mixed_content() {
        let data: Vec<u8> = b"the quick brown fox jumps over the lazy dog; the lazy dog sleeps"
            .iter()
            .copied()
            .cycle()
            .take(3000)
            .chain((0..=255u8).rev())
            .collect();
        assert_eq!(decompress(&compress(&data).unwrap()), data);
    }
}
