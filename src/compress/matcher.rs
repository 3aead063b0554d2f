//! Hash-chain longest match search shared by the LZ77-style encoders.

/// Chain steps tried per position before settling for the best so far.
const MAX_CHAIN: usize = 1024;

const NONE: usize = usize::MAX;

pub(crate) struct MatchFinder<'a> {
    data: &'a [u8],
    head: Vec<usize>,
    prev: Vec<usize>,
    max_offset: usize,
    max_len: usize,
}

impl<'a> MatchFinder<'a> {
    pub(crate) fn new(data: &'a [u8], max_offset: usize, max_len: usize) -> Self {
        Self { data, head: vec![NONE; 1 << 16], prev: vec![NONE; data.len()], max_offset, max_len }
    }

    fn key(&self, pos: usize) -> Option<usize> {
        if pos + 1 < self.data.len() {
            Some((self.data[pos] as usize) << 8 | self.data[pos + 1] as usize)
        } else {
            None
        }
    }

    /// Make `pos` available as a match source for later positions.
    pub(crate) fn insert(&mut self, pos: usize) {
        if let Some(key) = self.key(pos) {
            self.prev[pos] = self.head[key];
            self.head[key] = pos;
        }
    }

    /// Length of the match at `pos` copying from `offset` bytes back.
    pub(crate) fn match_len(&self, pos: usize, offset: usize) -> usize {
        if offset == 0 || offset > pos {
            return 0;
        }
        let mut len = 0;
        while pos + len < self.data.len()
            && len < self.max_len
            && self.data[pos + len] == self.data[pos + len - offset]
        {
            len += 1;
        }
        len
    }

    /// Longest match (at least 2 bytes) at `pos` as `(offset, len)`.
    ///
    /// Nearer sources win ties.
    pub(crate) fn longest(&self, pos: usize) -> Option<(usize, usize)> {
        let key = self.key(pos)?;
        let mut candidate = self.head[key];
        let mut best: Option<(usize, usize)> = None;
        let mut steps = 0;

        while candidate != NONE && steps < MAX_CHAIN {
            let offset = pos - candidate;
            if offset > self.max_offset {
                break;
            }
            let len = self.match_len(pos, offset);
            if len >= 2 && best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((offset, len));
                if len == self.max_len {
                    break;
                }
            }
            candidate = self.prev[candidate];
            steps += 1;
        }
        best
    }
}

/// MSB-first bit writer that interleaves bit groups with whole bytes.
///
/// A fresh byte is reserved in the output the first time a bit is written
/// after the previous group filled up.
#[derive(Debug, Default)]
pub(crate) struct BitWriter {
    pub(crate) out: Vec<u8>,
    mask: u8,
    bit_index: usize,
    /// Next bit goes into the lowest bit of the last written byte
    pub(crate) backtrack: bool,
}

impl BitWriter {
    pub(crate) fn byte(&mut self, value: u8) {
        self.out.push(value);
    }

    pub(crate) fn bit(&mut self, value: bool) {
        if self.backtrack {
            if value {
                if let Some(last) = self.out.last_mut() {
                    *last |= 1;
                }
            }
            self.backtrack = false;
            return;
        }
        if self.mask == 0 {
            self.mask = 0x80;
            self.bit_index = self.out.len();
            self.out.push(0);
        }
        if value {
            self.out[self.bit_index] |= self.mask;
        }
        self.mask >>= 1;
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.out
    }
}
