//! ZX0 encoder (forward stream, inverted offset MSB).
//!
//! Tokens alternate between literal runs and matches. A literal run is
//! followed either by a match repeating the previous offset (flag `0`) or by
//! a match with a new offset (flag `1`); after a match the next token is a
//! literal run (flag `0`) or another new-offset match (flag `1`). All counts
//! use interlaced Elias gamma. A new offset stores its high part as inverted
//! gamma and its low seven bits in one byte whose lowest bit carries the first
//! bit of the following length. An offset MSB of 256 ends the stream.

use super::matcher::{BitWriter, MatchFinder};
use super::CompressError;

/// Largest offset one match can reach.
pub const MAX_OFFSET: usize = 32640;
const MAX_LEN: usize = 65536;
const INITIAL_OFFSET: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literals { start: usize, len: usize },
    Repeat { len: usize },
    Match { offset: usize, len: usize },
}

fn write_interlaced_elias_gamma(w: &mut BitWriter, value: usize, inverted: bool) {
    let mut i = 2;
    while i <= value {
        i <<= 1;
    }
    i >>= 1;
    loop {
        i >>= 1;
        if i == 0 {
            break;
        }
        w.bit(false);
        w.bit(inverted ^ (value & i != 0));
    }
    w.bit(true);
}

/// Greedy parse into tokens.
fn parse(data: &[u8]) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut finder = MatchFinder::new(data, MAX_OFFSET, MAX_LEN);
    let mut last_offset = INITIAL_OFFSET;
    let mut pos = 0;

    while pos < data.len() {
        let after_literals = matches!(tokens.last(), Some(Token::Literals { .. }));
        let repeat = if after_literals { finder.match_len(pos, last_offset) } else { 0 };
        let best = finder.longest(pos);
        let best_len = best.map_or(0, |(_, len)| len);

        let token = if repeat > 0 && repeat >= best_len {
            Token::Repeat { len: repeat }
        } else if let Some((offset, len)) = best {
            last_offset = offset;
            Token::Match { offset, len }
        } else {
            Token::Literals { start: pos, len: 1 }
        };

        let consumed = match token {
            Token::Literals { .. } => 1,
            Token::Repeat { len } | Token::Match { len, .. } => len,
        };
        for p in pos..pos + consumed {
            finder.insert(p);
        }
        pos += consumed;

        match (tokens.last_mut(), token) {
            (Some(Token::Literals { len, .. }), Token::Literals { .. }) => *len += 1,
            (_, token) => tokens.push(token),
        }
    }
    tokens
}

pub fn compress(data: &[u8]) -> Result<Vec<u8>, CompressError> {
    if data.is_empty() {
        return Err(CompressError::Empty);
    }

    let mut w = BitWriter::default();
    for (i, token) in parse(data).into_iter().enumerate() {
        match token {
            Token::Literals { start, len } => {
                // The very first token is always literals and has no flag
                if i > 0 {
                    w.bit(false);
                }
                write_interlaced_elias_gamma(&mut w, len, false);
                for &b in &data[start..start + len] {
                    w.byte(b);
                }
            }
            Token::Repeat { len } => {
                w.bit(false);
                write_interlaced_elias_gamma(&mut w, len, false);
            }
            Token::Match { offset, len } => {
                w.bit(true);
                write_interlaced_elias_gamma(&mut w, (offset - 1) / 128 + 1, true);
                w.byte(((127 - (offset - 1) % 128) << 1) as u8);
                w.backtrack = true;
                write_interlaced_elias_gamma(&mut w, len - 1, false);
            }
        }
    }

    w.bit(true);
    write_interlaced_elias_gamma(&mut w, 256, true);

    Ok(w.into_inner())
}
