//! Hex-literal text (`0x12, 0x34, ...`)
//!
//! Lines such as C array initialisers. Every `0xH` or `0xHH` token (either
//! case of `x`) yields one byte; everything between tokens is ignored.

use super::hex::hex_digit;

/// Whether the line holds at least one `0x` prefix
#[must_use]
pub fn contains_literal(line: &[u8]) -> bool {
    line.windows(2).any(is_prefix)
}

/// Byte values of every literal token in `line`
#[must_use]
pub fn literals(line: &[u8]) -> Literals<'_> {
    Literals { line, pos: 0 }
}

/// Where to split an over-long line without cutting a token in half: just
/// past the last separator, or else just before the last `0x` prefix
#[must_use]
pub fn split_point(line: &[u8]) -> Option<usize> {
    line.iter()
        .rposition(|&c| c == b',' || c.is_ascii_whitespace())
        .map(|i| i + 1)
        .or_else(|| line.windows(2).rposition(is_prefix))
        .filter(|&at| at > 0)
}

fn is_prefix(pair: &[u8]) -> bool {
    pair[0] == b'0' && (pair[1] == b'x' || pair[1] == b'X')
}

/// Iterator over literal token values
pub struct Literals<'a> {
    line: &'a [u8],
    pos: usize,
}

impl Iterator for Literals<'_> {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        while self.pos + 2 <= self.line.len() {
            if !is_prefix(&self.line[self.pos..self.pos + 2]) {
                self.pos += 1;
                continue;
            }
            self.pos += 2;

            let Some(hi) = self.line.get(self.pos).copied().and_then(hex_digit) else {
                continue;
            };
            self.pos += 1;
            match self.line.get(self.pos).copied().and_then(hex_digit) {
                Some(lo) => {
                    self.pos += 1;
                    return Some(hi << 4 | lo);
                }
                None => return Some(hi),
            }
        }
        None
    }
}
