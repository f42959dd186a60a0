//! Codepoint and byte offset conversion.
//!
//! Positions in operations count Unicode scalar values, so an emoji or a CJK
//! character is one unit. Rust strings are addressed in bytes. Every splice
//! the engine performs goes through these functions, and an off-by-one here
//! would shift every later position, so they are exact or they fail.

use crate::{error::Result, Error};

/// Length of a UTF-8 sequence, decided by its leading byte.
#[inline]
fn sequence_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

/// True for bytes that continue a multi-byte sequence (`10xxxxxx`).
#[inline]
fn is_continuation(byte: u8) -> bool {
    byte & 0xC0 == 0x80
}

/// Number of codepoints in `s`.
pub fn codepoint_len(s: &str) -> usize {
    s.bytes().filter(|&b| !is_continuation(b)).count()
}

/// Convert a codepoint offset into a byte offset within `s`.
///
/// `offset == codepoint_len(s)` maps to `s.len()`.
pub fn codepoint_to_byte(s: &str, offset: usize) -> Result<usize> {
    let bytes = s.as_bytes();
    let mut byte = 0;
    let mut seen = 0;

    while seen < offset {
        if byte >= bytes.len() {
            return Err(Error::OffsetOutOfRange {
                offset,
                len: seen,
            });
        }
        byte += sequence_len(bytes[byte]);
        seen += 1;
    }

    Ok(byte)
}

/// Convert a byte offset within `s` into a codepoint offset.
pub fn byte_to_codepoint(s: &str, offset: usize) -> Result<usize> {
    if offset > s.len() {
        return Err(Error::OffsetOutOfRange {
            offset,
            len: s.len(),
        });
    }
    if !s.is_char_boundary(offset) {
        return Err(Error::NotCharBoundary(offset));
    }

    Ok(codepoint_len(&s[..offset]))
}

/// Split `s` before codepoint `offset`, clamping to the end of the string.
pub fn split_at_codepoint(s: &str, offset: usize) -> (&str, &str) {
    let at = s.char_indices().nth(offset).map_or(s.len(), |(i, _)| i);
    s.split_at(at)
}

/// Borrow the codepoint range `start..end` of `s`.
pub fn slice_codepoints(s: &str, start: usize, end: usize) -> Result<&str> {
    if start > end {
        return Err(Error::MalformedOperation(format!(
            "inverted codepoint range {start}..{end}"
        )));
    }
    let from = codepoint_to_byte(s, start)?;
    let to = from + codepoint_to_byte(&s[from..], end - start)?;
    Ok(&s[from..to])
}
