//! Windows-1252 codec for the host system's legacy text.
//!
//! Older rows in the host database were written as Windows-1252 and the
//! legacy output formats are still served in that charset. Undefined bytes
//! (0x81, 0x8D, 0x8F, 0x90, 0x9D) map to the C1 control with the same value.

use std::borrow::Cow;

/// Code points for bytes 0x80..=0x9F.
const HIGH: [char; 32] = [
    '\u{20AC}', '\u{0081}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{008D}', '\u{017D}', '\u{008F}',
    '\u{0090}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{009D}', '\u{017E}', '\u{0178}',
];

/// Replacement byte for characters Windows-1252 cannot represent.
pub const UNMAPPABLE: u8 = b'?';

/// Decode stored text: valid UTF-8 is taken as is, anything else is read
/// byte-wise as Windows-1252.
pub fn decode(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(bytes.iter().map(|&b| decode_byte(b)).collect()),
    }
}

pub fn decode_byte(b: u8) -> char {
    match b {
        0x80..=0x9F => HIGH[usize::from(b - 0x80)],
        _ => char::from(b),
    }
}

pub fn encode_char(c: char) -> u8 {
    let cp = u32::from(c);
    if cp < 0x80 || (0xA0..=0xFF).contains(&cp) {
        return cp as u8;
    }
    match HIGH.iter().position(|&h| h == c) {
        Some(idx) => 0x80 + idx as u8,
        None => UNMAPPABLE,
    }
}

/// Encode to Windows-1252. Every char becomes exactly one byte.
pub fn encode(s: &str) -> Vec<u8> {
    s.chars().map(encode_char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_passes_through_borrowed() {
        let text = "Grüße €";
        assert!(matches!(decode(text.as_bytes()), Cow::Borrowed(t) if t == text));
    }

    #[test]
    fn legacy_bytes_are_decoded() {
        // "Grüße €" in Windows-1252
        let legacy = [b'G', b'r', 0xFC, 0xDF, b'e', b' ', 0x80];
        assert_eq!(decode(&legacy), "Grüße €");
    }

    #[test]
    fn encode_maps_one_byte_per_char() {
        let encoded = encode("Grüße €…");
        assert_eq!(encoded, vec![b'G', b'r', 0xFC, 0xDF, b'e', b' ', 0x80, 0x85]);
        assert_eq!(encode("日本"), vec![UNMAPPABLE, UNMAPPABLE]);
    }

    #[test]
    fn every_byte_roundtrips() {
        for b in 0..=255u8 {
            assert_eq!(encode_char(decode_byte(b)), b);
        }
    }
}
