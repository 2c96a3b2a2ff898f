//! STRING_POOL chunk decoding.
//!
//! A pool stores every string of a document in one block, either UTF-8
//! or UTF-16LE, each string prefixed by a variable-width length header.
//! Styled strings carry an extra list of spans referencing the pool.

use bitflags::bitflags;

use super::error::{DecodeResult, Error};
use super::{ChunkHeader, Reader};

/// Sentinel reference meaning "no string".
pub const NIL_REF: u32 = 0xFFFF_FFFF;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PoolFlags: u32 {
        const SORTED = 1 << 0;
        const UTF8 = 1 << 8;
    }
}

/// One styling span of a styled string: a tag name reference and the
/// character range it covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleSpan {
    pub name: u32,
    pub first_char: u32,
    pub last_char: u32,
}

/// An indexed, immutable sequence of decoded strings plus style spans.
#[derive(Debug, Clone)]
pub struct StringPool {
    strings: Vec<String>,
    styles: Vec<Vec<StyleSpan>>,
    flags: PoolFlags,
}

impl StringPool {
    pub(crate) fn empty() -> StringPool {
        StringPool {
            strings: Vec::new(),
            styles: Vec::new(),
            flags: PoolFlags::empty(),
        }
    }

    /// Decodes a pool from a reader windowed to exactly the chunk.
    pub(crate) fn read(r: &mut Reader<'_>, header: &ChunkHeader) -> DecodeResult<StringPool> {
        r.seek(8)?;
        let string_count = r.read_u32()? as usize;
        let style_count = r.read_u32()? as usize;
        let flags = PoolFlags::from_bits_truncate(r.read_u32()?);
        let strings_start = r.read_u32()? as usize;
        let styles_start = r.read_u32()? as usize;

        if string_count.saturating_add(style_count) > r.len() / 4 {
            return Err(Error::malformed(
                r.abs_position(),
                format!("string pool counts ({string_count} strings, {style_count} styles) exceed chunk size"),
            ));
        }

        // The two offset arrays follow the header directly.
        r.seek(header.header_size as usize)?;
        let mut string_offsets = Vec::with_capacity(string_count);
        for _ in 0..string_count {
            string_offsets.push(r.read_u32()? as usize);
        }
        let mut style_offsets = Vec::with_capacity(style_count);
        for _ in 0..style_count {
            style_offsets.push(r.read_u32()? as usize);
        }

        let is_utf8 = flags.contains(PoolFlags::UTF8);
        let mut strings = Vec::with_capacity(string_count);
        for offset in string_offsets {
            let at = strings_start.checked_add(offset).ok_or_else(|| {
                Error::malformed(r.abs_position(), "string offset overflow")
            })?;
            let text = if is_utf8 {
                decode_utf8(r, at)?
            } else {
                decode_utf16(r, at)?
            };
            strings.push(text);
        }

        let mut styles = Vec::with_capacity(style_count);
        for offset in style_offsets {
            let at = styles_start.checked_add(offset).ok_or_else(|| {
                Error::malformed(r.abs_position(), "style offset overflow")
            })?;
            styles.push(decode_spans(r, at)?);
        }

        Ok(StringPool {
            strings,
            styles,
            flags,
        })
    }

    /// Resolves a pool reference. [`NIL_REF`] yields the empty string;
    /// an out-of-range index yields `None`.
    pub fn get(&self, reference: u32) -> Option<&str> {
        if reference == NIL_REF {
            return Some("");
        }
        self.strings.get(reference as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    pub fn is_utf8(&self) -> bool {
        self.flags.contains(PoolFlags::UTF8)
    }

    pub fn styles(&self) -> &[Vec<StyleSpan>] {
        &self.styles
    }

    /// Index of the first string equal to `needle`, if any.
    pub fn position(&self, needle: &str) -> Option<u32> {
        self.strings.iter().position(|s| s == needle).map(|i| i as u32)
    }
}

fn decode_utf16(r: &mut Reader<'_>, offset: usize) -> DecodeResult<String> {
    r.seek(offset)?;
    let first = r.read_u16()?;
    let char_count = if first & 0x8000 != 0 {
        let second = r.read_u16()?;
        (((first & 0x7FFF) as usize) << 16) | second as usize
    } else {
        first as usize
    };
    let byte_len = char_count.checked_mul(2).ok_or_else(|| {
        Error::malformed(r.abs_position(), "UTF-16 length overflow")
    })?;
    let start = r.abs_position();
    let bytes = r.read_bytes(byte_len)?;
    let mut units = Vec::with_capacity(char_count);
    for pair in bytes.chunks_exact(2) {
        units.push(u16::from_le_bytes([pair[0], pair[1]]));
    }
    let terminator = r.read_u16()?;
    if terminator != 0 {
        return Err(Error::malformed(
            r.abs_position() - 2,
            "UTF-16 string missing null terminator",
        ));
    }
    String::from_utf16(&units).map_err(|_| Error::BadEncoding {
        offset: start,
        detail: "unpaired UTF-16 surrogate".to_string(),
    })
}

fn decode_utf8(r: &mut Reader<'_>, offset: usize) -> DecodeResult<String> {
    r.seek(offset)?;
    // Character count: parsed but the payload is sized by the byte count.
    let _char_count = read_utf8_length(r)?;
    let byte_len = read_utf8_length(r)?;
    let start = r.abs_position();
    let bytes = r.read_bytes(byte_len)?;
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| Error::BadEncoding {
            offset: start,
            detail: e.to_string(),
        })
}

fn read_utf8_length(r: &mut Reader<'_>) -> DecodeResult<usize> {
    let first = r.read_u8()?;
    if first & 0x80 == 0 {
        Ok(first as usize)
    } else {
        let second = r.read_u8()?;
        Ok((((first & 0x7F) as usize) << 8) | second as usize)
    }
}

fn decode_spans(r: &mut Reader<'_>, offset: usize) -> DecodeResult<Vec<StyleSpan>> {
    r.seek(offset)?;
    let mut spans = Vec::new();
    loop {
        let name = r.read_u32()?;
        if name == NIL_REF {
            return Ok(spans);
        }
        let first_char = r.read_u32()?;
        let last_char = r.read_u32()?;
        spans.push(StyleSpan {
            name,
            first_char,
            last_char,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::res::{next_chunk, Reader};
    use crate::tests::fixtures::{string_pool_chunk, utf8_pool_chunk};

    fn parse(buf: &[u8]) -> DecodeResult<StringPool> {
        let mut r = Reader::new(buf);
        let (header, mut window) = next_chunk(&mut r)?.expect("pool chunk");
        StringPool::read(&mut window, &header)
    }

    #[test]
    fn utf16_pool() {
        let buf = string_pool_chunk(&["manifest", "versionCode", ""]);
        let pool = parse(&buf).unwrap();
        assert_eq!(pool.len(), 3);
        assert!(!pool.is_utf8());
        assert_eq!(pool.get(0), Some("manifest"));
        assert_eq!(pool.get(1), Some("versionCode"));
        assert_eq!(pool.get(2), Some(""));
        assert_eq!(pool.get(3), None);
    }

    #[test]
    fn utf8_pool() {
        let buf = utf8_pool_chunk(&["hello", "world"]);
        let pool = parse(&buf).unwrap();
        assert!(pool.is_utf8());
        assert_eq!(pool.get(0), Some("hello"));
        assert_eq!(pool.get(1), Some("world"));
    }

    #[test]
    fn nil_reference_is_empty() {
        let buf = string_pool_chunk(&["only"]);
        let pool = parse(&buf).unwrap();
        assert_eq!(pool.get(NIL_REF), Some(""));
    }

    #[test]
    fn non_ascii_round_trip() {
        let buf = string_pool_chunk(&["héllo wörld", "日本語"]);
        let pool = parse(&buf).unwrap();
        assert_eq!(pool.get(0), Some("héllo wörld"));
        assert_eq!(pool.get(1), Some("日本語"));

        let buf = utf8_pool_chunk(&["héllo wörld", "日本語"]);
        let pool = parse(&buf).unwrap();
        assert_eq!(pool.get(1), Some("日本語"));
    }

    #[test]
    fn style_spans_are_decoded() {
        use crate::tests::fixtures::styled_pool_chunk;
        // "b" wraps characters 0..=3, "i" wraps 5..=8.
        let buf = styled_pool_chunk(
            &["bold italic", "plain", "b", "i"],
            &[&[(2, 0, 3), (3, 5, 8)]],
        );
        let pool = parse(&buf).unwrap();
        assert_eq!(pool.styles().len(), 1);
        assert_eq!(
            pool.styles()[0],
            vec![
                StyleSpan {
                    name: 2,
                    first_char: 0,
                    last_char: 3,
                },
                StyleSpan {
                    name: 3,
                    first_char: 5,
                    last_char: 8,
                },
            ]
        );
        assert_eq!(pool.get(0), Some("bold italic"));
    }

    #[test]
    fn long_utf16_length_uses_two_units() {
        // 0x12345 characters forces the two-u16 length header.
        let long: String = "a".repeat(0x12345);
        let buf = string_pool_chunk(&[&long]);
        let pool = parse(&buf).unwrap();
        let decoded = pool.get(0).unwrap();
        assert_eq!(decoded.len(), 0x12345);
        assert_eq!(decoded, long);
    }

    #[test]
    fn unpaired_surrogate_is_bad_encoding() {
        // A lone high surrogate 0xD800.
        let mut buf = string_pool_chunk(&["x"]);
        // Patch the single encoded unit 'x' to 0xD800; string data starts
        // at header (28) + one offset word (4) + 2-byte length prefix.
        let unit_at = 28 + 4 + 2;
        buf[unit_at..unit_at + 2].copy_from_slice(&0xD800u16.to_le_bytes());
        assert!(matches!(parse(&buf), Err(Error::BadEncoding { .. })));
    }

    #[test]
    fn counts_beyond_chunk_size_are_rejected() {
        let mut buf = string_pool_chunk(&["a"]);
        buf[8..12].copy_from_slice(&0xFFFF_0000u32.to_le_bytes());
        assert!(matches!(parse(&buf), Err(Error::Malformed { .. })));
    }
}
