//! Indexed UTF-8/UTF-16 string pools with optional style spans.

use std::sync::Arc;

use bitflags::bitflags;
use log::{debug, warn};
use serde::Serialize;

use crate::chunk::{ChunkHeader, RES_STRING_POOL_TYPE};
use crate::err::{ResError, Result};
use crate::utils::utf16::{decode_utf16_units, read_utf16le_units};
use crate::utils::{ByteCursor, IndexedIntArray, bytes};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct StringPoolFlags: u32 {
        const SORTED = 1 << 0;
        const UTF8 = 1 << 8;
    }
}

const SPAN_END: u32 = 0xffff_ffff;

/// One styled run: tag name index (into the same pool) and an inclusive character range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StyleSpan {
    pub name: u32,
    pub first_char: u32,
    pub last_char: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PoolHeader {
    chunk: ChunkHeader,
    string_count: u32,
    style_count: u32,
    flags: StringPoolFlags,
    strings_start: u32,
    styles_start: u32,
}

#[derive(Debug, Clone)]
struct Loaded {
    data: Arc<[u8]>,
    header: PoolHeader,
    entries: IndexedIntArray,
    entry_styles: IndexedIntArray,
    /// Absolute `[start, end)` of the packed string data.
    strings: (usize, usize),
    styles: IndexedIntArray,
}

/// A decoded string pool chunk.
///
/// A pool starts out uninitialized; [`StringPool::set_to`] either loads it completely or leaves
/// it empty with a sticky error.
#[derive(Debug, Clone)]
pub struct StringPool {
    loaded: Option<Loaded>,
    error: ResError,
}

impl Default for StringPool {
    fn default() -> Self {
        StringPool::new()
    }
}

impl StringPool {
    pub fn new() -> Self {
        StringPool {
            loaded: None,
            error: ResError::NotInitialized { what: "string pool" },
        }
    }

    /// Decode the pool chunk at `offset`, reading at most `size` bytes.
    pub fn parse(data: Arc<[u8]>, offset: usize, size: usize) -> Result<Self> {
        let mut pool = StringPool::new();
        pool.set_to(data, offset, size)?;
        Ok(pool)
    }

    pub fn set_to(&mut self, data: Arc<[u8]>, offset: usize, size: usize) -> Result<()> {
        self.uninit();
        match Self::load(data, offset, size) {
            Ok(loaded) => {
                debug!(
                    "string pool at offset {offset}: {} strings, {} styles, utf8={}",
                    loaded.header.string_count,
                    loaded.header.style_count,
                    loaded.header.flags.contains(StringPoolFlags::UTF8)
                );
                self.loaded = Some(loaded);
                Ok(())
            }
            Err(err) => {
                self.error = err.clone();
                Err(err)
            }
        }
    }

    pub fn uninit(&mut self) {
        self.loaded = None;
        self.error = ResError::NotInitialized { what: "string pool" };
    }

    fn load(data: Arc<[u8]>, offset: usize, size: usize) -> Result<Loaded> {
        let limit = offset.saturating_add(size).min(data.len());
        let chunk = ChunkHeader::read(&data[..limit], offset)?;
        chunk.expect_type(RES_STRING_POOL_TYPE)?;

        let mut cursor = ByteCursor::with_pos(&data[..chunk.end()], offset + ChunkHeader::SIZE)?;
        let header = PoolHeader {
            chunk,
            string_count: cursor.u32_named("string count")?,
            style_count: cursor.u32_named("style count")?,
            flags: StringPoolFlags::from_bits_retain(cursor.u32_named("string pool flags")?),
            strings_start: cursor.u32_named("strings start")?,
            styles_start: cursor.u32_named("styles start")?,
        };
        if cursor.pos() > chunk.body_offset() {
            return Err(ResError::malformed(
                "string pool",
                offset,
                format!("header size {} is too small", chunk.header_size),
            ));
        }

        let chunk_data = data.clone();
        let entries = IndexedIntArray::new(
            chunk_data.clone(),
            chunk.body_offset(),
            header.string_count as usize,
            "string offsets",
        )?;
        check_within_chunk(&chunk, entries.end(), "string offsets")?;

        let mut strings = (0, 0);
        if header.string_count > 0 {
            let end = if header.style_count == 0 {
                chunk.size
            } else {
                header.styles_start
            };
            if header.strings_start >= end || end > chunk.size {
                return Err(ResError::malformed(
                    "string pool",
                    offset,
                    format!(
                        "strings start {} is outside the string data (end {end})",
                        header.strings_start
                    ),
                ));
            }
            let read_size = end - header.strings_start;
            if read_size % 4 != 0 {
                return Err(ResError::malformed(
                    "string pool",
                    offset,
                    format!("string data size {read_size} is not a multiple of 4"),
                ));
            }
            let start = offset + header.strings_start as usize;
            strings = (start, start + read_size as usize);
        }

        let mut entry_styles = IndexedIntArray::empty();
        let mut styles = IndexedIntArray::empty();
        if header.style_count > 0 {
            entry_styles = IndexedIntArray::new(
                chunk_data.clone(),
                entries.offset() + entries.len() * 4,
                header.style_count as usize,
                "style offsets",
            )?;
            check_within_chunk(&chunk, entry_styles.end(), "style offsets")?;
            if header.styles_start >= chunk.size {
                return Err(ResError::malformed(
                    "string pool",
                    offset,
                    format!("styles start {} is past the chunk", header.styles_start),
                ));
            }
            let read_size = chunk.size - header.styles_start;
            if read_size % 4 != 0 {
                return Err(ResError::malformed(
                    "string pool",
                    offset,
                    format!("style data size {read_size} is not a multiple of 4"),
                ));
            }
            styles = IndexedIntArray::new(
                chunk_data,
                offset + header.styles_start as usize,
                read_size as usize / 4,
                "style spans",
            )?;
        }

        Ok(Loaded {
            data,
            header,
            entries,
            entry_styles,
            strings,
            styles,
        })
    }

    /// The sticky decode error, or `None` when the pool is loaded.
    pub fn error(&self) -> Option<&ResError> {
        match self.loaded {
            Some(_) => None,
            None => Some(&self.error),
        }
    }

    pub fn status(&self) -> Result<()> {
        match self.error() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// Number of strings; 0 when the pool is not loaded.
    pub fn count(&self) -> usize {
        self.loaded
            .as_ref()
            .map_or(0, |l| l.header.string_count as usize)
    }

    pub fn style_count(&self) -> usize {
        self.loaded
            .as_ref()
            .map_or(0, |l| l.header.style_count as usize)
    }

    pub fn flags(&self) -> StringPoolFlags {
        self.loaded
            .as_ref()
            .map_or(StringPoolFlags::empty(), |l| l.header.flags)
    }

    pub fn is_utf8(&self) -> bool {
        self.flags().contains(StringPoolFlags::UTF8)
    }

    pub fn is_sorted(&self) -> bool {
        self.flags().contains(StringPoolFlags::SORTED)
    }

    /// Byte size of the decoded chunk.
    pub fn bytes(&self) -> usize {
        self.loaded.as_ref().map_or(0, |l| l.header.chunk.size as usize)
    }

    /// Decode string `index`. Out-of-range indices and damaged records yield `None`.
    pub fn string_at(&self, index: usize) -> Option<String> {
        let loaded = self.loaded.as_ref()?;
        let rel = loaded.entries.get(index)? as usize;
        let (start, end) = loaded.strings;
        let region = loaded.data.get(..end)?;
        let at = start.checked_add(rel)?;
        if at >= end {
            warn!("string #{index} offset {rel} is past the string data");
            return None;
        }

        if loaded.header.flags.contains(StringPoolFlags::UTF8) {
            // UTF-16 length first (unused), then the byte length.
            let (_, used) = decode_length8(region, at)?;
            let (len, used2) = decode_length8(region, at + used)?;
            let raw = region.get(at + used + used2..)?.get(..len)?;
            match std::str::from_utf8(raw) {
                Ok(s) => Some(s.to_string()),
                Err(_) => {
                    warn!("string #{index} is not valid UTF-8, decoding lossily");
                    Some(String::from_utf8_lossy(raw).into_owned())
                }
            }
        } else {
            let (len, used) = decode_length16(region, at)?;
            let units = read_utf16le_units(region, at + used, len)?;
            match decode_utf16_units(&units) {
                Ok(s) => Some(s),
                Err(_) => {
                    warn!("string #{index} is not valid UTF-16, decoding lossily");
                    Some(String::from_utf16_lossy(&units))
                }
            }
        }
    }

    /// First index holding exactly `s`.
    pub fn index_of_string(&self, s: &str) -> Option<usize> {
        (0..self.count()).find(|&i| self.string_at(i).as_deref() == Some(s))
    }

    /// Last index holding exactly `s`. Type and key names tend to cluster at the end of a pool.
    pub fn index_of_string_from_end(&self, s: &str) -> Option<usize> {
        (0..self.count())
            .rev()
            .find(|&i| self.string_at(i).as_deref() == Some(s))
    }

    /// Style spans of string `index`, or `None` when it carries no style.
    pub fn style_at(&self, index: usize) -> Option<Vec<StyleSpan>> {
        let loaded = self.loaded.as_ref()?;
        if index >= loaded.header.style_count as usize {
            return None;
        }

        // Offsets are bytes relative to the style data.
        let words = &loaded.styles;
        let mut pos = loaded.entry_styles.get(index)? as usize / 4;

        let mut spans = Vec::new();
        loop {
            let name = words.get(pos)?;
            if name == SPAN_END {
                break;
            }
            spans.push(StyleSpan {
                name,
                first_char: words.get(pos + 1)?,
                last_char: words.get(pos + 2)?,
            });
            pos += 3;
        }
        Some(spans)
    }

    /// Rebuild HTML-like markup for string `index` from its style spans.
    ///
    /// A span named `b;color=red` opens as `<b color="red">` and closes as `</b>`. Tags open in
    /// order of their first character and close in order of their last one, so overlapping spans
    /// produce overlapping tags; nested spans still close innermost first.
    pub fn html_at(&self, index: usize) -> Option<String> {
        let raw = self.string_at(index)?;
        let Some(spans) = self.style_at(index).filter(|s| !s.is_empty()) else {
            return Some(raw);
        };

        let units: Vec<u16> = raw.encode_utf16().collect();
        let tags: Vec<(String, String)> = spans
            .iter()
            .map(|span| {
                let name = self.string_at(span.name as usize).unwrap_or_default();
                split_tag(&name)
            })
            .collect();

        let mut out = String::with_capacity(raw.len() + spans.len() * 8);
        let mut offset = 0;
        let push_text = |out: &mut String, offset: &mut usize, end: usize| {
            let end = end.min(units.len());
            if *offset < end {
                out.push_str(&String::from_utf16_lossy(&units[*offset..end]));
                *offset = end;
            }
        };
        // Open order of each span, `None` until its tag is written.
        let mut opened: Vec<Option<usize>> = vec![None; spans.len()];
        let mut closed = vec![false; spans.len()];
        let mut next_order = 0;
        loop {
            let next = (0..spans.len())
                .filter(|&i| opened[i].is_none())
                .min_by_key(|&i| (spans[i].first_char, i));
            let start = next.map_or(units.len(), |i| spans[i].first_char as usize);

            let mut ending: Vec<usize> = (0..spans.len())
                .filter(|&i| opened[i].is_some() && !closed[i])
                .filter(|&i| next.is_none() || (spans[i].last_char as usize) < start)
                .collect();
            ending.sort_by_key(|&i| (spans[i].last_char, std::cmp::Reverse(opened[i])));
            for i in ending {
                push_text(&mut out, &mut offset, spans[i].last_char as usize + 1);
                out.push_str("</");
                out.push_str(&tags[i].0);
                out.push('>');
                closed[i] = true;
            }

            push_text(&mut out, &mut offset, start);
            let Some(i) = next else {
                break;
            };
            out.push('<');
            out.push_str(&tags[i].0);
            out.push_str(&tags[i].1);
            out.push('>');
            opened[i] = Some(next_order);
            next_order += 1;
        }
        Some(out)
    }
}

fn check_within_chunk(chunk: &ChunkHeader, end: usize, what: &str) -> Result<()> {
    if end > chunk.end() {
        return Err(ResError::malformed(
            "string pool",
            chunk.offset,
            format!("{what} end at {end}, past the chunk end {}", chunk.end()),
        ));
    }
    Ok(())
}

/// Split `tag;key=value;key2=value2` into the tag name and rendered attributes.
fn split_tag(name: &str) -> (String, String) {
    let mut parts = name.split(';');
    let tag = parts.next().unwrap_or_default().to_string();
    let mut attrs = String::new();
    for part in parts {
        match part.split_once('=') {
            Some((k, v)) => attrs.push_str(&format!(" {k}=\"{v}\"")),
            None if !part.is_empty() => attrs.push_str(&format!(" {part}")),
            None => {}
        }
    }
    (tag, attrs)
}

/// One- or two-byte length prefix of UTF-8 pools.
fn decode_length8(buf: &[u8], at: usize) -> Option<(usize, usize)> {
    let first = bytes::read_u8(buf, at)? as usize;
    if first & 0x80 != 0 {
        let second = bytes::read_u8(buf, at + 1)? as usize;
        Some((((first & 0x7f) << 8) | second, 2))
    } else {
        Some((first, 1))
    }
}

/// One- or two-unit length prefix of UTF-16 pools, returned with its byte width.
fn decode_length16(buf: &[u8], at: usize) -> Option<(usize, usize)> {
    let first = bytes::read_u16_le(buf, at)? as usize;
    if first & 0x8000 != 0 {
        let second = bytes::read_u16_le(buf, at + 2)? as usize;
        Some((((first & 0x7fff) << 16) | second, 4))
    } else {
        Some((first, 2))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ensure_env_logger_initialized;
    use crate::err::ErrorKind;
    use crate::tests::builders::StringPoolBuilder;
    use pretty_assertions::assert_eq;

    fn pool(bytes: Vec<u8>) -> Result<StringPool> {
        let len = bytes.len();
        StringPool::parse(Arc::from(bytes), 0, len)
    }

    #[test]
    fn test_round_trips_utf16_strings() {
        ensure_env_logger_initialized();
        let strings = ["", "hello", "héllo wörld", "🎉 party"];
        let pool = pool(StringPoolBuilder::utf16(&strings).build()).unwrap();
        assert_eq!(pool.count(), 4);
        assert!(!pool.is_utf8());
        for (i, s) in strings.iter().enumerate() {
            assert_eq!(pool.string_at(i).as_deref(), Some(*s));
        }
        assert_eq!(pool.string_at(4), None);
    }

    #[test]
    fn test_round_trips_utf8_strings() {
        let strings = ["", "res/layout/main.xml", "ünïcödé"];
        let pool = pool(StringPoolBuilder::utf8(&strings).build()).unwrap();
        assert!(pool.is_utf8());
        for (i, s) in strings.iter().enumerate() {
            assert_eq!(pool.string_at(i).as_deref(), Some(*s));
        }
    }

    #[test]
    fn test_long_strings_use_extended_lengths() {
        let long8 = "x".repeat(0x7fff);
        let long16 = "y".repeat(0x9000);
        let pool8 = pool(StringPoolBuilder::utf8(&[long8.as_str()]).build()).unwrap();
        assert_eq!(pool8.string_at(0).map(|s| s.len()), Some(0x7fff));

        let pool16 = pool(StringPoolBuilder::utf16(&[long16.as_str()]).build()).unwrap();
        assert_eq!(pool16.string_at(0), Some(long16));
    }

    #[test]
    fn test_index_of_string_scans_both_ways() {
        let pool = pool(StringPoolBuilder::utf16(&["a", "b", "a", "c"]).build()).unwrap();
        assert_eq!(pool.index_of_string("a"), Some(0));
        assert_eq!(pool.index_of_string_from_end("a"), Some(2));
        assert_eq!(pool.index_of_string("zzz"), None);
    }

    #[test]
    fn test_misaligned_string_data_is_bad_type() {
        let mut bytes = StringPoolBuilder::utf16(&["abc"]).build();
        // Drop two bytes of padding and shrink the chunk to match.
        bytes.truncate(bytes.len() - 2);
        let size = bytes.len() as u32;
        bytes[4..8].copy_from_slice(&size.to_le_bytes());

        let len = bytes.len();
        let mut pool = StringPool::new();
        let err = pool.set_to(Arc::from(bytes), 0, len).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadType);
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.error().map(ResError::kind), Some(ErrorKind::BadType));
    }

    #[test]
    fn test_header_larger_than_chunk_is_bad_type() {
        let mut bytes = StringPoolBuilder::utf16(&["abc"]).build();
        let size = bytes.len() as u16 + 4;
        bytes[2..4].copy_from_slice(&size.to_le_bytes());
        assert_eq!(pool(bytes).unwrap_err().kind(), ErrorKind::BadType);
    }

    #[test]
    fn test_wrong_chunk_type_is_rejected() {
        let mut bytes = StringPoolBuilder::utf16(&["abc"]).build();
        bytes[0] = 0x02;
        assert!(matches!(
            pool(bytes),
            Err(ResError::UnexpectedChunkType { found: 0x0002, .. })
        ));
    }

    #[test]
    fn test_uninitialized_pool_reports_no_init() {
        let pool = StringPool::new();
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.status().unwrap_err().kind(), ErrorKind::NoInit);
    }

    #[test]
    fn test_styles_and_html() {
        // "bold and italic" with <b> over "bold" and <i;color=red> over "italic".
        let builder = StringPoolBuilder::utf16(&["bold and italic", "plain", "b", "i;color=red"])
            .with_styles(vec![vec![[2, 0, 3], [3, 9, 14]], vec![]]);
        let pool = pool(builder.build()).unwrap();

        assert_eq!(pool.style_count(), 2);
        assert_eq!(
            pool.style_at(0),
            Some(vec![
                StyleSpan {
                    name: 2,
                    first_char: 0,
                    last_char: 3
                },
                StyleSpan {
                    name: 3,
                    first_char: 9,
                    last_char: 14
                },
            ])
        );
        assert_eq!(pool.style_at(1), Some(vec![]));
        assert_eq!(pool.style_at(2), None);

        assert_eq!(
            pool.html_at(0).as_deref(),
            Some("<b>bold</b> and <i color=\"red\">italic</i>")
        );
        assert_eq!(pool.html_at(1).as_deref(), Some("plain"));
    }

    #[test]
    fn test_nested_spans_close_innermost_first() {
        let builder =
            StringPoolBuilder::utf16(&["abc", "b", "i"]).with_styles(vec![vec![[1, 0, 2], [2, 1, 1]]]);
        let pool = pool(builder.build()).unwrap();
        assert_eq!(pool.html_at(0).as_deref(), Some("<b>a<i>b</i>c</b>"));
    }

    #[test]
    fn test_overlapping_spans_close_in_end_order() {
        let builder = StringPoolBuilder::utf16(&["abcdefg", "b", "i"])
            .with_styles(vec![vec![[1, 0, 3], [2, 2, 5]]]);
        let pool = pool(builder.build()).unwrap();
        assert_eq!(pool.html_at(0).as_deref(), Some("<b>ab<i>cd</b>ef</i>g"));
    }

    #[test]
    fn test_style_runs_are_found_through_their_offsets() {
        let mut bytes = StringPoolBuilder::utf16(&["ab", "cd", "b", "i"])
            .with_styles(vec![vec![[2, 0, 0]], vec![[3, 1, 1]]])
            .build();
        // Swap the two style offsets; the runs themselves stay in place.
        let first = 28 + 4 * 4;
        let (a, b) = (bytes[first..first + 4].to_vec(), bytes[first + 4..first + 8].to_vec());
        bytes[first..first + 4].copy_from_slice(&b);
        bytes[first + 4..first + 8].copy_from_slice(&a);

        let pool = pool(bytes).unwrap();
        assert_eq!(
            pool.style_at(0),
            Some(vec![StyleSpan {
                name: 3,
                first_char: 1,
                last_char: 1
            }])
        );
        assert_eq!(pool.html_at(1).as_deref(), Some("<b>c</b>d"));
    }

    #[test]
    fn test_string_offsets_past_chunk_are_bad_type() {
        let mut bytes = StringPoolBuilder::utf16(&["abc"]).build();
        let len = bytes.len();
        bytes[8..12].copy_from_slice(&5u32.to_le_bytes());
        // Bytes of a following chunk must not be read as offsets.
        bytes.extend_from_slice(&[0u8; 64]);

        let mut pool = StringPool::new();
        let err = pool.set_to(Arc::from(bytes), 0, len).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadType);
        assert_eq!(pool.count(), 0);
        assert_eq!(pool.string_at(3), None);
    }

    #[test]
    fn test_style_offsets_past_chunk_are_bad_type() {
        let mut bytes = StringPoolBuilder::utf16(&["abc", "b"])
            .with_styles(vec![vec![[1, 0, 1]]])
            .build();
        let len = bytes.len();
        bytes[12..16].copy_from_slice(&20u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 128]);

        let err = StringPool::parse(Arc::from(bytes), 0, len).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadType);
    }
}
