//! Minimal tag scanner for string-level XML surgery.
//!
//! These helpers locate tags by byte offset without building a tree, so the
//! text between them is never re-serialized. All returned offsets sit on
//! ASCII `<` / `>` boundaries and are therefore valid `str` slice indices.

use std::ops::Range;

/// Find the next start tag `<name …>` at or after `from`.
///
/// The name must be followed by whitespace, `>` or `/`, so `<DPS` does not
/// match `<DPSx>` and `<Signature` does not match `<SignatureValue>`.
///
/// # Examples
/// ```
/// use nfse_dps::xml::find_start_tag;
///
/// let xml = "<DPS><infDPSx/><infDPS Id=\"a\"></infDPS></DPS>";
/// assert_eq!(find_start_tag(xml, "infDPS", 0), Some(15));
/// assert_eq!(find_start_tag(xml, "DPS", 1), None);
/// ```
pub fn find_start_tag(xml: &str, name: &str, from: usize) -> Option<usize> {
    let needle = format!("<{name}");
    let mut pos = from;
    while let Some(rel) = xml.get(pos..)?.find(&needle) {
        let start = pos + rel;
        let after = start + needle.len();
        match xml.as_bytes().get(after) {
            Some(b) if b.is_ascii_whitespace() || *b == b'>' || *b == b'/' => return Some(start),
            _ => pos = after,
        }
    }
    None
}

/// Find the next end tag `</name>` (whitespace before `>` allowed) at or
/// after `from`, returning its byte range.
pub fn find_end_tag(xml: &str, name: &str, from: usize) -> Option<Range<usize>> {
    let needle = format!("</{name}");
    let mut pos = from;
    while let Some(rel) = xml.get(pos..)?.find(&needle) {
        let start = pos + rel;
        let mut cursor = start + needle.len();
        let bytes = xml.as_bytes();
        while bytes.get(cursor).is_some_and(u8::is_ascii_whitespace) {
            cursor += 1;
        }
        if bytes.get(cursor) == Some(&b'>') {
            return Some(start..cursor + 1);
        }
        pos = start + needle.len();
    }
    None
}

/// Offset just past the `>` closing the tag that starts at `start`.
///
/// Quoted attribute values may contain `>`; they are skipped.
pub fn tag_end(xml: &str, start: usize) -> Option<usize> {
    let bytes = xml.as_bytes();
    let mut quote: Option<u8> = None;
    let mut i = start;
    while let Some(&b) = bytes.get(i) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some(i + 1),
            None => {}
        }
        i += 1;
    }
    None
}

/// Byte range of the first `name` element starting at or after `from` and
/// ending at or before `limit`, from `<name` through `</name>`.
///
/// Same-name elements may nest; the range ends at the matching end tag.
pub fn find_element(xml: &str, name: &str, from: usize, limit: usize) -> Option<Range<usize>> {
    let start = find_start_tag(xml, name, from)?;
    let open_end = tag_end(xml, start)?;
    if open_end > limit {
        return None;
    }
    if is_self_closing(xml, open_end) {
        return Some(start..open_end);
    }

    let mut depth = 1usize;
    let mut cursor = open_end;
    loop {
        let close = find_end_tag(xml, name, cursor)?;
        let mut pos = cursor;
        while let Some(nested) = find_start_tag(xml, name, pos).filter(|s| *s < close.start) {
            let nested_end = tag_end(xml, nested)?;
            if !is_self_closing(xml, nested_end) {
                depth += 1;
            }
            pos = nested_end;
        }
        depth -= 1;
        if depth == 0 {
            return (close.end <= limit).then_some(start..close.end);
        }
        cursor = close.end;
    }
}

/// Whether the tag ending just before `tag_end` is `<name/>`.
fn is_self_closing(xml: &str, tag_end: usize) -> bool {
    xml.get(..tag_end).is_some_and(|head| head.ends_with("/>"))
}

/// All non-overlapping `name` elements inside `range`.
pub fn find_elements(xml: &str, name: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let mut found = Vec::new();
    let mut pos = range.start;
    while let Some(element) = find_element(xml, name, pos, range.end) {
        pos = element.end;
        found.push(element);
    }
    found
}
