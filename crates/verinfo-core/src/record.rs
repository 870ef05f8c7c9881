//! Decoder for the nested record format of a version-information block.
//!
//! Every node of a `VS_VERSIONINFO` block shares one layout:
//!
//! ```text
//! u16 wLength       total size of the record, children included
//! u16 wValueLength  value size (UTF-16 code units for text, bytes otherwise)
//! u16 wType         0 = binary, 1 = text
//! u16 szKey[]       NUL-terminated UTF-16LE key
//!     padding       to a 4-byte boundary from the record start
//!     value         wValueLength units
//!     padding       to a 4-byte boundary from the record start
//!     children      records until wLength is exhausted
//! ```
//!
//! The length fields are untrusted. The decoder walks the tree with an
//! explicit stack of frames, clamps every frame's end to
//! `min(declared end, parent end, buffer end)` and moves the cursor strictly
//! forward, so a corrupt block costs the affected subtree and never more.

use crate::bytes::{align4, read_u16_le, utf16_units};
use crate::error::{Error, Result};
use tracing::{debug, trace};

/// Size of the fixed `wLength`/`wValueLength`/`wType` header
pub const HEADER_SIZE: usize = 6;

/// Interpretation of a record's value bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// Raw bytes, `wValueLength` counts bytes
    Binary,
    /// UTF-16LE text, `wValueLength` counts code units
    Text,
    /// Any other `wType`; treated like text when sizing the value
    Other(u16),
}

impl From<u16> for ValueType {
    fn from(value: u16) -> Self {
        match value {
            0 => ValueType::Binary,
            1 => ValueType::Text,
            other => ValueType::Other(other),
        }
    }
}

impl ValueType {
    /// Number of value bytes described by `value_length`
    pub fn value_size(self, value_length: u16) -> usize {
        match self {
            ValueType::Binary => usize::from(value_length),
            ValueType::Text | ValueType::Other(_) => usize::from(value_length) * 2,
        }
    }
}

/// One decoded record, borrowing its key and value from the input block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord<'a> {
    /// Offset of the record inside the decoded block
    pub offset: usize,
    /// Declared `wLength`
    pub length: u16,
    /// Declared `wValueLength`
    pub value_length: u16,
    /// Declared `wType`
    pub value_type: ValueType,
    key: &'a [u8],
    /// Value bytes, if `wValueLength` was non-zero
    pub value: Option<&'a [u8]>,
    /// Child records in block order
    pub children: Vec<VersionRecord<'a>>,
}

impl<'a> VersionRecord<'a> {
    /// Decodes the key, failing on unpaired surrogates
    pub fn key(&self) -> Result<String> {
        decode_utf16(self.key, self.offset)
    }

    /// Compares the key against `expected` without allocating
    pub fn key_is(&self, expected: &str) -> bool {
        self.key.len() % 2 == 0 && utf16_units(self.key).into_iter().eq(expected.encode_utf16())
    }

    /// First direct child whose key equals `key`
    pub fn child(&self, key: &str) -> Option<&VersionRecord<'a>> {
        self.children.iter().find(|c| c.key_is(key))
    }
}

/// Decodes UTF-16LE bytes, rejecting odd lengths and unpaired surrogates
pub(crate) fn decode_utf16(bytes: &[u8], offset: usize) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::encoding(
            offset,
            format!("{} bytes is not a whole number of UTF-16 units", bytes.len()),
        ));
    }
    String::from_utf16(&utf16_units(bytes))
        .map_err(|_| Error::encoding(offset, "unpaired surrogate"))
}

/// A record whose header, key and value are read; children still pending
struct Node<'a> {
    record: VersionRecord<'a>,
    children_start: usize,
    end: usize,
    next: usize,
}

struct Frame<'a> {
    record: VersionRecord<'a>,
    cursor: usize,
    end: usize,
}

impl<'a> From<Node<'a>> for Frame<'a> {
    fn from(node: Node<'a>) -> Self {
        Self {
            record: node.record,
            cursor: node.children_start,
            end: node.end,
        }
    }
}

/// Position of the sibling following a record that starts at `start` with
/// the given declared length
fn next_sibling(start: usize, length: u16) -> usize {
    align4(start, start.saturating_add(usize::from(length)))
}

/// Reads one record's header, key and value.
///
/// Returns `Ok(None)` for the zero-length end-of-list sentinel.
fn read_node(data: &[u8], start: usize, limit: usize) -> Result<Option<Node<'_>>> {
    let limit = limit.min(data.len());
    if start.saturating_add(HEADER_SIZE) > limit {
        return Err(Error::malformed_record(start, "truncated record header"));
    }
    let field = |at: usize| {
        read_u16_le(data, start + at)
            .ok_or_else(|| Error::malformed_record(start, "truncated record header"))
    };
    let length = field(0)?;
    if length == 0 {
        return Ok(None);
    }
    let value_length = field(2)?;
    let value_type = ValueType::from(field(4)?);

    if usize::from(length) < HEADER_SIZE {
        return Err(Error::malformed_record(
            start,
            format!("declared length {} is shorter than the header", length),
        ));
    }
    let end = (start + usize::from(length)).min(limit);

    let key_start = start + HEADER_SIZE;
    let mut key_end = key_start;
    loop {
        if key_end + 2 > end {
            return Err(Error::malformed_record(start, "unterminated key"));
        }
        if read_u16_le(data, key_end) == Some(0) {
            break;
        }
        key_end += 2;
    }
    let mut cursor = align4(start, key_end + 2);

    let value = if value_length > 0 {
        let size = value_type.value_size(value_length);
        let value_end = cursor + size;
        if value_end > end {
            return Err(Error::malformed_record(
                start,
                format!("value of {} bytes runs past end of record", size),
            ));
        }
        let value = &data[cursor..value_end];
        cursor = align4(start, value_end);
        Some(value)
    } else {
        None
    };

    Ok(Some(Node {
        record: VersionRecord {
            offset: start,
            length,
            value_length,
            value_type,
            key: &data[key_start..key_end],
            value,
            children: Vec::new(),
        },
        children_start: cursor.min(end),
        end,
        next: next_sibling(start, length),
    }))
}

/// Decodes version-information record trees
#[derive(Debug, Clone)]
pub struct RecordDecoder {
    max_depth: usize,
}

impl Default for RecordDecoder {
    fn default() -> Self {
        Self::new(16)
    }
}

impl RecordDecoder {
    /// Creates a decoder that stops descending below `max_depth` levels
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
        }
    }

    /// Decodes the record tree rooted at the start of `data`
    pub fn decode<'a>(&self, data: &'a [u8]) -> Result<Option<VersionRecord<'a>>> {
        self.decode_at(data, 0, data.len())
    }

    /// Decodes the record starting at `start`, never reading at or past `end`.
    ///
    /// Returns `Ok(None)` if not even the root header, key and value can be
    /// read. Children that fail to decode are dropped and logged; siblings
    /// after them are still attempted.
    pub fn decode_at<'a>(
        &self,
        data: &'a [u8],
        start: usize,
        end: usize,
    ) -> Result<Option<VersionRecord<'a>>> {
        let root = match read_node(data, start, end) {
            Ok(Some(node)) => node,
            Ok(None) => return Ok(None),
            Err(e) if e.is_recoverable() => {
                debug!("Unreadable root record: {}", e);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut stack: Vec<Frame<'a>> = vec![Frame::from(root)];
        loop {
            let depth = stack.len();
            let Some(frame) = stack.last_mut() else {
                return Err(Error::internal("record stack emptied before root completed"));
            };

            if frame.end.saturating_sub(frame.cursor) < HEADER_SIZE {
                let Some(done) = stack.pop() else {
                    return Err(Error::internal("record stack emptied before root completed"));
                };
                match stack.last_mut() {
                    Some(parent) => parent.record.children.push(done.record),
                    None => return Ok(Some(done.record)),
                }
                continue;
            }

            let child_start = frame.cursor;
            match read_node(data, child_start, frame.end) {
                Ok(Some(node)) => {
                    frame.cursor = node.next;
                    let has_children = node.children_start < node.end;
                    if has_children && depth < self.max_depth {
                        stack.push(Frame::from(node));
                    } else {
                        if has_children {
                            debug!(
                                "Record at {} nested deeper than {} levels; skipping its children",
                                child_start, self.max_depth
                            );
                        }
                        frame.record.children.push(node.record);
                    }
                }
                Ok(None) => {
                    trace!("Zero-length record at {} ends the sibling list", child_start);
                    frame.cursor = frame.end;
                }
                Err(e) if e.is_recoverable() => {
                    debug!("Dropping record: {}", e);
                    frame.cursor = match read_u16_le(data, child_start) {
                        Some(length) if length > 0 => next_sibling(child_start, length),
                        _ => frame.end,
                    };
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{record, string, string_table, version_block, Value};
    use pretty_assertions::assert_eq;
    use quickcheck::{Gen, QuickCheck};
    use quickcheck_macros::quickcheck;

    fn keys(record: &VersionRecord<'_>) -> Vec<String> {
        record.children.iter().map(|c| c.key().unwrap()).collect()
    }

    #[test]
    fn test_decode_header_fields() {
        let block = string("CompanyName", "Acme");
        let root = RecordDecoder::default().decode(&block).unwrap().unwrap();

        assert_eq!(root.offset, 0);
        assert_eq!(usize::from(root.length), block.len());
        assert_eq!(root.value_length, 5);
        assert_eq!(root.value_type, ValueType::Text);
        assert_eq!(root.key().unwrap(), "CompanyName");
        assert_eq!(root.value.unwrap().len(), 10);
        assert!(root.children.is_empty());
    }

    #[test]
    fn test_decode_full_tree() {
        let block = version_block(&[("040904b0", &[("CompanyName", "Acme")])]);
        let root = RecordDecoder::default().decode(&block).unwrap().unwrap();

        assert!(root.key_is("VS_VERSION_INFO"));
        assert_eq!(root.value_type, ValueType::Binary);
        assert_eq!(root.value.unwrap().len(), 52);
        assert_eq!(keys(&root), vec!["StringFileInfo", "VarFileInfo"]);

        let table = &root.child("StringFileInfo").unwrap().children[0];
        assert_eq!(table.key().unwrap(), "040904b0");
        assert_eq!(keys(table), vec!["CompanyName"]);

        let translation = root.child("VarFileInfo").unwrap().child("Translation").unwrap();
        assert_eq!(translation.value, Some(&[0x09, 0x04, 0xb0, 0x04][..]));
    }

    #[test]
    fn test_odd_length_keys_keep_siblings_aligned() {
        let table = record(
            "0000",
            Value::None,
            &[string("Lan", "x"), string("Lang", "yy"), string("L", "zzz")],
        );
        let root = RecordDecoder::default().decode(&table).unwrap().unwrap();
        assert_eq!(keys(&root), vec!["Lan", "Lang", "L"]);
        assert_eq!(root.children[2].value.unwrap().len(), 8);
    }

    #[test]
    fn test_zero_length_sentinel_ends_sibling_list() {
        let mut children = vec![string("A", "1"), vec![0u8; 8], string("B", "2")];
        let table = record("t", Value::None, &children);
        let root = RecordDecoder::default().decode(&table).unwrap().unwrap();
        assert_eq!(keys(&root), vec!["A"]);

        children.remove(1);
        let table = record("t", Value::None, &children);
        let root = RecordDecoder::default().decode(&table).unwrap().unwrap();
        assert_eq!(keys(&root), vec!["A", "B"]);
    }

    #[test]
    fn test_truncated_value_keeps_earlier_siblings() {
        let block = string_table("040904b0", &[("A", "first"), ("B", "second value")]);
        // Cut into the middle of the second value.
        let cut = block.len() - 6;
        let root = RecordDecoder::default().decode(&block[..cut]).unwrap().unwrap();
        assert_eq!(keys(&root), vec!["A"]);
    }

    #[test]
    fn test_overlong_child_is_dropped_and_next_sibling_kept() {
        let mut bad = string("Bad", "value");
        // Claim more value units than the record holds.
        bad[2..4].copy_from_slice(&40u16.to_le_bytes());
        let table = record("t", Value::None, &[string("A", "1"), bad, string("C", "3")]);

        let root = RecordDecoder::default().decode(&table).unwrap().unwrap();
        assert_eq!(keys(&root), vec!["A", "C"]);
    }

    #[test]
    fn test_child_cannot_escape_parent() {
        let mut inner = string("Inner", "v");
        // Declared length runs past the parent's end.
        inner[0..2].copy_from_slice(&0x4000u16.to_le_bytes());
        let parent = record("P", Value::None, &[inner]);
        let mut block = parent.clone();
        block.extend(string("Outside", "o"));

        let root = RecordDecoder::default().decode(&block).unwrap().unwrap();
        assert_eq!(usize::from(root.length), parent.len());
        assert!(root.children.iter().all(|c| c.offset < parent.len()));
    }

    #[test]
    fn test_depth_limit_keeps_record_without_children() {
        let block = version_block(&[("040904b0", &[("CompanyName", "Acme")])]);
        let root = RecordDecoder::new(2).decode(&block).unwrap().unwrap();
        let string_file_info = root.child("StringFileInfo").unwrap();
        assert_eq!(string_file_info.children.len(), 1);
        assert!(string_file_info.children[0].children.is_empty());
    }

    #[test]
    fn test_unreadable_root() {
        let decoder = RecordDecoder::default();
        assert_eq!(decoder.decode(&[]).unwrap(), None);
        assert_eq!(decoder.decode(&[0x10, 0x00, 0x00]).unwrap(), None);
        assert_eq!(decoder.decode(&[0u8; 32]).unwrap(), None);
        // Key never terminated.
        assert_eq!(decoder.decode(&[0x0a, 0, 0, 0, 1, 0, b'A', 0, b'B', 0]).unwrap(), None);
    }

    #[test]
    fn test_decode_at_respects_end() {
        let block = string_table("t", &[("A", "1"), ("B", "2")]);
        let first_end = string("A", "1").len();
        let root = RecordDecoder::default()
            .decode_at(&block, 0, 12 + 4 + first_end)
            .unwrap()
            .unwrap();
        assert_eq!(keys(&root), vec!["A"]);
    }

    #[test]
    fn test_decode_utf16_errors() {
        assert_eq!(decode_utf16(&[b'h', 0, b'i', 0], 0).unwrap(), "hi");
        assert!(matches!(
            decode_utf16(&[b'h', 0, b'i'], 4),
            Err(Error::Encoding { offset: 4, .. })
        ));
        assert!(matches!(
            decode_utf16(&[0x00, 0xd8, b'x', 0], 8),
            Err(Error::Encoding { offset: 8, .. })
        ));
    }

    #[test]
    fn decode_arbitrary_bytes_terminates() {
        fn prop(data: Vec<u8>) -> bool {
            RecordDecoder::default().decode(&data).is_ok()
        }
        // Buffers of up to 10,000 bytes.
        QuickCheck::new()
            .gen(Gen::new(10_000))
            .tests(300)
            .quickcheck(prop as fn(Vec<u8>) -> bool);
    }

    #[quickcheck]
    fn decode_arbitrary_prefix_of_valid_block(cut: usize, flip: Vec<(usize, u8)>) -> bool {
        let mut block = version_block(&[
            ("040904b0", &[("CompanyName", "Acme"), ("FileDescription", "Test App")]),
            ("040704b0", &[("CompanyName", "Acme GmbH")]),
        ]);
        for (at, byte) in flip {
            let len = block.len();
            block[at % len] ^= byte;
        }
        let cut = cut % (block.len() + 1);
        RecordDecoder::default().decode(&block[..cut]).is_ok()
    }
}
