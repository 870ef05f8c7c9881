//! Flattening `StringFileInfo` tables into an ordered string map.

use crate::error::{Error, Result};
use crate::record::{decode_utf16, ValueType, VersionRecord};
use indexmap::IndexMap;
use std::fmt;
use tracing::{debug, trace};

/// Key of the root record of every version block
pub const VS_VERSION_INFO: &str = "VS_VERSION_INFO";
/// Key of the subtree holding the per-language string tables
pub const STRING_FILE_INFO: &str = "StringFileInfo";
/// Key of the subtree holding the translation list
pub const VAR_FILE_INFO: &str = "VarFileInfo";
/// Key of the `(language, codepage)` list under `VarFileInfo`
pub const TRANSLATION: &str = "Translation";

/// Field name → text value, in the order fields were first seen
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfoMap {
    entries: IndexMap<String, String>,
}

impl VersionInfoMap {
    /// Creates an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` unless `key` is already present.
    ///
    /// Returns `true` if the entry was inserted.
    pub fn insert_first(&mut self, key: String, value: String) -> bool {
        match self.entries.entry(key) {
            indexmap::map::Entry::Occupied(_) => false,
            indexmap::map::Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    /// Looks up a field
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no field was extracted
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field names in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// `(name, value)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Unwraps the underlying ordered map
    pub fn into_inner(self) -> IndexMap<String, String> {
        self.entries
    }
}

impl IntoIterator for VersionInfoMap {
    type Item = (String, String);
    type IntoIter = indexmap::map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

/// A `(language, codepage)` pair identifying one string table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LangCodepage {
    /// Windows language id, e.g. `0x0409`
    pub language: u16,
    /// Code page, e.g. `0x04b0` (UTF-16)
    pub codepage: u16,
}

impl LangCodepage {
    /// Parses a string-table key such as `040904b0`
    pub fn parse_hex(id: &str) -> Option<Self> {
        if id.len() != 8 || !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        Some(Self {
            language: u16::from_str_radix(&id[..4], 16).ok()?,
            codepage: u16::from_str_radix(&id[4..], 16).ok()?,
        })
    }
}

impl fmt::Display for LangCodepage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}{:04x}", self.language, self.codepage)
    }
}

/// Collects the string tables of a decoded `VS_VERSION_INFO` tree
#[derive(Debug, Clone)]
pub struct StringTableAssembler {
    max_tables: usize,
}

impl Default for StringTableAssembler {
    fn default() -> Self {
        Self::new(64)
    }
}

impl StringTableAssembler {
    /// Creates an assembler that visits at most `max_tables` string tables
    pub fn new(max_tables: usize) -> Self {
        Self { max_tables }
    }

    /// Flattens every string table under `StringFileInfo`.
    ///
    /// When a field appears in several tables the first value wins.
    /// Undecodable strings are skipped; a missing `StringFileInfo` yields an
    /// empty map.
    pub fn assemble(&self, root: &VersionRecord<'_>) -> Result<VersionInfoMap> {
        let mut map = VersionInfoMap::new();

        if !root.key_is(VS_VERSION_INFO) {
            debug!("Root record at {} is not {}", root.offset, VS_VERSION_INFO);
            return Ok(map);
        }
        let Some(string_file_info) = root.child(STRING_FILE_INFO) else {
            trace!("No {} in version block", STRING_FILE_INFO);
            return Ok(map);
        };

        for table in string_file_info.children.iter().take(self.max_tables) {
            match table.key() {
                Ok(id) => match LangCodepage::parse_hex(&id) {
                    Some(lang) => trace!("String table {} (lang 0x{:04x})", id, lang.language),
                    None => trace!("String table with non-hex id {:?}", id),
                },
                Err(e) => trace!("String table with undecodable id: {}", e),
            }

            for entry in &table.children {
                match string_entry(entry) {
                    Ok((key, value)) => {
                        if !map.insert_first(key, value) {
                            trace!("Ignoring duplicate field at {}", entry.offset);
                        }
                    }
                    Err(e) if e.is_recoverable() => debug!("Skipping string: {}", e),
                    Err(e) => return Err(e),
                }
            }
        }

        if string_file_info.children.len() > self.max_tables {
            debug!(
                "Ignored {} string tables past the limit of {}",
                string_file_info.children.len() - self.max_tables,
                self.max_tables
            );
        }

        Ok(map)
    }

    /// Reads the `VarFileInfo/Translation` list
    pub fn translations(&self, root: &VersionRecord<'_>) -> Vec<LangCodepage> {
        let Some(value) = root
            .child(VAR_FILE_INFO)
            .and_then(|var| var.child(TRANSLATION))
            .and_then(|translation| translation.value)
        else {
            return Vec::new();
        };

        value
            .chunks_exact(4)
            .take(self.max_tables)
            .map(|pair| LangCodepage {
                language: u16::from_le_bytes([pair[0], pair[1]]),
                codepage: u16::from_le_bytes([pair[2], pair[3]]),
            })
            .collect()
    }
}

/// Decodes one `String` leaf into its field name and text
fn string_entry(record: &VersionRecord<'_>) -> Result<(String, String)> {
    let key = record.key()?;
    let raw = record.value.unwrap_or_default();
    if record.value_type == ValueType::Binary && raw.len() % 2 != 0 {
        return Err(Error::encoding(
            record.offset,
            format!("binary value of {} bytes in string {:?}", raw.len(), key),
        ));
    }
    let mut value = decode_utf16(raw, record.offset)?;
    if value.ends_with('\0') {
        value.pop();
    }
    Ok((key, value))
}
