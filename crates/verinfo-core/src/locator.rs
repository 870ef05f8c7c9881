//! Locating the version-information resource inside a PE image.
//!
//! The resource directory is a three-level tree (type → name/id → language)
//! whose leaves are data entries carrying an RVA and a size. This module
//! reads just enough of the PE headers to find the resource directory and
//! to translate RVAs into file offsets through the section table, then walks
//! the tree for `RT_VERSION`.
//!
//! Every structural problem is reported as a recoverable [`Error`] by the
//! inner walk and turned into "absent" by [`ResourceLocator::locate`].

use crate::bytes::{read_u16_le, read_u32_le};
use crate::error::{Error, Result};
use std::fmt;
use std::ops::Range;
use tracing::{debug, trace};

/// Resource type id of the version-information resource
pub const RT_VERSION: u32 = 16;

const DOS_HEADER_SIZE: usize = 0x40;
const E_LFANEW_OFFSET: usize = 0x3c;
const PE_SIGNATURE: &[u8; 4] = b"PE\0\0";
const COFF_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;

const OPTIONAL_MAGIC_PE32: u16 = 0x10b;
const OPTIONAL_MAGIC_PE32_PLUS: u16 = 0x20b;

/// Index of the resource table in the optional header's data directories
const IMAGE_DIRECTORY_ENTRY_RESOURCE: u32 = 2;
const DATA_DIRECTORY_SIZE: usize = 8;

const RESOURCE_DIRECTORY_HEADER_SIZE: usize = 16;
const RESOURCE_DIRECTORY_ENTRY_SIZE: usize = 8;
const RESOURCE_DATA_ENTRY_SIZE: usize = 16;

const HIGH_BIT: u32 = 0x8000_0000;

/// One row of the PE section table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Section {
    /// RVA of the first byte of the section
    pub virtual_address: u32,
    /// Size of the section once mapped
    pub virtual_size: u32,
    /// File offset of the section's raw data
    pub raw_ptr: u32,
    /// Size of the section's raw data in the file
    pub raw_size: u32,
}

impl Section {
    /// Half-open RVA range `[VirtualAddress, VirtualAddress + Size)`.
    ///
    /// Size is the larger of the mapped and raw sizes; linkers leave either
    /// one at zero often enough that neither can be trusted alone.
    pub fn rva_range(&self) -> Range<u64> {
        let start = u64::from(self.virtual_address);
        let size = self.virtual_size.max(self.raw_size);
        start..start + u64::from(size)
    }

    /// Maps `rva` to a file offset if this section contains it
    pub fn file_offset(&self, rva: u32) -> Option<usize> {
        if !self.rva_range().contains(&u64::from(rva)) {
            return None;
        }
        let delta = rva - self.virtual_address;
        (self.raw_ptr as usize).checked_add(delta as usize)
    }
}

/// The parts of a PE image the locator needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeLayout {
    sections: Vec<Section>,
    resource_rva: u32,
    resource_size: u32,
}

impl PeLayout {
    /// Parses the DOS, COFF and optional headers plus the section table.
    ///
    /// Returns `Ok(None)` when the image is well formed but carries no
    /// resource directory.
    pub fn parse(data: &[u8]) -> Result<Option<Self>> {
        if data.len() < DOS_HEADER_SIZE {
            return Err(Error::malformed_container("file too small for a DOS header"));
        }
        if &data[0..2] != b"MZ" {
            return Err(Error::malformed_container("missing MZ signature"));
        }

        let e_lfanew = read_u32_le(data, E_LFANEW_OFFSET)
            .ok_or_else(|| Error::malformed_container("missing e_lfanew"))?
            as usize;
        let coff_offset = e_lfanew
            .checked_add(PE_SIGNATURE.len())
            .ok_or_else(|| Error::malformed_container("e_lfanew overflow"))?;
        if data.get(e_lfanew..coff_offset) != Some(&PE_SIGNATURE[..]) {
            return Err(Error::malformed_container("missing PE signature"));
        }

        let number_of_sections = read_u16_le(data, coff_offset + 2)
            .ok_or_else(|| Error::malformed_container("truncated COFF header"))?
            as usize;
        let size_of_optional_header = read_u16_le(data, coff_offset + 16)
            .ok_or_else(|| Error::malformed_container("truncated COFF header"))?
            as usize;

        let optional_offset = coff_offset + COFF_HEADER_SIZE;
        let sections_offset = optional_offset + size_of_optional_header;
        if sections_offset > data.len() {
            return Err(Error::malformed_container("optional header out of bounds"));
        }

        let magic = read_u16_le(data, optional_offset)
            .ok_or_else(|| Error::malformed_container("missing optional header magic"))?;
        let (count_offset, directories_offset) = match magic {
            OPTIONAL_MAGIC_PE32 => (optional_offset + 92, optional_offset + 96),
            OPTIONAL_MAGIC_PE32_PLUS => (optional_offset + 108, optional_offset + 112),
            _ => {
                return Err(Error::malformed_container(
                    "unsupported optional header magic",
                ))
            }
        };

        let number_of_rva_and_sizes = read_u32_le(data, count_offset)
            .ok_or_else(|| Error::malformed_container("missing number_of_rva_and_sizes"))?;
        if number_of_rva_and_sizes <= IMAGE_DIRECTORY_ENTRY_RESOURCE {
            return Ok(None);
        }

        let entry_offset =
            directories_offset + IMAGE_DIRECTORY_ENTRY_RESOURCE as usize * DATA_DIRECTORY_SIZE;
        let resource_rva = read_u32_le(data, entry_offset)
            .ok_or_else(|| Error::malformed_container("missing resource table RVA"))?;
        let resource_size = read_u32_le(data, entry_offset + 4)
            .ok_or_else(|| Error::malformed_container("missing resource table size"))?;
        if resource_rva == 0 || resource_size == 0 {
            return Ok(None);
        }

        let table_len = number_of_sections * SECTION_HEADER_SIZE;
        let table = data
            .get(sections_offset..sections_offset + table_len)
            .ok_or_else(|| Error::malformed_container("section table out of bounds"))?;

        let sections = table
            .chunks_exact(SECTION_HEADER_SIZE)
            .map(|header| Section {
                virtual_size: read_u32_le(header, 8).unwrap_or(0),
                virtual_address: read_u32_le(header, 12).unwrap_or(0),
                raw_size: read_u32_le(header, 16).unwrap_or(0),
                raw_ptr: read_u32_le(header, 20).unwrap_or(0),
            })
            .collect();

        Ok(Some(Self {
            sections,
            resource_rva,
            resource_size,
        }))
    }

    /// The section table in file order
    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    /// Translates an RVA to a file offset using the first containing section
    pub fn rva_to_file_offset(&self, rva: u32) -> Option<usize> {
        self.sections.iter().find_map(|s| s.file_offset(rva))
    }

    /// Byte range of the resource directory inside `data`, clamped to the
    /// end of the buffer
    fn resource_directory_range(&self, data: &[u8]) -> Result<Range<usize>> {
        clamped_range(self, data, self.resource_rva, self.resource_size as usize)
    }
}

fn clamped_range(layout: &PeLayout, data: &[u8], rva: u32, size: usize) -> Result<Range<usize>> {
    let start = layout
        .rva_to_file_offset(rva)
        .ok_or(Error::UnmappedRva { rva })?;
    if start >= data.len() {
        return Err(Error::malformed_container("RVA maps past end of file"));
    }
    let end = start.saturating_add(size).min(data.len());
    Ok(start..end)
}

/// Second-level identifier of a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceName {
    /// Numeric identifier
    Id(u32),
    /// Named resource
    Name(String),
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceName::Id(id) => write!(f, "#{}", id),
            ResourceName::Name(name) => f.write_str(name),
        }
    }
}

/// A located resource and the file bytes it occupies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSpan {
    /// Resource type id
    pub type_id: u32,
    /// Second-level name or id
    pub name: ResourceName,
    /// Language id of the leaf entry
    pub language: u32,
    /// Code page recorded in the data entry
    pub code_page: u32,
    /// RVA of the resource data
    pub rva: u32,
    /// File byte range of the resource data
    pub range: Range<usize>,
}

#[derive(Debug, Clone, Copy)]
struct DirectoryEntry {
    name: u32,
    offset: u32,
}

impl DirectoryEntry {
    fn name_is_string(&self) -> bool {
        self.name & HIGH_BIT != 0
    }

    fn name_offset(&self) -> usize {
        (self.name & !HIGH_BIT) as usize
    }

    fn is_directory(&self) -> bool {
        self.offset & HIGH_BIT != 0
    }

    fn target(&self) -> usize {
        (self.offset & !HIGH_BIT) as usize
    }

    fn identifier(&self, rsrc: &[u8]) -> Result<ResourceName> {
        if !self.name_is_string() {
            return Ok(ResourceName::Id(self.name));
        }
        let offset = self.name_offset();
        let chars = read_u16_le(rsrc, offset)
            .ok_or_else(|| Error::malformed_container("resource name out of bounds"))?
            as usize;
        let units = rsrc
            .get(offset + 2..offset + 2 + chars * 2)
            .ok_or_else(|| Error::malformed_container("resource name out of bounds"))?;
        Ok(ResourceName::Name(String::from_utf16_lossy(
            &crate::bytes::utf16_units(units),
        )))
    }
}

/// Finds the `RT_VERSION` resource of a PE image
#[derive(Debug, Clone)]
pub struct ResourceLocator {
    max_directory_entries: usize,
    max_resource_size: usize,
}

impl Default for ResourceLocator {
    fn default() -> Self {
        Self::new(4096, 1024 * 1024)
    }
}

impl ResourceLocator {
    /// Creates a locator with explicit limits on directory fan-out and on
    /// the size of the resource it will hand back
    pub fn new(max_directory_entries: usize, max_resource_size: usize) -> Self {
        Self {
            max_directory_entries,
            max_resource_size,
        }
    }

    /// Locates the version-information resource.
    ///
    /// Malformed images and missing resources both yield `Ok(None)`; only
    /// errors that indicate a bug are propagated.
    pub fn locate(&self, data: &[u8]) -> Result<Option<ResourceSpan>> {
        match self.try_locate(data) {
            Ok(span) => Ok(span),
            Err(e) if e.is_recoverable() => {
                debug!("No usable resource directory: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn try_locate(&self, data: &[u8]) -> Result<Option<ResourceSpan>> {
        let Some(layout) = PeLayout::parse(data)? else {
            trace!("Image has no resource directory");
            return Ok(None);
        };

        let rsrc_range = layout.resource_directory_range(data)?;
        let rsrc = &data[rsrc_range];

        let Some(type_entry) = self
            .directory_entries(rsrc, 0)?
            .into_iter()
            .find(|e| !e.name_is_string() && e.name == RT_VERSION)
        else {
            trace!("No RT_VERSION entry in resource directory");
            return Ok(None);
        };
        if !type_entry.is_directory() {
            return Err(Error::malformed_container(
                "RT_VERSION entry is not a directory",
            ));
        }

        for name_entry in self.directory_entries(rsrc, type_entry.target())? {
            let name = name_entry.identifier(rsrc).unwrap_or_else(|e| {
                debug!("Unreadable RT_VERSION name: {}", e);
                ResourceName::Id(0)
            });

            if !name_entry.is_directory() {
                // A leaf directly under the type level: no language level.
                let leaf = name_entry.target();
                if let Some(span) = self.resolve(&layout, data, rsrc, leaf, name, 0)? {
                    return Ok(Some(span));
                }
                continue;
            }

            for lang_entry in self.directory_entries(rsrc, name_entry.target())? {
                if lang_entry.is_directory() {
                    trace!("Skipping directory nested below the language level");
                    continue;
                }
                let language = if lang_entry.name_is_string() {
                    0
                } else {
                    lang_entry.name
                };
                if let Some(span) = self.resolve(
                    &layout,
                    data,
                    rsrc,
                    lang_entry.target(),
                    name.clone(),
                    language,
                )? {
                    return Ok(Some(span));
                }
            }
        }

        Ok(None)
    }

    fn directory_entries(&self, rsrc: &[u8], offset: usize) -> Result<Vec<DirectoryEntry>> {
        let header_missing = || Error::malformed_container("resource directory header out of bounds");
        let named = read_u16_le(rsrc, offset + 12).ok_or_else(header_missing)?;
        let ids = read_u16_le(rsrc, offset + 14).ok_or_else(header_missing)?;
        let count = usize::from(named) + usize::from(ids);
        if count > self.max_directory_entries {
            return Err(Error::malformed_container(
                "resource directory has too many entries",
            ));
        }

        let entries_offset = offset + RESOURCE_DIRECTORY_HEADER_SIZE;
        let table = rsrc
            .get(entries_offset..entries_offset + count * RESOURCE_DIRECTORY_ENTRY_SIZE)
            .ok_or_else(|| Error::malformed_container("resource directory entry count overflow"))?;

        Ok(table
            .chunks_exact(RESOURCE_DIRECTORY_ENTRY_SIZE)
            .map(|raw| DirectoryEntry {
                name: read_u32_le(raw, 0).unwrap_or(0),
                offset: read_u32_le(raw, 4).unwrap_or(0),
            })
            .collect())
    }

    fn resolve(
        &self,
        layout: &PeLayout,
        data: &[u8],
        rsrc: &[u8],
        data_entry_offset: usize,
        name: ResourceName,
        language: u32,
    ) -> Result<Option<ResourceSpan>> {
        let entry = rsrc
            .get(data_entry_offset..data_entry_offset + RESOURCE_DATA_ENTRY_SIZE)
            .ok_or_else(|| Error::malformed_container("resource data entry out of bounds"))?;
        let rva = read_u32_le(entry, 0).unwrap_or(0);
        let size = read_u32_le(entry, 4).unwrap_or(0) as usize;
        let code_page = read_u32_le(entry, 8).unwrap_or(0);

        if size == 0 {
            trace!("Skipping empty RT_VERSION leaf {} (lang {})", name, language);
            return Ok(None);
        }
        if size > self.max_resource_size {
            return Err(Error::malformed_container(
                "version resource exceeds size limit",
            ));
        }

        let range = clamped_range(layout, data, rva, size)?;
        debug!(
            "Found RT_VERSION {} (lang {}) at {}..{} ({} bytes)",
            name,
            language,
            range.start,
            range.end,
            range.len()
        );

        Ok(Some(ResourceSpan {
            type_id: RT_VERSION,
            name,
            language,
            code_page,
            rva,
            range,
        }))
    }
}
