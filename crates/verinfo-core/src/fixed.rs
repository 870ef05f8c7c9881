//! The binary `VS_FIXEDFILEINFO` value of the root record.

use crate::bytes::read_u32_le;
use crate::record::VersionRecord;
use std::fmt;

/// Signature that opens every `VS_FIXEDFILEINFO`
pub const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;

/// Encoded size of `VS_FIXEDFILEINFO`
pub const FIXED_FILE_INFO_SIZE: usize = 52;

/// A four-part `major.minor.build.revision` version number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct FileVersion {
    /// High word of the most significant dword
    pub major: u16,
    /// Low word of the most significant dword
    pub minor: u16,
    /// High word of the least significant dword
    pub build: u16,
    /// Low word of the least significant dword
    pub revision: u16,
}

impl FileVersion {
    /// Builds a version from its `*_MS` / `*_LS` dword pair
    pub fn from_dwords(ms: u32, ls: u32) -> Self {
        Self {
            major: (ms >> 16) as u16,
            minor: ms as u16,
            build: (ls >> 16) as u16,
            revision: ls as u16,
        }
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Decoded `VS_FIXEDFILEINFO`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedFileInfo {
    /// Structure version (`dwStrucVersion`)
    pub struct_version: u32,
    /// Binary file version
    pub file_version: FileVersion,
    /// Binary product version
    pub product_version: FileVersion,
    /// Bits of `file_flags` that are valid
    pub file_flags_mask: u32,
    /// `VS_FF_*` flags
    pub file_flags: u32,
    /// Target operating system (`VOS_*`)
    pub file_os: u32,
    /// File type (`VFT_*`)
    pub file_type: u32,
    /// File subtype (`VFT2_*`)
    pub file_subtype: u32,
    /// 64-bit creation date, usually zero
    pub file_date: u64,
}

impl FixedFileInfo {
    /// Parses the structure from the start of `value`.
    ///
    /// Returns `None` if the value is short or the signature is wrong.
    pub fn parse(value: &[u8]) -> Option<Self> {
        if value.len() < FIXED_FILE_INFO_SIZE {
            return None;
        }
        let dword = |index: usize| read_u32_le(value, index * 4);
        if dword(0)? != FIXED_FILE_INFO_SIGNATURE {
            return None;
        }

        Some(Self {
            struct_version: dword(1)?,
            file_version: FileVersion::from_dwords(dword(2)?, dword(3)?),
            product_version: FileVersion::from_dwords(dword(4)?, dword(5)?),
            file_flags_mask: dword(6)?,
            file_flags: dword(7)?,
            file_os: dword(8)?,
            file_type: dword(9)?,
            file_subtype: dword(10)?,
            file_date: (u64::from(dword(11)?) << 32) | u64::from(dword(12)?),
        })
    }

    /// Parses the value of a `VS_VERSION_INFO` root record
    pub fn from_record(root: &VersionRecord<'_>) -> Option<Self> {
        root.value.and_then(Self::parse)
    }
}
