//! Error types for the verinfo-core library.
//!
//! Every failure inside a single container degrades to "less data": the
//! locator, decoder and assembler swallow the variants for which
//! [`Error::is_recoverable`] holds and propagate everything else.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for verinfo operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for all verinfo operations
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Failed to read input file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        /// Path to the file that failed to read
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// PE headers or the resource directory are structurally invalid
    #[error("malformed container: {message}")]
    MalformedContainer {
        /// What was wrong
        message: &'static str,
    },

    /// An RVA did not fall inside any section
    #[error("failed to map RVA 0x{rva:08x} to a file offset")]
    UnmappedRva {
        /// The unmapped relative virtual address
        rva: u32,
    },

    /// A version record's declared layout does not fit the available bytes
    #[error("malformed version record at offset {offset}: {details}")]
    MalformedRecord {
        /// Offset of the record inside the version block
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// A UTF-16 string could not be decoded
    #[error("invalid UTF-16 string at offset {offset}: {details}")]
    Encoding {
        /// Offset of the owning record inside the version block
        offset: usize,
        /// Detailed description of the issue
        details: String,
    },

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new file read error
    pub fn file_read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileRead {
            path: path.into(),
            source,
        }
    }

    /// Creates a new malformed container error
    pub fn malformed_container(message: &'static str) -> Self {
        Self::MalformedContainer { message }
    }

    /// Creates a new malformed record error
    pub fn malformed_record(offset: usize, details: impl Into<String>) -> Self {
        Self::MalformedRecord {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new encoding error
    pub fn encoding(offset: usize, details: impl Into<String>) -> Self {
        Self::Encoding {
            offset,
            details: details.into(),
        }
    }

    /// Creates a new internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns true if this error only costs the data it describes and
    /// parsing of the surrounding structure may continue
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::MalformedContainer { .. }
                | Self::UnmappedRva { .. }
                | Self::MalformedRecord { .. }
                | Self::Encoding { .. }
        )
    }
}
