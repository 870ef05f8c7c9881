//! # verinfo-core
//!
//! A library for extracting the version-information strings embedded in
//! PE executables and libraries.
//!
//! This crate provides the core functionality for:
//! - Locating the `RT_VERSION` resource inside a PE image
//! - Decoding the nested `VS_VERSIONINFO` record format
//! - Flattening the `StringFileInfo` tables into an ordered string map
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`locator`]: PE header, section table and resource directory walking
//! - [`record`]: Iterative decoder for the nested record format
//! - [`table`]: String table assembly into a [`VersionInfoMap`]
//! - [`fixed`]: The binary `VS_FIXEDFILEINFO` value
//! - [`extract`]: The configured entry point tying the pieces together
//! - [`error`]: Error types and handling
//!
//! ## Example
//!
//! ```no_run
//! use verinfo_core::{ExtractorConfig, VersionInfoExtractor};
//! use std::fs;
//!
//! let data = fs::read("C:/Windows/System32/notepad.exe")?;
//!
//! let extractor = VersionInfoExtractor::with_config(ExtractorConfig::new().max_tables(4));
//! for (name, value) in extractor.extract(&data)?.iter() {
//!     println!("{}: {}", name, value);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Every parse works on a borrowed buffer and keeps no shared state, so
//! independent files may be processed from as many threads as desired.

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unreachable_pub)]

mod bytes;
pub mod error;
pub mod extract;
pub mod fixed;
pub mod locator;
pub mod record;
pub mod table;

#[cfg(test)]
mod testutil;

// Re-export primary types for convenience
pub use error::{Error, Result};
pub use extract::{
    extract_file, extract_file_with_config, ExtractorConfig, VersionInfo, VersionInfoExtractor,
};
pub use fixed::{FileVersion, FixedFileInfo};
pub use locator::{ResourceLocator, ResourceSpan, RT_VERSION};
pub use record::{RecordDecoder, ValueType, VersionRecord};
pub use table::{LangCodepage, StringTableAssembler, VersionInfoMap};

/// Crate version for programmatic access
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
