//! Configured entry point chaining locator, decoder and assembler.

use crate::error::{Error, Result};
use crate::fixed::FixedFileInfo;
use crate::locator::{ResourceLocator, ResourceSpan};
use crate::record::RecordDecoder;
use crate::table::{LangCodepage, StringTableAssembler, VersionInfoMap, VS_VERSION_INFO};
use std::path::Path;
use tracing::{debug, trace};

/// Limits applied while extracting version information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractorConfig {
    /// Largest version resource that will be decoded, in bytes
    pub max_resource_size: usize,
    /// Largest number of entries accepted in one resource directory
    pub max_directory_entries: usize,
    /// Deepest record nesting that is decoded
    pub max_depth: usize,
    /// Largest number of string tables visited
    pub max_tables: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_resource_size: 1024 * 1024, // 1 MB
            max_directory_entries: 4096,
            max_depth: 16,
            max_tables: 64,
        }
    }
}

impl ExtractorConfig {
    /// Creates a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the largest version resource that will be decoded
    pub fn max_resource_size(mut self, size: usize) -> Self {
        self.max_resource_size = size;
        self
    }

    /// Sets the largest number of entries per resource directory
    pub fn max_directory_entries(mut self, count: usize) -> Self {
        self.max_directory_entries = count;
        self
    }

    /// Sets the deepest record nesting that is decoded
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Sets the largest number of string tables visited
    pub fn max_tables(mut self, count: usize) -> Self {
        self.max_tables = count;
        self
    }
}

/// Everything extracted from one version block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    /// Flattened string tables
    pub strings: VersionInfoMap,
    /// Binary fixed file info, if present and valid
    pub fixed: Option<FixedFileInfo>,
    /// Languages listed under `VarFileInfo`
    pub translations: Vec<LangCodepage>,
}

/// Extracts version information from PE images
#[derive(Debug, Clone)]
pub struct VersionInfoExtractor {
    config: ExtractorConfig,
    locator: ResourceLocator,
    decoder: RecordDecoder,
    assembler: StringTableAssembler,
}

impl Default for VersionInfoExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionInfoExtractor {
    /// Creates a new extractor with default configuration
    pub fn new() -> Self {
        Self::with_config(ExtractorConfig::default())
    }

    /// Creates a new extractor with custom configuration
    pub fn with_config(config: ExtractorConfig) -> Self {
        Self {
            locator: ResourceLocator::new(config.max_directory_entries, config.max_resource_size),
            decoder: RecordDecoder::new(config.max_depth),
            assembler: StringTableAssembler::new(config.max_tables),
            config,
        }
    }

    /// The configuration this extractor was built with
    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Locates the version resource without decoding it
    pub fn locate(&self, image: &[u8]) -> Result<Option<ResourceSpan>> {
        self.locator.locate(image)
    }

    /// Extracts the string fields of a PE image
    pub fn extract(&self, image: &[u8]) -> Result<VersionInfoMap> {
        Ok(self.extract_info(image)?.strings)
    }

    /// Extracts strings, fixed file info and translations of a PE image
    pub fn extract_info(&self, image: &[u8]) -> Result<VersionInfo> {
        let Some(span) = self.locator.locate(image)? else {
            debug!("No version resource in {} byte image", image.len());
            return Ok(VersionInfo::default());
        };
        let block = image
            .get(span.range.clone())
            .ok_or_else(|| Error::internal("located resource lies outside the image"))?;
        self.decode_block(block)
    }

    /// Decodes a raw `VS_VERSION_INFO` block, e.g. one already extracted
    /// by a resource tool
    pub fn decode_block(&self, block: &[u8]) -> Result<VersionInfo> {
        let Some(root) = self.decoder.decode(block)? else {
            debug!("Version block of {} bytes has no readable root", block.len());
            return Ok(VersionInfo::default());
        };
        if !root.key_is(VS_VERSION_INFO) {
            debug!("Version block root is not {}", VS_VERSION_INFO);
            return Ok(VersionInfo::default());
        }

        let info = VersionInfo {
            strings: self.assembler.assemble(&root)?,
            fixed: FixedFileInfo::from_record(&root),
            translations: self.assembler.translations(&root),
        };
        trace!(
            "Decoded {} string fields, {} translations",
            info.strings.len(),
            info.translations.len()
        );
        Ok(info)
    }
}

/// Extract the string fields of a PE file
///
/// This is a convenience function that reads the file and extracts from it.
pub fn extract_file(path: impl AsRef<Path>) -> Result<VersionInfoMap> {
    extract_file_with_config(path, ExtractorConfig::default())
}

/// Extract the string fields of a PE file with custom configuration
pub fn extract_file_with_config(
    path: impl AsRef<Path>,
    config: ExtractorConfig,
) -> Result<VersionInfoMap> {
    let path = path.as_ref();
    let data = std::fs::read(path).map_err(|e| Error::file_read(path, e))?;
    VersionInfoExtractor::with_config(config).extract(&data)
}
