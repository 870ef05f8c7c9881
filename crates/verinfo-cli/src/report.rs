//! Batch report assembly and CSV/list rendering.

use std::collections::BTreeSet;
use std::io::{self, Write};
use verinfo_core::VersionInfo;

/// Name of the leading column holding the file's base name
pub(crate) const FILE_NAME: &str = "FileName";
pub(crate) const FIXED_FILE_VERSION: &str = "FixedFileVersion";
pub(crate) const FIXED_PRODUCT_VERSION: &str = "FixedProductVersion";

/// One processed file
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Row {
    pub(crate) file_name: String,
    pub(crate) fields: Vec<(String, String)>,
}

impl Row {
    /// Builds a row from extracted version info, optionally appending the
    /// binary file and product versions
    pub(crate) fn from_info(file_name: impl Into<String>, info: VersionInfo, fixed: bool) -> Self {
        let mut fields: Vec<(String, String)> = info.strings.into_iter().collect();
        if fixed {
            if let Some(fixed) = info.fixed {
                fields.push((FIXED_FILE_VERSION.to_string(), fixed.file_version.to_string()));
                fields.push((
                    FIXED_PRODUCT_VERSION.to_string(),
                    fixed.product_version.to_string(),
                ));
            }
        }
        Self {
            file_name: file_name.into(),
            fields,
        }
    }

    fn get(&self, column: &str) -> Option<&str> {
        if column == FILE_NAME {
            return Some(&self.file_name);
        }
        self.fields
            .iter()
            .find(|(k, _)| k == column)
            .map(|(_, v)| v.as_str())
    }
}

/// Rows of a batch run
#[derive(Debug, Default)]
pub(crate) struct Report {
    rows: Vec<Row>,
}

impl Report {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    pub(crate) fn len(&self) -> usize {
        self.rows.len()
    }

    /// `FileName` followed by the sorted union of all field names
    pub(crate) fn columns(&self) -> Vec<String> {
        let names: BTreeSet<&str> = self
            .rows
            .iter()
            .flat_map(|row| row.fields.iter().map(|(k, _)| k.as_str()))
            .filter(|name| *name != FILE_NAME)
            .collect();

        std::iter::once(FILE_NAME)
            .chain(names)
            .map(str::to_string)
            .collect()
    }

    /// Writes the report as CSV with a header line
    pub(crate) fn write_csv<W: Write>(&self, out: &mut W) -> io::Result<()> {
        let columns = self.columns();
        write_csv_line(out, columns.iter().map(String::as_str))?;
        for row in &self.rows {
            write_csv_line(out, columns.iter().map(|c| row.get(c).unwrap_or("")))?;
        }
        out.flush()
    }

    /// Writes one `name: value` block per file
    pub(crate) fn write_list<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (i, row) in self.rows.iter().enumerate() {
            if i > 0 {
                writeln!(out)?;
            }
            writeln!(out, "{}", row.file_name)?;
            if row.fields.is_empty() {
                writeln!(out, "  (no version information)")?;
            }
            for (name, value) in &row.fields {
                writeln!(out, "  {}: {}", name, value)?;
            }
        }
        out.flush()
    }
}

fn write_csv_line<'a, W: Write>(
    out: &mut W,
    fields: impl Iterator<Item = &'a str>,
) -> io::Result<()> {
    for (i, field) in fields.enumerate() {
        if i > 0 {
            out.write_all(b",")?;
        }
        out.write_all(escape_csv(field).as_bytes())?;
    }
    out.write_all(b"\r\n")
}

/// Quotes a field if it contains a separator, quote or line break
fn escape_csv(field: &str) -> std::borrow::Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\"")).into()
    } else {
        field.into()
    }
}
