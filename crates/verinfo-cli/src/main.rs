//! verinfo - Dump version-information strings from PE binaries
//!
//! This tool reads the `RT_VERSION` resource of executables and libraries
//! and reports their string fields (CompanyName, FileDescription, ...) as
//! a CSV table or a plain listing.

mod report;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, ValueEnum};
use rayon::prelude::*;
use report::{Report, Row};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn, Level};
use tracing_subscriber::EnvFilter;
use verinfo_core::{ExtractorConfig, VersionInfoExtractor};
use walkdir::WalkDir;

/// Dump version-information strings from PE binaries
#[derive(Parser, Debug)]
#[command(name = "verinfo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(flatten)]
    input: InputMode,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// File extensions to process in directory mode
    #[arg(long, value_delimiter = ',', default_value = "exe,dll")]
    extensions: Vec<String>,

    /// Add the binary file and product versions as extra columns
    #[arg(long)]
    fixed: bool,

    /// Worker threads for directory mode (0 = one per CPU)
    #[arg(short, long, default_value = "0")]
    jobs: usize,

    /// Largest version resource to decode, in bytes
    #[arg(long, default_value = "1048576")]
    max_resource_size: usize,

    /// Largest number of string tables to read per file
    #[arg(long, default_value = "64")]
    max_tables: usize,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct InputMode {
    /// Path to a single binary file
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Path to a directory of binaries to process
    #[arg(short, long)]
    directory: Option<PathBuf>,
}

/// Output format for the report
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Comma-separated values, one row per file
    Csv,
    /// Indented `name: value` listing
    List,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let extractor = VersionInfoExtractor::with_config(
        ExtractorConfig::new()
            .max_resource_size(cli.max_resource_size)
            .max_tables(cli.max_tables),
    );
    debug!("Extractor limits: {:?}", extractor.config());

    // Dispatch based on input mode
    let report = if let Some(ref file) = cli.input.file {
        process_single_file(&cli, &extractor, file)?
    } else if let Some(ref directory) = cli.input.directory {
        process_directory(&cli, &extractor, directory)?
    } else {
        bail!("Either --file or --directory must be specified")
    };

    write_report(&cli, &report)
}

/// Process a single binary file
fn process_single_file(cli: &Cli, extractor: &VersionInfoExtractor, file: &Path) -> Result<Report> {
    if !file.exists() {
        bail!("Input file does not exist: {}", file.display());
    }
    if !file.is_file() {
        bail!("Input path is not a file: {}", file.display());
    }

    let mut report = Report::new();
    report.push(process_binary(cli, extractor, file)?);
    Ok(report)
}

/// Process every matching binary in a directory
fn process_directory(
    cli: &Cli,
    extractor: &VersionInfoExtractor,
    directory: &Path,
) -> Result<Report> {
    if !directory.exists() {
        bail!("Directory does not exist: {}", directory.display());
    }
    if !directory.is_dir() {
        bail!("Path is not a directory: {}", directory.display());
    }

    info!("Scanning directory: {}", directory.display());
    let files = collect_binaries(directory, cli.recursive, &cli.extensions);
    debug!("Found {} candidate binaries", files.len());

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(cli.jobs)
        .build()
        .context("Failed to build worker pool")?;

    // par_iter keeps input order when collecting.
    let results: Vec<(PathBuf, Result<Row>)> = pool.install(|| {
        files
            .par_iter()
            .map(|path| (path.clone(), process_binary(cli, extractor, path)))
            .collect()
    });

    let mut report = Report::new();
    for (path, result) in results {
        match result {
            Ok(row) => {
                info!("Parsed: {}", path.display());
                report.push(row);
            }
            // Log error but continue with other files
            Err(e) => warn!("Error processing {}: {:#}", path.display(), e),
        }
    }

    info!("Processed {} of {} binaries", report.len(), files.len());
    Ok(report)
}

/// Lists files below `directory` whose extension is in `extensions`,
/// sorted by path
fn collect_binaries(directory: &Path, recursive: bool, extensions: &[String]) -> Vec<PathBuf> {
    let mut walker = WalkDir::new(directory).follow_links(false).min_depth(1);
    if !recursive {
        walker = walker.max_depth(1);
    }

    let mut files: Vec<PathBuf> = walker
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            let matched = has_extension(path, extensions);
            if !matched {
                trace!("Skipping {}", path.display());
            }
            matched
        })
        .collect();
    files.sort();
    files
}

/// Case-insensitive extension match
fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
        })
        .unwrap_or(false)
}

/// Extract the version information of a single binary
fn process_binary(cli: &Cli, extractor: &VersionInfoExtractor, path: &Path) -> Result<Row> {
    trace!("Reading {}", path.display());
    let data =
        fs::read(path).with_context(|| format!("Failed to read input file: {}", path.display()))?;

    let info = extractor
        .extract_info(&data)
        .with_context(|| format!("Failed to extract version info: {}", path.display()))?;

    if info.strings.is_empty() {
        debug!("No version strings in {}", path.display());
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(Row::from_info(file_name, info, cli.fixed))
}

/// Write the report to the requested destination
fn write_report(cli: &Cli, report: &Report) -> Result<()> {
    let mut out: Box<dyn Write> = match &cli.output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
            }
            let file = fs::File::create(path)
                .with_context(|| format!("Failed to create file: {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };

    let written = match cli.format {
        OutputFormat::Csv => report.write_csv(&mut out),
        OutputFormat::List => report.write_list(&mut out),
    };
    written.context("Failed to write report")?;

    if let Some(path) = &cli.output {
        info!("Wrote {} rows to {}", report.len(), path.display());
    }
    Ok(())
}
