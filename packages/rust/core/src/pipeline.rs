//! End-to-end pipelines: catalog → references, CSV → dictionary, catalog → dictionary.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use blockctx_dictionary::Compiler;
use blockctx_extractor::{ExtractSummary, ReferenceStream, filter_by_folder};
use blockctx_shared::{
    BlockCtxError, CatalogConfig, CompileConfig, RawRecord, RecordError, ReferenceEntry, Result,
};

use crate::assembler::{WriteResult, write_dictionary};
use crate::tabular::{self, RawRow};

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called for each reference read from a catalog.
    fn reference_read(&self, name: &str, current: usize);
    /// Called when the pipeline completes.
    fn done(&self, summary: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn reference_read(&self, _name: &str, _current: usize) {}
    fn done(&self, _summary: &str) {}
}

// ---------------------------------------------------------------------------
// Extract
// ---------------------------------------------------------------------------

/// References pulled from one catalog.
#[derive(Debug, Clone)]
pub struct ExtractResult {
    pub entries: Vec<ReferenceEntry>,
    pub summary: ExtractSummary,
    pub elapsed: Duration,
}

/// Stream a catalog file into references, applying the configured folder filter.
///
/// The file handle is dropped on every exit path, including parse failure.
#[instrument(skip_all, fields(catalog = %path.display()))]
pub fn extract_catalog(
    path: &Path,
    config: &CatalogConfig,
    progress: &dyn ProgressReporter,
) -> Result<ExtractResult> {
    let start = Instant::now();
    progress.phase("Reading catalog");

    let file = File::open(path).map_err(|e| BlockCtxError::io(path, e))?;
    let mut entries = Vec::new();
    for entry in ReferenceStream::new(BufReader::new(file), config) {
        let entry = entry.map_err(|e| match e {
            BlockCtxError::SourceFormat { message } => {
                BlockCtxError::source_format(format!("{}: {message}", path.display()))
            }
            other => other,
        })?;
        progress.reference_read(&entry.ref_name, entries.len() + 1);
        entries.push(entry);
    }

    if let Some(needle) = config.folder_filter.as_deref().filter(|n| !n.is_empty()) {
        let before = entries.len();
        entries = filter_by_folder(entries, needle);
        info!(filter = needle, before, after = entries.len(), "applied folder filter");
    }

    let summary = ExtractSummary::from_entries(&entries);
    info!(
        library = %summary.library_name,
        total = summary.total,
        folders = summary.unique_folders,
        "catalog extracted"
    );

    Ok(ExtractResult {
        entries,
        summary,
        elapsed: start.elapsed(),
    })
}

// ---------------------------------------------------------------------------
// Compile
// ---------------------------------------------------------------------------

/// Where a dictionary is written and what produced it.
#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// Dictionary JSON path; the manifest is written beside it.
    pub path: PathBuf,
    /// Tool version string recorded in the manifest.
    pub tool_version: String,
}

/// Result of a dictionary-producing pipeline.
#[derive(Debug)]
pub struct CompileResult {
    pub written: WriteResult,
    pub compiled: usize,
    pub skipped_blank: usize,
    pub failures: Vec<RecordError>,
    pub elapsed: Duration,
}

/// Read dictionary-input CSV, compile it and persist the dictionary.
///
/// A missing column or unreadable header aborts before anything is written.
#[instrument(skip_all, fields(input = %input.display(), output = %output.path.display()))]
pub fn compile_dictionary(
    input: &Path,
    compile: &CompileConfig,
    output: &OutputConfig,
    progress: &dyn ProgressReporter,
) -> Result<CompileResult> {
    let start = Instant::now();

    progress.phase("Reading dictionary inputs");
    let rows = tabular::read_raw_records_path(input)?;

    let source = input.display().to_string();
    compile_and_write(rows, &source, compile, output, progress, start)
}

/// Extract a catalog and compile its references directly (no parameter lists).
///
/// When `references_csv` is set the extracted references are written there too.
#[instrument(skip_all, fields(catalog = %catalog.display(), output = %output.path.display()))]
pub fn build_dictionary(
    catalog: &Path,
    catalog_config: &CatalogConfig,
    compile: &CompileConfig,
    output: &OutputConfig,
    references_csv: Option<&Path>,
    progress: &dyn ProgressReporter,
) -> Result<CompileResult> {
    let start = Instant::now();
    let extracted = extract_catalog(catalog, catalog_config, progress)?;

    if let Some(csv_path) = references_csv {
        progress.phase("Writing references");
        write_references_csv(csv_path, &extracted.entries)?;
    }

    let rows: Vec<RawRow> = extracted
        .entries
        .iter()
        .map(|entry| Ok(RawRecord::from(entry)))
        .collect();

    let source = catalog.display().to_string();
    compile_and_write(rows, &source, compile, output, progress, start)
}

fn compile_and_write(
    rows: Vec<RawRow>,
    source: &str,
    compile: &CompileConfig,
    output: &OutputConfig,
    progress: &dyn ProgressReporter,
    start: Instant,
) -> Result<CompileResult> {
    progress.phase("Compiling dictionary");
    let report = Compiler::new(compile).compile(rows);

    progress.phase("Writing dictionary");
    let written = write_dictionary(
        &output.path,
        &report.dictionary,
        Some(source),
        &output.tool_version,
    )?;

    let result = CompileResult {
        compiled: report.dictionary.len(),
        skipped_blank: report.skipped_blank,
        failures: report.failures,
        written,
        elapsed: start.elapsed(),
    };

    progress.done(&format!(
        "{} entries → {}",
        result.compiled,
        result.written.path.display()
    ));
    Ok(result)
}

/// Write references as CSV or, for a `.json` path, as indented JSON.
pub fn write_references(path: &Path, entries: &[ReferenceEntry]) -> Result<()> {
    if path.extension().is_some_and(|ext| ext == "json") {
        crate::assembler::write_json(path, entries)
    } else {
        write_references_csv(path, entries)
    }
}

fn write_references_csv(path: &Path, entries: &[ReferenceEntry]) -> Result<()> {
    let mut buf = Vec::new();
    tabular::write_references_csv(&mut buf, entries)?;
    crate::assembler::write_atomic(path, &buf)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
