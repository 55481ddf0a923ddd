//! Tabular (CSV) sources and sinks.
//!
//! - dictionary inputs: `library_name, ref_type, ref_name, ref_id, data-objects`
//! - extracted references: `library_name, folder_path, ref_type, ref_name, ref_id, href`
//! - test cases: `Test Case Title, Pre-Action, Test Steps.Action, Post Condition`
//!
//! Headers are matched after trimming. A missing required column fails the
//! whole source; a bad row becomes a [`RecordError`] and the rest still load.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use tracing::{debug, warn};

use blockctx_shared::{BlockCtxError, RawRecord, RecordError, ReferenceEntry, Result};

pub const COL_LIBRARY_NAME: &str = "library_name";
pub const COL_REF_TYPE: &str = "ref_type";
pub const COL_REF_NAME: &str = "ref_name";
pub const COL_REF_ID: &str = "ref_id";
pub const COL_PARAMS: &str = "data-objects";

pub const COL_TITLE: &str = "Test Case Title";
pub const COL_PRE_ACTION: &str = "Pre-Action";
pub const COL_STEPS: &str = "Test Steps.Action";
pub const COL_POST_CONDITION: &str = "Post Condition";

/// Resolved positions of named columns in a header row.
struct Columns {
    headers: Vec<String>,
}

impl Columns {
    fn new(headers: &StringRecord) -> Self {
        Self {
            headers: headers.iter().map(|h| h.trim().to_string()).collect(),
        }
    }

    fn find(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    fn require(&self, name: &str) -> Result<usize> {
        self.find(name).ok_or_else(|| {
            BlockCtxError::source_format(format!(
                "missing required column `{name}` (found: {})",
                self.headers.join(", ")
            ))
        })
    }
}

/// One dictionary-input row, or why it could not be read.
pub type RawRow = std::result::Result<RawRecord, RecordError>;

fn cell(record: &StringRecord, idx: usize) -> String {
    record.get(idx).map(str::trim).unwrap_or_default().to_string()
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| BlockCtxError::io(path, e))
}

// ---------------------------------------------------------------------------
// Dictionary inputs
// ---------------------------------------------------------------------------

/// Read dictionary-input rows.
///
/// `data-objects` may be absent, in which case every record has no parameters.
/// Row numbers in errors are 1-based and exclude the header.
pub fn read_raw_records<R: Read>(source: R) -> Result<Vec<RawRow>> {
    let mut reader = ReaderBuilder::new().from_reader(source);
    let headers = reader
        .headers()
        .map_err(|e| BlockCtxError::source_format(format!("unreadable header row: {e}")))?;
    let columns = Columns::new(headers);

    let library = columns.require(COL_LIBRARY_NAME)?;
    let ref_type = columns.require(COL_REF_TYPE)?;
    let ref_name = columns.require(COL_REF_NAME)?;
    let ref_id = columns.require(COL_REF_ID)?;
    let params = columns.find(COL_PARAMS);
    if params.is_none() {
        debug!("no `{COL_PARAMS}` column, records will have no parameters");
    }

    let rows = reader
        .byte_records()
        .enumerate()
        .map(|(idx, record)| -> RawRow {
            let row = idx + 1;
            let record = record.map_err(|e| RecordError::new(row, e.to_string()))?;
            let record = StringRecord::from_byte_record(record).map_err(|e| {
                let err = RecordError::new(row, format!("invalid UTF-8: {}", e.utf8_error()));
                match e.into_byte_record().get(ref_name) {
                    Some(name) => err.with_name(String::from_utf8_lossy(name).trim()),
                    None => err,
                }
            })?;
            Ok(RawRecord {
                library_name: cell(&record, library),
                ref_type: cell(&record, ref_type),
                ref_name: cell(&record, ref_name),
                ref_id: cell(&record, ref_id),
                params: params
                    .map(|idx| cell(&record, idx))
                    .filter(|raw| !raw.is_empty()),
            })
        })
        .collect();

    Ok(rows)
}

pub fn read_raw_records_path(path: &Path) -> Result<Vec<RawRow>> {
    read_raw_records(open(path)?).map_err(|e| match e {
        BlockCtxError::SourceFormat { message } => {
            BlockCtxError::source_format(format!("{}: {message}", path.display()))
        }
        other => other,
    })
}

// ---------------------------------------------------------------------------
// Extracted references
// ---------------------------------------------------------------------------

/// Write references as CSV with a header row.
pub fn write_references_csv<W: Write>(sink: W, entries: &[ReferenceEntry]) -> Result<()> {
    let mut writer = WriterBuilder::new().from_writer(sink);
    for entry in entries {
        writer
            .serialize(entry)
            .map_err(|e| BlockCtxError::Serialization(e.to_string()))?;
    }
    writer
        .flush()
        .map_err(|e| BlockCtxError::Serialization(e.to_string()))
}

/// Read references previously written by [`write_references_csv`].
pub fn read_references_csv<R: Read>(source: R) -> Result<Vec<ReferenceEntry>> {
    let mut reader = ReaderBuilder::new().from_reader(source);
    reader
        .deserialize::<ReferenceEntry>()
        .enumerate()
        .map(|(idx, row)| {
            row.map(|mut entry| {
                entry.href = entry.href.filter(|h| !h.is_empty());
                entry
            })
            .map_err(|e| BlockCtxError::source_format(format!("row {}: {e}", idx + 1)))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Test cases
// ---------------------------------------------------------------------------

/// One manual test case, cells trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCaseRow {
    pub title: String,
    pub pre_action: String,
    pub steps: String,
    pub post_condition: String,
}

impl TestCaseRow {
    /// The natural-language request built from the three step cells.
    pub fn english_prompt(&self) -> String {
        format!(
            "Pre-Action:\n{}\n\nTest Steps:\n{}\n\nPost Condition:\n{}",
            self.pre_action, self.steps, self.post_condition
        )
    }
}

/// Read test-case rows. Unreadable rows are logged and skipped.
pub fn read_test_cases<R: Read>(source: R) -> Result<Vec<TestCaseRow>> {
    let mut reader = ReaderBuilder::new().flexible(true).from_reader(source);
    let headers = reader
        .headers()
        .map_err(|e| BlockCtxError::source_format(format!("unreadable header row: {e}")))?;
    let columns = Columns::new(headers);

    let title = columns.require(COL_TITLE)?;
    let pre = columns.require(COL_PRE_ACTION)?;
    let steps = columns.require(COL_STEPS)?;
    let post = columns.require(COL_POST_CONDITION)?;

    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        match record {
            Ok(record) => rows.push(TestCaseRow {
                title: cell(&record, title),
                pre_action: cell(&record, pre),
                steps: cell(&record, steps),
                post_condition: cell(&record, post),
            }),
            Err(e) => warn!(row = idx + 1, error = %e, "skipping unreadable test case row"),
        }
    }
    Ok(rows)
}

pub fn read_test_cases_path(path: &Path) -> Result<Vec<TestCaseRow>> {
    read_test_cases(open(path)?)
}
