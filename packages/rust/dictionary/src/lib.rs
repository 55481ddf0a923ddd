//! Dictionary compiler.
//!
//! Normalizes raw block records into searchable [`DictionaryEntry`] values:
//! 1. Parse the raw parameter cell into parameter names
//! 2. Build a human-readable `concept` from the block name and parameters
//! 3. Derive keywords from the name tokens and parameter names
//! 4. Assemble the snippet (`library_link`, `xml_tag`, `id`, `required_params`)
//!
//! A bad record is logged and skipped; it never aborts the run.

mod params;

use tracing::{debug, info, instrument, warn};

use blockctx_shared::{
    CompileConfig, Dictionary, DictionaryEntry, RawRecord, RecordError, Snippet,
};

pub use params::parse_params;

/// Outcome of a compilation run.
#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    /// Entries that compiled, in input order.
    pub dictionary: Dictionary,
    /// Records skipped because their reference name was blank.
    pub skipped_blank: usize,
    /// Records that failed before they could be compiled.
    pub failures: Vec<RecordError>,
}

/// Turns raw records into dictionary entries.
#[derive(Debug, Clone)]
pub struct Compiler {
    separator: char,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(&CompileConfig::default())
    }
}

impl Compiler {
    pub fn new(config: &CompileConfig) -> Self {
        Self {
            separator: config.separator,
        }
    }

    /// Compile a batch of records, isolating per-row failures.
    ///
    /// Rows arrive as `Result`s so that read errors from the tabular source
    /// (wrong field count, bad encoding) are reported per row instead of
    /// failing the whole batch.
    #[instrument(skip_all)]
    pub fn compile<I>(&self, records: I) -> CompileReport
    where
        I: IntoIterator<Item = Result<RawRecord, RecordError>>,
    {
        let mut entries = Vec::new();
        let mut skipped_blank = 0;
        let mut failures = Vec::new();

        for (row, record) in records.into_iter().enumerate() {
            match record {
                Ok(record) => match self.compile_record(&record) {
                    Some(entry) => entries.push(entry),
                    None => {
                        debug!(row, "skipping record with blank reference name");
                        skipped_blank += 1;
                    }
                },
                Err(e) => {
                    warn!(row = e.row, name = ?e.name, error = %e.message, "skipping record");
                    failures.push(e);
                }
            }
        }

        info!(
            compiled = entries.len(),
            skipped_blank,
            failed = failures.len(),
            "dictionary compiled"
        );

        CompileReport {
            dictionary: Dictionary::new(entries),
            skipped_blank,
            failures,
        }
    }

    /// Compile one record. Returns `None` when the reference name is blank.
    pub fn compile_record(&self, record: &RawRecord) -> Option<DictionaryEntry> {
        let ref_name = record.ref_name.trim();
        // `nan` is what spreadsheet exports write for an empty cell.
        if ref_name.is_empty() || ref_name.eq_ignore_ascii_case("nan") {
            return None;
        }

        let library_name = record.library_name.trim();
        let required_params = parse_params(record.params.as_deref());

        Some(DictionaryEntry {
            keywords: keywords(ref_name, &required_params, self.separator),
            json_snippet: Snippet {
                concept: concept(ref_name, &required_params, self.separator),
                library_link: format!("{library_name}.{ref_name}"),
                xml_tag: record.ref_type.trim().to_string(),
                id: record.ref_id.trim().to_string(),
                required_params,
            },
        })
    }
}

/// Compile records that are already known to be well-formed.
pub fn compile(records: &[RawRecord], config: &CompileConfig) -> Dictionary {
    Compiler::new(config)
        .compile(records.iter().cloned().map(Ok))
        .dictionary
}

/// Title-case a block name: separators become spaces, each word is capitalized.
///
/// Letters following a non-letter start a new word, so `ABS_2ND` becomes `Abs 2Nd`.
pub fn humanize(name: &str, separator: char) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_word = false;

    for c in name.chars() {
        let c = if c == separator { ' ' } else { c };
        if c.is_alphabetic() {
            if in_word {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }

    out
}

/// `Set Check Batt On (Requires: Value)`, or just the humanized name without parameters.
pub fn concept(name: &str, params: &[String], separator: char) -> String {
    let readable = humanize(name, separator);
    if params.is_empty() {
        readable
    } else {
        format!("{readable} (Requires: {})", params.join(", "))
    }
}

/// Name tokens followed by parameter names, empties dropped, first occurrence kept.
pub fn keywords(name: &str, params: &[String], separator: char) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let tokens = name
        .split(separator)
        .chain(params.iter().map(String::as_str));

    for token in tokens {
        if !token.is_empty() && !out.iter().any(|k| k == token) {
            out.push(token.to_string());
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
