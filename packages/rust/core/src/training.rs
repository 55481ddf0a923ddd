//! Fine-tuning data: pairs a test-case request with its hand-built target.
//!
//! For each titled test case:
//! 1. Find the target file whose name starts with the title (`.blkx` preferred)
//! 2. Cut out the `StepsAndEvaluation` operation slot, or keep the whole file
//! 3. Select context with the same retriever used at inference time
//! 4. Render the prompt and emit `{instruction, input, output}`

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use blockctx_retrieval::ContextRetriever;
use blockctx_shared::{BlockCtxError, Dictionary, Result};

use crate::prompt::PromptTemplate;
use crate::tabular::TestCaseRow;

pub const INSTRUCTION: &str = "Convert English Test Steps to dSPACE XML.";

const PREFERRED_EXTENSION: &str = "blkx";

static STEPS_SLOT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)(<FrameworkBuilder\.ActualOperationSlot name="StepsAndEvaluation".*?</FrameworkBuilder\.ActualOperationSlot>)"#,
    )
    .expect("valid regex")
});

/// One JSONL line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub instruction: String,
    pub input: String,
    pub output: String,
}

/// Outcome of a training-data build.
#[derive(Debug, Clone, Default)]
pub struct TrainingReport {
    pub examples: Vec<TrainingExample>,
    /// Rows skipped for having no title.
    pub untitled: usize,
    /// Titles with no matching target file.
    pub missing_targets: Vec<String>,
}

/// The `StepsAndEvaluation` slot of a target document, or the whole text.
pub fn extract_steps_slot(xml: &str) -> &str {
    STEPS_SLOT
        .captures(xml)
        .and_then(|c| c.get(1))
        .map_or(xml, |m| m.as_str())
}

/// Find the file in `folder` whose name starts with `title`.
///
/// Candidates are sorted by name; a `.blkx` file wins over other extensions.
pub fn find_target_file(title: &str, folder: &Path) -> Result<Option<PathBuf>> {
    let entries = std::fs::read_dir(folder).map_err(|e| BlockCtxError::io(folder, e))?;

    let mut matches: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(title))
        })
        .collect();
    matches.sort();

    if matches.len() > 1 {
        debug!(title, candidates = matches.len(), "several target files match");
    }

    let preferred = matches
        .iter()
        .position(|p| p.extension().is_some_and(|ext| ext == PREFERRED_EXTENSION));
    Ok(match preferred {
        Some(idx) => Some(matches.swap_remove(idx)),
        None => matches.into_iter().next(),
    })
}

/// Read a target file, replacing invalid UTF-8 rather than failing.
fn read_target(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).map_err(|e| BlockCtxError::io(path, e))?;
    Ok(String::from_utf8(bytes)
        .unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned()))
}

/// Builds training examples from test cases and a folder of targets.
pub struct TrainingBuilder<'a> {
    pub dictionary: &'a Dictionary,
    pub retriever: &'a ContextRetriever,
    pub template: &'a PromptTemplate,
    pub targets_dir: &'a Path,
}

impl TrainingBuilder<'_> {
    #[instrument(skip_all, fields(rows = rows.len(), targets = %self.targets_dir.display()))]
    pub fn build(&self, rows: &[TestCaseRow]) -> Result<TrainingReport> {
        let mut report = TrainingReport::default();

        for row in rows {
            if row.title.is_empty() {
                report.untitled += 1;
                continue;
            }

            let Some(target) = find_target_file(&row.title, self.targets_dir)? else {
                warn!(title = %row.title, "no target file found");
                report.missing_targets.push(row.title.clone());
                continue;
            };

            let xml = read_target(&target)?;
            let english = row.english_prompt();
            let context = self
                .retriever
                .select_context(self.dictionary, &english, None);
            let input = self.template.render(&context, &english)?;

            debug!(
                title = %row.title,
                target = %target.display(),
                context = context.len(),
                "built training example"
            );

            report.examples.push(TrainingExample {
                instruction: INSTRUCTION.to_string(),
                input,
                output: extract_steps_slot(&xml).to_string(),
            });
        }

        info!(
            examples = report.examples.len(),
            untitled = report.untitled,
            missing = report.missing_targets.len(),
            "training data built"
        );
        Ok(report)
    }
}

/// Write one compact JSON object per line.
pub fn write_jsonl<W: Write>(mut sink: W, examples: &[TrainingExample]) -> Result<()> {
    for example in examples {
        serde_json::to_writer(&mut sink, example)
            .map_err(|e| BlockCtxError::Serialization(e.to_string()))?;
        sink.write_all(b"\n")
            .map_err(|e| BlockCtxError::Serialization(e.to_string()))?;
    }
    sink.flush()
        .map_err(|e| BlockCtxError::Serialization(e.to_string()))
}
