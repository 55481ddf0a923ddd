//! Catalog hierarchy extractor.
//!
//! Streams a library catalog (`.adlx`/`.aldx` XML) and emits one flat
//! [`ReferenceEntry`] per block reference, annotated with the folders that
//! contain it:
//! - The root library element's `name` is captured once and attached to every entry
//! - Folder elements push their name on enter and pop it on leave
//! - Reference elements are emitted with the current folder stack joined by `/`
//!
//! Only the folder stack is kept in memory; the tree is never built.

use std::collections::BTreeSet;
use std::io::BufRead;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{debug, instrument};

use blockctx_shared::{BlockCtxError, CatalogConfig, ReferenceEntry, Result};

// ---------------------------------------------------------------------------
// Streaming extractor
// ---------------------------------------------------------------------------

/// Pull-based iterator over the references of a catalog.
///
/// Yields `Err` once on the first structural fault and then stops.
pub struct ReferenceStream<'c, R> {
    reader: Reader<R>,
    buf: Vec<u8>,
    config: &'c CatalogConfig,
    folders: Vec<String>,
    library_name: Option<String>,
    depth: usize,
    done: bool,
}

enum Step {
    Emit(ReferenceEntry),
    Continue,
    Eof,
}

impl<'c, R: BufRead> ReferenceStream<'c, R> {
    pub fn new(source: R, config: &'c CatalogConfig) -> Self {
        Self {
            reader: Reader::from_reader(source),
            buf: Vec::new(),
            config,
            folders: Vec::new(),
            library_name: None,
            depth: 0,
            done: false,
        }
    }

    /// Library name seen so far (empty until the root element is read).
    pub fn library_name(&self) -> &str {
        self.library_name.as_deref().unwrap_or_default()
    }

    fn byte_offset(&self) -> u64 {
        self.reader.buffer_position() as u64
    }

    fn step(&mut self, buf: &mut Vec<u8>) -> Result<Step> {
        match self.reader.read_event_into(buf) {
            Err(e) => Err(BlockCtxError::source_format_at(
                self.byte_offset(),
                format!("malformed catalog XML: {e}"),
            )),
            Ok(Event::Start(e)) => {
                self.depth += 1;
                self.open(&e, false)
            }
            Ok(Event::Empty(e)) => self.open(&e, true),
            Ok(Event::End(e)) => {
                self.depth = self.depth.saturating_sub(1);
                if e.name().as_ref() == self.config.folder_tag.as_bytes() {
                    self.folders.pop();
                }
                Ok(Step::Continue)
            }
            Ok(Event::Eof) if self.depth > 0 => Err(BlockCtxError::source_format_at(
                self.byte_offset(),
                format!(
                    "unexpected end of catalog: {} element(s) left open",
                    self.depth
                ),
            )),
            Ok(Event::Eof) => Ok(Step::Eof),
            Ok(Event::Text(e)) => {
                ensure_utf8(&e, self.byte_offset(), "text")?;
                Ok(Step::Continue)
            }
            Ok(Event::CData(e)) => {
                ensure_utf8(&e, self.byte_offset(), "CDATA section")?;
                Ok(Step::Continue)
            }
            Ok(Event::Comment(e)) => {
                ensure_utf8(&e, self.byte_offset(), "comment")?;
                Ok(Step::Continue)
            }
            Ok(_) => Ok(Step::Continue),
        }
    }

    fn open(&mut self, element: &BytesStart<'_>, self_closing: bool) -> Result<Step> {
        let position = self.byte_offset();
        check_attributes(element, position)?;
        let name = element.name();
        let tag = name.as_ref();

        if tag == self.config.reference_tag.as_bytes() {
            return Ok(Step::Emit(self.reference(element, position)?));
        }

        if tag == self.config.folder_tag.as_bytes() {
            // A self-closing folder has no children, so push and pop cancel out.
            if !self_closing {
                let folder = attribute(element, "name", position)?.unwrap_or_default();
                self.folders.push(folder);
            }
        } else if tag == self.config.library_tag.as_bytes() && self.library_name.is_none() {
            let library = attribute(element, "name", position)?.unwrap_or_default();
            debug!(library = %library, "catalog root found");
            self.library_name = Some(library);
        }

        Ok(Step::Continue)
    }

    fn reference(&self, element: &BytesStart<'_>, position: u64) -> Result<ReferenceEntry> {
        let folder_path = self
            .folders
            .iter()
            .filter(|f| !f.is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(&self.config.path_separator);

        Ok(ReferenceEntry {
            library_name: self.library_name().to_string(),
            folder_path,
            ref_type: attribute(element, "type", position)?.unwrap_or_default(),
            ref_name: attribute(element, "name", position)?.unwrap_or_default(),
            ref_id: attribute(element, "id", position)?.unwrap_or_default(),
            href: attribute(element, "href", position)?.filter(|h| !h.is_empty()),
        })
    }
}

impl<R: BufRead> Iterator for ReferenceStream<'_, R> {
    type Item = Result<ReferenceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            let mut buf = std::mem::take(&mut self.buf);
            buf.clear();
            let step = self.step(&mut buf);
            self.buf = buf;

            match step {
                Ok(Step::Emit(entry)) => return Some(Ok(entry)),
                Ok(Step::Continue) => continue,
                Ok(Step::Eof) => {
                    self.done = true;
                    return None;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

/// Every attribute of an element must be well-formed UTF-8, read or not.
fn check_attributes(element: &BytesStart<'_>, position: u64) -> Result<()> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| {
            BlockCtxError::source_format_at(position, format!("malformed attribute: {e}"))
        })?;
        ensure_utf8(attr.key.as_ref(), position, "attribute name")?;
        ensure_utf8(&attr.value, position, "attribute value")?;
    }
    Ok(())
}

fn ensure_utf8(bytes: &[u8], position: u64, what: &str) -> Result<()> {
    std::str::from_utf8(bytes).map(drop).map_err(|e| {
        BlockCtxError::source_format_at(position, format!("unreadable encoding in {what}: {e}"))
    })
}

/// Read a trimmed, unescaped attribute value.
fn attribute(element: &BytesStart<'_>, key: &str, position: u64) -> Result<Option<String>> {
    for attr in element.attributes() {
        let attr = attr.map_err(|e| {
            BlockCtxError::source_format_at(position, format!("malformed attribute: {e}"))
        })?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr.unescape_value().map_err(|e| {
                BlockCtxError::source_format_at(
                    position,
                    format!("unreadable value for attribute '{key}': {e}"),
                )
            })?;
            return Ok(Some(value.trim().to_string()));
        }
    }
    Ok(None)
}

// ---------------------------------------------------------------------------
// Convenience entry points
// ---------------------------------------------------------------------------

/// Extract every reference from a catalog source.
///
/// An empty but well-formed source yields an empty list. Unterminated
/// nesting, mismatched end tags and undecodable text or attributes fail with
/// [`BlockCtxError::SourceFormat`].
#[instrument(skip_all, fields(reference_tag = %config.reference_tag))]
pub fn extract<R: BufRead>(source: R, config: &CatalogConfig) -> Result<Vec<ReferenceEntry>> {
    let entries = ReferenceStream::new(source, config).collect::<Result<Vec<_>>>()?;
    debug!(count = entries.len(), "references extracted");
    Ok(entries)
}

/// Extract from an in-memory catalog.
pub fn extract_str(content: &str, config: &CatalogConfig) -> Result<Vec<ReferenceEntry>> {
    extract(content.as_bytes(), config)
}

/// Keep only entries whose folder path contains `needle`. A blank needle keeps everything.
pub fn filter_by_folder(entries: Vec<ReferenceEntry>, needle: &str) -> Vec<ReferenceEntry> {
    let needle = needle.trim();
    if needle.is_empty() {
        return entries;
    }
    entries
        .into_iter()
        .filter(|e| e.folder_path.contains(needle))
        .collect()
}

/// Counts reported after an extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub library_name: String,
    pub total: usize,
    pub unique_folders: usize,
}

impl ExtractSummary {
    pub fn from_entries(entries: &[ReferenceEntry]) -> Self {
        let unique_folders = entries
            .iter()
            .map(|e| e.folder_path.as_str())
            .collect::<BTreeSet<_>>()
            .len();
        Self {
            library_name: entries
                .first()
                .map(|e| e.library_name.clone())
                .unwrap_or_default(),
            total: entries.len(),
            unique_folders,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CatalogConfig {
        CatalogConfig::default()
    }

    fn wrap(body: &str) -> String {
        format!(r#"<Standard.CustomLibrary name="Lib">{body}</Standard.CustomLibrary>"#)
    }

    #[test]
    fn nested_folders_build_path() {
        let xml = wrap(
            r#"<Standard.LibraryFolder name="A">
                 <Standard.LibraryFolder name="B">
                   <blkx-reference name="INNER" type="T" id="1"/>
                 </Standard.LibraryFolder>
                 <blkx-reference name="SIBLING" type="T" id="2"/>
               </Standard.LibraryFolder>"#,
        );
        let entries = extract_str(&xml, &config()).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].ref_name, "INNER");
        assert_eq!(entries[0].folder_path, "A/B");
        assert_eq!(entries[1].ref_name, "SIBLING");
        assert_eq!(entries[1].folder_path, "A");
    }

    #[test]
    fn path_independent_of_sibling_order() {
        let xml = wrap(
            r#"<Standard.LibraryFolder name="A">
                 <Standard.LibraryFolder name="X"><blkx-reference name="X1"/></Standard.LibraryFolder>
                 <Standard.LibraryFolder name="B"><blkx-reference name="B1"/></Standard.LibraryFolder>
               </Standard.LibraryFolder>"#,
        );
        let entries = extract_str(&xml, &config()).unwrap();
        assert_eq!(entries[0].folder_path, "A/X");
        assert_eq!(entries[1].folder_path, "A/B");
    }

    #[test]
    fn unnamed_folders_are_omitted_from_path() {
        let xml = wrap(
            r#"<Standard.LibraryFolder>
                 <Standard.LibraryFolder name="  ">
                   <Standard.LibraryFolder name="C"><blkx-reference name="R"/></Standard.LibraryFolder>
                 </Standard.LibraryFolder>
               </Standard.LibraryFolder>"#,
        );
        let entries = extract_str(&xml, &config()).unwrap();
        assert_eq!(entries[0].folder_path, "C");
    }

    #[test]
    fn self_closing_folder_does_not_unbalance_stack() {
        let xml = wrap(
            r#"<Standard.LibraryFolder name="A">
                 <Standard.LibraryFolder name="EMPTY"/>
                 <blkx-reference name="R"/>
               </Standard.LibraryFolder>"#,
        );
        let entries = extract_str(&xml, &config()).unwrap();
        assert_eq!(entries[0].folder_path, "A");
    }

    #[test]
    fn attributes_are_trimmed_and_unescaped() {
        let xml = wrap(
            r#"<blkx-reference name=" SET_IGN_ON " type="MainLibrary.Serial" id="{01}" href="a&amp;b"/>"#,
        );
        let entries = extract_str(&xml, &config()).unwrap();
        let entry = &entries[0];
        assert_eq!(entry.library_name, "Lib");
        assert_eq!(entry.folder_path, "");
        assert_eq!(entry.ref_name, "SET_IGN_ON");
        assert_eq!(entry.ref_type, "MainLibrary.Serial");
        assert_eq!(entry.ref_id, "{01}");
        assert_eq!(entry.href.as_deref(), Some("a&b"));
    }

    #[test]
    fn missing_href_is_none() {
        let xml = wrap(r#"<blkx-reference name="R" href=""/>"#);
        let entries = extract_str(&xml, &config()).unwrap();
        assert!(entries[0].href.is_none());
    }

    #[test]
    fn library_name_captured_once() {
        let xml = r#"<Standard.CustomLibrary name="Outer">
                       <Standard.CustomLibrary name="Inner"/>
                       <blkx-reference name="R"/>
                     </Standard.CustomLibrary>"#;
        let entries = extract_str(xml, &config()).unwrap();
        assert_eq!(entries[0].library_name, "Outer");
    }

    #[test]
    fn empty_source_yields_nothing() {
        assert!(extract_str("", &config()).unwrap().is_empty());
        assert!(
            extract_str(r#"<?xml version="1.0"?><Standard.CustomLibrary name="L"/>"#, &config())
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn unterminated_nesting_fails() {
        let xml = r#"<Standard.CustomLibrary name="L"><Standard.LibraryFolder name="A"><blkx-reference name="R"/>"#;
        let err = extract_str(xml, &config()).unwrap_err();
        assert!(matches!(err, BlockCtxError::SourceFormat { .. }));
        assert!(err.to_string().contains("at byte"));
    }

    #[test]
    fn mismatched_end_tag_fails() {
        let xml = r#"<Standard.CustomLibrary name="L"><Standard.LibraryFolder name="A"></Standard.CustomLibrary>"#;
        assert!(extract_str(xml, &config()).is_err());
    }

    #[test]
    fn invalid_utf8_attribute_fails() {
        let mut bytes = br#"<Standard.CustomLibrary name="L"><blkx-reference name=""#.to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(br#""/></Standard.CustomLibrary>"#);
        assert!(extract(bytes.as_slice(), &config()).is_err());
    }

    #[test]
    fn invalid_utf8_text_fails() {
        let mut bytes =
            br#"<Standard.CustomLibrary name="L"><library-description>"#.to_vec();
        bytes.extend_from_slice(&[0xff, 0xfe]);
        bytes.extend_from_slice(
            br#"</library-description><blkx-reference name="R"/></Standard.CustomLibrary>"#,
        );
        let err = extract(bytes.as_slice(), &config()).unwrap_err();
        assert!(matches!(err, BlockCtxError::SourceFormat { .. }));
        assert!(err.to_string().contains("unreadable encoding"));
    }

    #[test]
    fn invalid_utf8_in_unused_attribute_fails() {
        let mut bytes = br#"<Standard.CustomLibrary name="L" version=""#.to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(br#""><blkx-reference name="R"/></Standard.CustomLibrary>"#);
        let err = extract(bytes.as_slice(), &config()).unwrap_err();
        assert!(matches!(err, BlockCtxError::SourceFormat { .. }));
    }

    #[test]
    fn stream_stops_after_error() {
        let xml = r#"<Standard.CustomLibrary name="L"><blkx-reference name="R"/><a></b>"#;
        let cfg = config();
        let mut stream = ReferenceStream::new(xml.as_bytes(), &cfg);
        assert!(stream.next().unwrap().is_ok());
        assert!(stream.next().unwrap().is_err());
        assert!(stream.next().is_none());
    }

    #[test]
    fn custom_element_names() {
        let cfg = CatalogConfig {
            library_tag: "lib".into(),
            folder_tag: "dir".into(),
            reference_tag: "ref".into(),
            path_separator: "::".into(),
            folder_filter: None,
        };
        let xml = r#"<lib name="L"><dir name="a"><dir name="b"><ref name="R"/></dir></dir></lib>"#;
        let entries = extract_str(xml, &cfg).unwrap();
        assert_eq!(entries[0].folder_path, "a::b");
    }

    #[test]
    fn folder_filter_applies_after_extraction() {
        let content = std::fs::read_to_string("../../../fixtures/catalog/sample.adlx")
            .expect("read fixture");
        let all = extract_str(&content, &config()).unwrap();
        let read_can = filter_by_folder(all.clone(), "READ_CAN");
        assert_eq!(read_can.len(), 2);
        assert!(read_can.iter().all(|e| e.folder_path == "READ_CAN"));

        assert_eq!(filter_by_folder(all.clone(), "  ").len(), all.len());
    }

    #[test]
    fn sample_catalog_fixture() {
        let content = std::fs::read_to_string("../../../fixtures/catalog/sample.adlx")
            .expect("read fixture");
        let entries = extract_str(&content, &config()).unwrap();
        assert_eq!(entries.len(), 9);

        let crank = entries
            .iter()
            .find(|e| e.ref_name == "CRANK_ENGINE_START")
            .unwrap();
        assert_eq!(crank.folder_path, "POWER/CRANK");
        assert_eq!(crank.ref_type, "MainLibrary.Parallel");

        let volt = entries.iter().find(|e| e.ref_name == "SET_BATT_VOLTAGE").unwrap();
        assert_eq!(volt.folder_path, "POWER");

        let fault = entries
            .iter()
            .find(|e| e.ref_name == "DEACTIVATE_RELEASE_ERROR")
            .unwrap();
        assert_eq!(fault.folder_path, "FAULTS");

        let summary = ExtractSummary::from_entries(&entries);
        assert_eq!(summary.library_name, "TVSM_Library");
        assert_eq!(summary.total, 9);
        assert_eq!(summary.unique_folders, 5);
    }
}
