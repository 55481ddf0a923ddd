//! Core domain types for blockctx catalogs and dictionaries.

use serde::{Deserialize, Serialize};

use crate::error::{BlockCtxError, Result};

/// Current schema version for the dictionary manifest format.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// ReferenceEntry
// ---------------------------------------------------------------------------

/// One library block reference found in a catalog, flattened with its folder path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Name declared by the catalog root (e.g. `TVSM_Library`).
    pub library_name: String,
    /// Containing folder names joined by `/` (e.g. `DID_Module/IO_Services`).
    pub folder_path: String,
    /// Block type attribute (e.g. `MainLibrary.Serial`).
    pub ref_type: String,
    /// Block name attribute (e.g. `SET_CHECK_BATT_ON`).
    pub ref_name: String,
    /// Block identifier, usually a braced GUID.
    pub ref_id: String,
    /// External link attribute, if the reference carried one.
    #[serde(default)]
    pub href: Option<String>,
}

// ---------------------------------------------------------------------------
// RawRecord
// ---------------------------------------------------------------------------

/// Input row for the dictionary compiler.
///
/// Usually read from the tabular dictionary-inputs source, where `params` holds
/// the raw `data-objects` cell (e.g. `['SetVariable', 'Value']`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawRecord {
    pub library_name: String,
    pub ref_type: String,
    pub ref_name: String,
    pub ref_id: String,
    /// Raw parameter-list text, unparsed.
    #[serde(default)]
    pub params: Option<String>,
}

impl From<&ReferenceEntry> for RawRecord {
    fn from(entry: &ReferenceEntry) -> Self {
        Self {
            library_name: entry.library_name.clone(),
            ref_type: entry.ref_type.clone(),
            ref_name: entry.ref_name.clone(),
            ref_id: entry.ref_id.clone(),
            params: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Snippet / DictionaryEntry
// ---------------------------------------------------------------------------

/// The structured payload describing one block, as handed to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// Humanized name plus required parameters.
    pub concept: String,
    /// `<library_name>.<ref_name>`, the value of the `library-link` attribute.
    pub library_link: String,
    /// Element tag to emit for the block.
    pub xml_tag: String,
    /// Block identifier.
    pub id: String,
    /// Parameter names the block needs, in declaration order.
    #[serde(default)]
    pub required_params: Vec<String>,
}

/// A compiled, searchable dictionary entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// Search keywords (never empty strings).
    #[serde(default)]
    pub keywords: Vec<String>,
    pub json_snippet: Snippet,
}

// ---------------------------------------------------------------------------
// Dictionary
// ---------------------------------------------------------------------------

/// The compiled dictionary. Read-only once built; rebuilt rather than mutated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Dictionary {
    entries: Vec<DictionaryEntry>,
}

/// Shapes accepted when reading a persisted dictionary.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredEntry {
    Wrapped(DictionaryEntry),
    Bare(Snippet),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredDictionary {
    Many(Vec<StoredEntry>),
    One(StoredEntry),
}

impl From<StoredEntry> for DictionaryEntry {
    fn from(stored: StoredEntry) -> Self {
        match stored {
            StoredEntry::Wrapped(entry) => entry,
            StoredEntry::Bare(json_snippet) => DictionaryEntry {
                keywords: Vec::new(),
                json_snippet,
            },
        }
    }
}

impl<'de> Deserialize<'de> for Dictionary {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let entries = match StoredDictionary::deserialize(deserializer)? {
            StoredDictionary::Many(entries) => entries.into_iter().map(Into::into).collect(),
            StoredDictionary::One(entry) => vec![entry.into()],
        };
        Ok(Self { entries })
    }
}

impl Dictionary {
    pub fn new(entries: Vec<DictionaryEntry>) -> Self {
        Self { entries }
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> &[DictionaryEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DictionaryEntry> {
        self.entries.iter()
    }

    /// Parse a persisted dictionary.
    ///
    /// Accepts an array or a single object, and entries either in the
    /// `{keywords, json_snippet}` form or as bare snippets.
    pub fn from_json_str(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| BlockCtxError::dictionary(format!("unreadable dictionary JSON: {e}")))
    }

    /// Serialize with 4-space indentation, the layout downstream tools expect.
    pub fn to_json_pretty(&self) -> Result<String> {
        to_json_indented(self)
    }
}

impl<'a> IntoIterator for &'a Dictionary {
    type Item = &'a DictionaryEntry;
    type IntoIter = std::slice::Iter<'a, DictionaryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Serialize any value as JSON indented with four spaces.
pub fn to_json_indented<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .map_err(|e| BlockCtxError::Serialization(e.to_string()))?;
    String::from_utf8(buf).map_err(|e| BlockCtxError::Serialization(e.to_string()))
}
