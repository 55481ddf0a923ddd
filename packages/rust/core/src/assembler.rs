//! Dictionary persistence.
//!
//! Writes the compiled dictionary as 4-space-indented JSON next to a
//! `<stem>.manifest.json` sidecar:
//! ```text
//! out/
//! ├── dictionary.json            (stable contract, no timestamps)
//! └── dictionary.manifest.json   (schema version, checksum, provenance)
//! ```
//! Every file is written to a hidden temp file first and renamed into place.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use blockctx_shared::{
    BlockCtxError, CURRENT_SCHEMA_VERSION, Dictionary, Result, to_json_indented,
};

/// Sidecar describing a persisted dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryManifest {
    pub schema_version: u32,
    pub tool_version: String,
    pub entry_count: usize,
    /// Hex SHA-256 of the dictionary file bytes.
    pub sha256: String,
    /// Where the records came from (CSV or catalog path).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub compiled_at: DateTime<Utc>,
}

/// Output of [`write_dictionary`].
#[derive(Debug, Clone)]
pub struct WriteResult {
    pub path: PathBuf,
    pub manifest_path: PathBuf,
    pub manifest: DictionaryManifest,
}

/// `dir/name.json` -> `dir/name.manifest.json`.
pub fn manifest_path_for(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dictionary".into());
    path.with_file_name(format!("{stem}.manifest.json"))
}

/// Persist a dictionary and its manifest.
#[instrument(skip_all, fields(path = %path.display(), entries = dictionary.len()))]
pub fn write_dictionary(
    path: &Path,
    dictionary: &Dictionary,
    source: Option<&str>,
    tool_version: &str,
) -> Result<WriteResult> {
    let json = dictionary.to_json_pretty()?;
    write_atomic(path, json.as_bytes())?;

    let manifest = DictionaryManifest {
        schema_version: CURRENT_SCHEMA_VERSION,
        tool_version: tool_version.to_string(),
        entry_count: dictionary.len(),
        sha256: sha256_hex(json.as_bytes()),
        source: source.map(String::from),
        compiled_at: Utc::now(),
    };
    let manifest_path = manifest_path_for(path);
    write_json(&manifest_path, &manifest)?;

    info!(
        entries = manifest.entry_count,
        sha256 = %manifest.sha256,
        "dictionary written"
    );

    Ok(WriteResult {
        path: path.to_path_buf(),
        manifest_path,
        manifest,
    })
}

/// Load a persisted dictionary. Malformed content is a fatal dictionary error.
#[instrument(skip_all, fields(path = %path.display()))]
pub fn load_dictionary(path: &Path) -> Result<Dictionary> {
    let content = std::fs::read_to_string(path).map_err(|e| BlockCtxError::io(path, e))?;
    let dictionary = Dictionary::from_json_str(&content).map_err(|e| {
        BlockCtxError::dictionary(format!("{}: {e}", path.display()))
    })?;
    debug!(entries = dictionary.len(), "dictionary loaded");
    Ok(dictionary)
}

/// Check a persisted dictionary against its manifest.
pub fn validate_dictionary(path: &Path) -> Result<DictionaryManifest> {
    let manifest_path = manifest_path_for(path);
    if !manifest_path.exists() {
        return Err(BlockCtxError::validation(format!(
            "missing {}",
            manifest_path.display()
        )));
    }

    let manifest_content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| BlockCtxError::io(&manifest_path, e))?;
    let manifest: DictionaryManifest = serde_json::from_str(&manifest_content)
        .map_err(|e| BlockCtxError::validation(format!("invalid manifest: {e}")))?;

    if manifest.schema_version != CURRENT_SCHEMA_VERSION {
        return Err(BlockCtxError::validation(format!(
            "unsupported schema_version: {} (expected {})",
            manifest.schema_version, CURRENT_SCHEMA_VERSION
        )));
    }

    let bytes = std::fs::read(path).map_err(|e| BlockCtxError::io(path, e))?;
    let actual = sha256_hex(&bytes);
    if actual != manifest.sha256 {
        return Err(BlockCtxError::validation(format!(
            "checksum mismatch for {}: manifest has {}, file has {actual}",
            path.display(),
            manifest.sha256
        )));
    }

    let dictionary = load_dictionary(path)?;
    if dictionary.len() != manifest.entry_count {
        return Err(BlockCtxError::validation(format!(
            "entry count mismatch: manifest has {}, file has {}",
            manifest.entry_count,
            dictionary.len()
        )));
    }

    Ok(manifest)
}

/// Serialize `data` with 4-space indentation and write it atomically.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, data: &T) -> Result<()> {
    let json = to_json_indented(data)?;
    write_atomic(path, json.as_bytes())
}

/// Write to `.<name>.tmp` beside `path`, then rename over it.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| BlockCtxError::io(parent, e))?;
    }

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| BlockCtxError::validation(format!("not a file path: {}", path.display())))?;
    let temp = path.with_file_name(format!(".{filename}.tmp"));

    let written = std::fs::write(&temp, bytes)
        .map_err(|e| BlockCtxError::io(&temp, e))
        .and_then(|()| std::fs::rename(&temp, path).map_err(|e| BlockCtxError::io(path, e)));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&temp);
        return Err(e);
    }

    debug!(path = %path.display(), size = bytes.len(), "wrote file");
    Ok(())
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
