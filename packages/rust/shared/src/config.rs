//! Application configuration for blockctx.
//!
//! User config lives at `~/.blockctx/blockctx.toml`.
//! CLI flags override config file values, which override defaults.
//!
//! The retrieval tables (stop words, synonyms, boost rules) are plain data here
//! so a deployment can retune ranking without touching scoring code.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BlockCtxError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "blockctx.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".blockctx";

// ---------------------------------------------------------------------------
// Config structs (matching blockctx.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Catalog element names.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Dictionary compilation settings.
    #[serde(default)]
    pub compile: CompileConfig,

    /// Prompt assembly settings.
    #[serde(default)]
    pub prompt: PromptConfig,

    /// Query analysis, scoring and selection tables.
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

/// `[catalog]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Root element whose `name` becomes the library name.
    #[serde(default = "default_library_tag")]
    pub library_tag: String,

    /// Scope element pushed on enter and popped on leave.
    #[serde(default = "default_folder_tag")]
    pub folder_tag: String,

    /// Leaf element emitted as a reference.
    #[serde(default = "default_reference_tag")]
    pub reference_tag: String,

    /// Separator used to join folder names.
    #[serde(default = "default_path_separator")]
    pub path_separator: String,

    /// Keep only references whose folder path contains this substring.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_filter: Option<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            library_tag: default_library_tag(),
            folder_tag: default_folder_tag(),
            reference_tag: default_reference_tag(),
            path_separator: default_path_separator(),
            folder_filter: None,
        }
    }
}

fn default_library_tag() -> String {
    "Standard.CustomLibrary".into()
}
fn default_folder_tag() -> String {
    "Standard.LibraryFolder".into()
}
fn default_reference_tag() -> String {
    "blkx-reference".into()
}
fn default_path_separator() -> String {
    "/".into()
}

/// `[compile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileConfig {
    /// Word separator inside reference names.
    #[serde(default = "default_name_separator")]
    pub separator: char,
}

impl Default for CompileConfig {
    fn default() -> Self {
        Self {
            separator: default_name_separator(),
        }
    }
}

fn default_name_separator() -> char {
    '_'
}

/// `[prompt]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Text placed under the `### System:` heading.
    #[serde(default = "default_system_prompt")]
    pub system: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            system: default_system_prompt(),
        }
    }
}

fn default_system_prompt() -> String {
    "You are an expert Automotive Test Automation Engineer.\n\
     Convert Natural Language Test Steps into dSPACE XML.\n\
     \n\
     Rules:\n\
     1. Use the Library Dictionary provided in the Context.\n\
     2. Use exact xml_tag, library_link, and id.\n\
     3. Output ONLY operational XML blocks."
        .into()
}

/// A scoring bonus applied when `trigger` is among the query keywords and
/// `substring` occurs in a candidate's search text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoostRule {
    pub trigger: String,
    pub substring: String,
    pub bonus: u32,
}

impl BoostRule {
    pub fn new(trigger: impl Into<String>, substring: impl Into<String>, bonus: u32) -> Self {
        Self {
            trigger: trigger.into(),
            substring: substring.into(),
            bonus,
        }
    }
}

/// `[retrieval]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum number of snippets handed to the generator.
    #[serde(default = "default_budget")]
    pub budget: usize,

    /// Number of leading entries returned when nothing matches.
    #[serde(default = "default_fallback_size")]
    pub fallback_size: usize,

    /// Query tokens shorter than this (in characters) are dropped.
    #[serde(default = "default_min_token_len")]
    pub min_token_len: usize,

    /// Filler words never used as keywords.
    #[serde(default = "default_stop_words")]
    pub stop_words: Vec<String>,

    /// Query token -> aliases added to the keyword set (one level only).
    #[serde(default = "default_synonyms")]
    pub synonyms: BTreeMap<String, Vec<String>>,

    /// Fixed bonus table.
    #[serde(default = "default_boosts")]
    pub boosts: Vec<BoostRule>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            budget: default_budget(),
            fallback_size: default_fallback_size(),
            min_token_len: default_min_token_len(),
            stop_words: default_stop_words(),
            synonyms: default_synonyms(),
            boosts: default_boosts(),
        }
    }
}

impl RetrievalConfig {
    /// Reject tables that would make selection meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.budget == 0 {
            return Err(BlockCtxError::config("retrieval.budget must be at least 1"));
        }
        if self.fallback_size == 0 {
            return Err(BlockCtxError::config(
                "retrieval.fallback_size must be at least 1",
            ));
        }
        if self.min_token_len == 0 {
            return Err(BlockCtxError::config(
                "retrieval.min_token_len must be at least 1",
            ));
        }
        for rule in &self.boosts {
            if rule.trigger.trim().is_empty() || rule.substring.trim().is_empty() {
                return Err(BlockCtxError::config(format!(
                    "boost rule needs a trigger and a substring: {rule:?}"
                )));
            }
        }
        Ok(())
    }
}

fn default_budget() -> usize {
    100
}
fn default_fallback_size() -> usize {
    5
}
fn default_min_token_len() -> usize {
    3
}

fn default_stop_words() -> Vec<String> {
    [
        "the", "and", "or", "to", "of", "in", "is", "a", "step", "measure", "that", "value",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_synonyms() -> BTreeMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        // Faults & safety
        ("fault", &["fiu", "short", "circuit", "failure", "scg"]),
        ("remove", &["deactivate", "release", "clear", "reset"]),
        ("can", &["fiu", "scg", "bus"]),
        // Specific simulations
        ("gear", &["write_read_gear", "gear_position"]),
        ("pedal", &["write_read_aps", "acc_pedal"]),
        ("acc", &["write_read_aps", "acc_pedal"]),
        // Standard mappings
        ("create", &["set", "activate", "trigger"]),
        ("check", &["read", "verify", "validate", "camera", "vision", "pattern"]),
        ("mil", &["telltale", "indicator", "warning", "lamp"]),
        ("screen", &["cluster", "display", "hmi"]),
        ("simulate", &["set", "force", "write"]),
        ("ignition", &["ign", "key", "switch", "simulating"]),
        ("battery", &["batt", "voltage"]),
        ("crank", &["start", "engine"]),
    ];
    table
        .iter()
        .map(|(key, aliases)| {
            (
                (*key).to_string(),
                aliases.iter().map(|a| (*a).to_string()).collect(),
            )
        })
        .collect()
}

fn default_boosts() -> Vec<BoostRule> {
    vec![
        BoostRule::new("remove", "deactivate", 10),
        BoostRule::new("gear", "gear", 5),
        BoostRule::new("battery", "battery", 5),
    ]
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.blockctx/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| BlockCtxError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.blockctx/blockctx.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| BlockCtxError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        BlockCtxError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.retrieval.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| BlockCtxError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| BlockCtxError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| BlockCtxError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("blkx-reference"));
        assert!(toml_str.contains("deactivate"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.retrieval.budget, 100);
        assert_eq!(parsed.retrieval.synonyms.len(), 14);
        assert_eq!(parsed.retrieval.boosts, default_boosts());
        assert_eq!(parsed.compile.separator, '_');
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[retrieval]
budget = 40
stop_words = ["the"]

[retrieval.synonyms]
door = ["latch", "lock"]

[[retrieval.boosts]]
trigger = "door"
substring = "latch"
bonus = 7
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.retrieval.budget, 40);
        assert_eq!(config.retrieval.fallback_size, 5);
        assert_eq!(config.retrieval.min_token_len, 3);
        assert_eq!(config.retrieval.stop_words, vec!["the"]);
        assert_eq!(config.retrieval.synonyms["door"], vec!["latch", "lock"]);
        assert_eq!(config.retrieval.boosts, vec![BoostRule::new("door", "latch", 7)]);
        assert_eq!(config.catalog.folder_tag, "Standard.LibraryFolder");
    }

    #[test]
    fn validation_rejects_zero_budget() {
        let mut config = RetrievalConfig::default();
        assert!(config.validate().is_ok());

        config.budget = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("budget"));
    }

    #[test]
    fn validation_rejects_empty_boost_trigger() {
        let mut config = RetrievalConfig::default();
        config.boosts.push(BoostRule::new(" ", "x", 1));
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("blockctx.toml");
        std::fs::write(&path, "[retrieval]\nfallback_size = 3\n").expect("write");

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.retrieval.fallback_size, 3);

        std::fs::write(&path, "[retrieval]\nfallback_size = 0\n").expect("write");
        assert!(load_config_from(&path).is_err());
    }
}
