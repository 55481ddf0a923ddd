//! Shared types, error model, and configuration for blockctx.
//!
//! This crate is the foundation depended on by all other blockctx crates.
//! It provides:
//! - [`BlockCtxError`] and [`RecordError`], the unified error types
//! - Domain types ([`ReferenceEntry`], [`RawRecord`], [`Snippet`], [`DictionaryEntry`],
//!   [`Dictionary`])
//! - Configuration ([`AppConfig`], [`RetrievalConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BoostRule, CatalogConfig, CompileConfig, PromptConfig, RetrievalConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from,
};
pub use error::{BlockCtxError, RecordError, Result};
pub use types::{
    CURRENT_SCHEMA_VERSION, Dictionary, DictionaryEntry, RawRecord, ReferenceEntry, Snippet,
    to_json_indented,
};
