//! Core pipeline orchestration for blockctx.
//!
//! Ties the extractor, compiler and retriever to the filesystem: CSV sources,
//! atomic dictionary persistence, prompt assembly and training data.

pub mod assembler;
pub mod pipeline;
pub mod prompt;
pub mod tabular;
pub mod training;
