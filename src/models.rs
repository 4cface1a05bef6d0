//! Core data types used throughout CodeContext.
//!
//! These types represent the source files, code chunks, and retrieval
//! results that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A contiguous, semantically meaningful slice of one source file.
///
/// `code` is taken verbatim from the file; `start_line`/`end_line` are
/// 1-based and inclusive. `symbol` is the enclosing function or class
/// name, or a sentinel such as `<module>`, `<imports>`, `<file>`,
/// `<block_N>`, or `Outer.<header>` for split classes.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeChunk {
    pub file_path: String,
    pub symbol: String,
    pub code: String,
    pub language: String,
    pub start_line: u32,
    pub end_line: u32,
}

/// Metadata stored alongside each vector collection entry.
///
/// Line numbers of zero mean "not line-addressable" and are treated as
/// absent by consumers.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub symbol: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub start_line: u32,
    #[serde(default)]
    pub end_line: u32,
}

impl ChunkMetadata {
    pub fn from_chunk(chunk: &CodeChunk) -> Self {
        Self {
            file_path: chunk.file_path.clone(),
            symbol: chunk.symbol.clone(),
            language: chunk.language.clone(),
            start_line: chunk.start_line,
            end_line: chunk.end_line,
        }
    }
}

/// A chunk retrieved from the vector store with its relevance score.
///
/// `distance` is `1 − cosine similarity`: 0 means identical direction,
/// up to 2 for opposite. Constructed per query, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub file_path: String,
    pub symbol: String,
    pub code: String,
    pub language: String,
    pub distance: f32,
    pub start_line: Option<u32>,
    pub end_line: Option<u32>,
}

/// A discovered source file, ready for chunking.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Absolute path on disk.
    pub path: PathBuf,
    /// Path relative to the repository root, forward-slash normalized.
    pub relative_path: String,
    /// Normalized language tag (e.g. `python`, `typescript`, `env`).
    pub language: String,
    /// File content; `.env`-style files arrive with values masked.
    pub content: String,
}

/// Lifecycle states of a project. Ingestion moves a project from
/// `Processing` to either `Ready` or `Error`; both are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectStatus {
    Processing,
    Ready,
    Error,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Processing => "processing",
            ProjectStatus::Ready => "ready",
            ProjectStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
