//! Top-K retrieval and context assembly.
//!
//! [`Retriever`] turns a natural-language question into ranked
//! [`RetrievedChunk`]s by embedding the question and querying the
//! project's vector collection. [`build_context`] renders those chunks
//! into the structured text block handed to the generation provider.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::embedding::Embedder;
use crate::models::RetrievedChunk;
use crate::vector_store::{QueryResult, VectorStore};

/// Symbols that name a whole file rather than a code object; they carry
/// no information beyond the file path and are omitted from headers.
const SENTINEL_SYMBOLS: [&str; 3] = ["<file>", "<module>", "<imports>"];

pub struct Retriever {
    embedder: Arc<Embedder>,
    store: Arc<VectorStore>,
    default_top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<Embedder>, store: Arc<VectorStore>, default_top_k: usize) -> Self {
        Self {
            embedder,
            store,
            default_top_k,
        }
    }

    /// Retrieve the most relevant chunks for a question, best first.
    /// A project with no indexed content yields an empty list, never an
    /// error.
    pub async fn retrieve(
        &self,
        project_id: i64,
        question: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<RetrievedChunk>> {
        let top_k = top_k.unwrap_or(self.default_top_k);
        info!(project_id, top_k, "retrieving chunks");

        let query_embedding = self.embedder.embed_one(question).await?;
        let result = self.store.query(project_id, &query_embedding, top_k)?;
        let chunks = chunks_from_result(result);

        info!(project_id, retrieved = chunks.len(), "retrieval complete");
        Ok(chunks)
    }
}

/// Map a raw query result into typed chunks, defaulting any missing
/// metadata field to `"unknown"`. Line numbers of zero mean absent.
pub fn chunks_from_result(result: QueryResult) -> Vec<RetrievedChunk> {
    let mut chunks = Vec::with_capacity(result.ids.len());

    for i in 0..result.ids.len() {
        let meta = result.metadatas.get(i).cloned().unwrap_or_default();
        let code = result.documents.get(i).cloned().unwrap_or_default();
        let distance = result.distances.get(i).copied().unwrap_or(1.0);

        chunks.push(RetrievedChunk {
            file_path: or_unknown(meta.file_path),
            symbol: or_unknown(meta.symbol),
            code,
            language: or_unknown(meta.language),
            distance,
            start_line: (meta.start_line > 0).then_some(meta.start_line),
            end_line: (meta.end_line > 0).then_some(meta.end_line),
        });
    }

    chunks
}

fn or_unknown(value: String) -> String {
    if value.is_empty() {
        "unknown".to_string()
    } else {
        value
    }
}

/// Build the structured context block passed to the generation provider.
///
/// One section per chunk in input order, each headed by its 1-based
/// position, location, and language. Always returns a non-empty string:
/// an empty input produces a fixed placeholder so downstream generation
/// never sees an empty context.
pub fn build_context(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return "No relevant code found in the repository.".to_string();
    }

    let mut sections = Vec::with_capacity(chunks.len());
    for (i, chunk) in chunks.iter().enumerate() {
        let mut location = chunk.file_path.clone();
        if let Some(start) = chunk.start_line {
            let end = chunk.end_line.unwrap_or(start);
            location.push_str(&format!(" (lines {start}-{end})"));
        }
        if !chunk.symbol.is_empty() && !SENTINEL_SYMBOLS.contains(&chunk.symbol.as_str()) {
            location.push_str(&format!(" → {}", chunk.symbol));
        }

        sections.push(format!(
            "--- [{}] {} ({}) ---\n{}",
            i + 1,
            location,
            chunk.language,
            chunk.code
        ));
    }

    sections.join("\n\n")
}
