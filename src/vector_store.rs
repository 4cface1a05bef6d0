//! Per-project vector collections with exact cosine similarity search.
//!
//! Each project owns one collection of four index-aligned parallel
//! sequences: `ids`, `documents`, `embeddings`, `metadatas`. Collections
//! grow only by append and are persisted as one JSON file per project,
//! rewritten wholesale on every add. A process-wide cache keeps loaded
//! collections in memory; there is no eviction.
//!
//! Search is brute-force: the query vector and every stored vector are
//! re-normalized at query time (stored values are not trusted) and ranked
//! by dot product. O(N·D) per query, which is fine for per-project
//! moderate-N collections.
//!
//! Concurrency: each collection sits behind its own `RwLock`, so adds are
//! serialized against queries on the same project while queries on one
//! project (and any operation on other projects) proceed concurrently.
//! Cross-process exclusion is out of scope — one process owns a project's
//! collection at a time.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use crate::models::ChunkMetadata;

/// One project's indexed chunks as parallel sequences.
/// Invariant: all four sequences have equal length at all times.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Collection {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub embeddings: Vec<Vec<f32>>,
    pub metadatas: Vec<ChunkMetadata>,
}

impl Collection {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Ranked query output as four same-length ordered sequences; entry `i`
/// of each sequence describes the same chunk.
#[derive(Debug, Default)]
pub struct QueryResult {
    pub ids: Vec<String>,
    pub documents: Vec<String>,
    pub metadatas: Vec<ChunkMetadata>,
    pub distances: Vec<f32>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

pub struct VectorStore {
    dir: PathBuf,
    collections: RwLock<HashMap<i64, Arc<RwLock<Collection>>>>,
}

impl VectorStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn collection_path(&self, project_id: i64) -> PathBuf {
        self.dir.join(format!("project_{project_id}.json"))
    }

    /// Fetch a project's collection, loading it from disk on first access.
    /// Missing collections come back empty (and cached as such).
    fn collection(&self, project_id: i64) -> Result<Arc<RwLock<Collection>>> {
        if let Some(collection) = self.collections.read().unwrap().get(&project_id) {
            return Ok(Arc::clone(collection));
        }

        let path = self.collection_path(project_id);
        let loaded = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read collection file {}", path.display()))?;
            let collection: Collection = serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse collection file {}", path.display()))?;
            debug!(project_id, entries = collection.len(), "loaded collection");
            collection
        } else {
            Collection::default()
        };

        let mut cache = self.collections.write().unwrap();
        // Another caller may have loaded it while we read the file.
        let entry = cache
            .entry(project_id)
            .or_insert_with(|| Arc::new(RwLock::new(loaded)));
        Ok(Arc::clone(entry))
    }

    /// Append chunks to a project's collection and persist it.
    ///
    /// `ids` must be unique within the collection; uniqueness is caller
    /// discipline, not enforced here. All four slices must be equal
    /// length and every vector must match the collection dimensionality.
    pub fn add(
        &self,
        project_id: i64,
        ids: Vec<String>,
        documents: Vec<String>,
        embeddings: Vec<Vec<f32>>,
        metadatas: Vec<ChunkMetadata>,
    ) -> Result<()> {
        if ids.len() != documents.len()
            || ids.len() != embeddings.len()
            || ids.len() != metadatas.len()
        {
            bail!(
                "Parallel sequences must be equal length: ids={}, documents={}, embeddings={}, metadatas={}",
                ids.len(),
                documents.len(),
                embeddings.len(),
                metadatas.len()
            );
        }

        let collection = self.collection(project_id)?;
        let mut collection = collection.write().unwrap();

        let expected_dims = collection
            .embeddings
            .first()
            .map(|v| v.len())
            .or_else(|| embeddings.first().map(|v| v.len()));
        if let Some(dims) = expected_dims {
            if let Some(bad) = embeddings.iter().find(|v| v.len() != dims) {
                bail!(
                    "Embedding dimensionality mismatch: expected {}, got {}",
                    dims,
                    bad.len()
                );
            }
        }

        info!(project_id, count = ids.len(), "adding chunks to vector store");
        collection.ids.extend(ids);
        collection.documents.extend(documents);
        collection.embeddings.extend(embeddings);
        collection.metadatas.extend(metadatas);

        self.persist(project_id, &collection)
    }

    /// Exact top-K cosine query. Returns up to `top_k` entries ordered by
    /// ascending distance (`1 − cosine similarity`), ties broken by
    /// insertion order. A missing or empty collection yields an empty
    /// result, never an error.
    pub fn query(
        &self,
        project_id: i64,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<QueryResult> {
        let collection = self.collection(project_id)?;
        let collection = collection.read().unwrap();

        if collection.is_empty() {
            return Ok(QueryResult::default());
        }

        let query = normalized(query_embedding);

        let similarities: Vec<f32> = collection
            .embeddings
            .iter()
            .map(|stored| {
                let norm: f32 = stored.iter().map(|v| v * v).sum::<f32>().sqrt() + 1e-10;
                let dot: f32 = query.iter().zip(stored.iter()).map(|(q, s)| q * s).sum();
                dot / norm
            })
            .collect();

        let mut order: Vec<usize> = (0..similarities.len()).collect();
        // Stable sort keeps insertion order on ties.
        order.sort_by(|&a, &b| {
            similarities[b]
                .partial_cmp(&similarities[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let k = top_k.min(order.len());
        let mut result = QueryResult::default();
        for &i in order.iter().take(k) {
            result.ids.push(collection.ids[i].clone());
            result.documents.push(collection.documents[i].clone());
            result.metadatas.push(collection.metadatas[i].clone());
            result.distances.push(1.0 - similarities[i]);
        }

        debug!(
            project_id,
            returned = result.len(),
            best_distance = result.distances.first().copied().unwrap_or(1.0),
            "vector query"
        );
        Ok(result)
    }

    /// Remove a project's collection and its durable file. Idempotent.
    pub fn delete(&self, project_id: i64) -> Result<()> {
        self.collections.write().unwrap().remove(&project_id);

        let path = self.collection_path(project_id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(project_id, "deleted vector collection");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to delete collection {}", path.display()))
            }
        }
    }

    fn persist(&self, project_id: i64, collection: &Collection) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create vectors dir {}", self.dir.display()))?;
        let path = self.collection_path(project_id);
        let data = serde_json::to_string(collection)?;
        std::fs::write(&path, data)
            .with_context(|| format!("Failed to write collection file {}", path.display()))?;
        Ok(())
    }
}

fn normalized(vec: &[f32]) -> Vec<f32> {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt() + 1e-10;
    vec.iter().map(|v| v / norm).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(file_path: &str) -> ChunkMetadata {
        ChunkMetadata {
            file_path: file_path.to_string(),
            symbol: "f".to_string(),
            language: "python".to_string(),
            start_line: 1,
            end_line: 2,
        }
    }

    fn store() -> (tempfile::TempDir, VectorStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = VectorStore::new(dir.path());
        (dir, store)
    }

    fn seed(store: &VectorStore, project_id: i64) {
        store
            .add(
                project_id,
                vec!["a".into(), "b".into(), "c".into()],
                vec!["doc a".into(), "doc b".into(), "doc c".into()],
                vec![
                    vec![1.0, 0.0, 0.0],
                    vec![0.0, 1.0, 0.0],
                    vec![0.7, 0.7, 0.0],
                ],
                vec![meta("a.py"), meta("b.py"), meta("c.py")],
            )
            .unwrap();
    }

    #[test]
    fn test_query_ranks_by_distance() {
        let (_dir, store) = store();
        seed(&store, 1);

        let result = store.query(1, &[1.0, 0.0, 0.0], 3).unwrap();
        assert_eq!(result.ids, vec!["a", "c", "b"]);
        assert!(result.distances[0] < result.distances[1]);
        assert!(result.distances[1] < result.distances[2]);
        for d in &result.distances {
            assert!((0.0..=2.0).contains(d), "distance out of range: {d}");
        }
        assert!(result.distances[0].abs() < 1e-6);
    }

    #[test]
    fn test_query_returns_min_of_k_and_n() {
        let (_dir, store) = store();
        seed(&store, 1);
        store
            .add(
                1,
                vec!["d".into(), "e".into()],
                vec!["doc d".into(), "doc e".into()],
                vec![vec![0.0, 0.0, 1.0], vec![0.5, 0.5, 0.5]],
                vec![meta("d.py"), meta("e.py")],
            )
            .unwrap();

        // Asking for more than the collection holds returns everything.
        let all = store.query(1, &[1.0, 0.0, 0.0], 20).unwrap();
        assert_eq!(all.len(), 5);
        for pair in all.distances.windows(2) {
            assert!(pair[0] <= pair[1], "distances must be non-decreasing");
        }

        assert_eq!(store.query(1, &[1.0, 0.0, 0.0], 2).unwrap().len(), 2);
    }

    #[test]
    fn test_query_missing_collection_is_empty_not_error() {
        let (_dir, store) = store();
        let result = store.query(99, &[1.0, 0.0], 5).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_query_denormalized_vectors_are_renormalized() {
        let (_dir, store) = store();
        store
            .add(
                1,
                vec!["long".into(), "short".into()],
                vec!["x".into(), "y".into()],
                // Same direction, wildly different magnitudes.
                vec![vec![100.0, 0.0], vec![0.1, 0.0]],
                vec![meta("x.py"), meta("y.py")],
            )
            .unwrap();

        let result = store.query(1, &[1.0, 0.0], 2).unwrap();
        assert!(result.distances[0].abs() < 1e-4);
        assert!(result.distances[1].abs() < 1e-4);
        // Equal similarity: insertion order decides.
        assert_eq!(result.ids, vec!["long", "short"]);
    }

    #[test]
    fn test_add_is_append_only_and_preserves_prior_entries() {
        let (_dir, store) = store();
        seed(&store, 1);

        store
            .add(
                1,
                vec!["d".into()],
                vec!["doc d".into()],
                vec![vec![0.0, 0.0, 1.0]],
                vec![meta("d.py")],
            )
            .unwrap();

        let result = store.query(1, &[0.0, 0.0, 1.0], 10).unwrap();
        assert_eq!(result.len(), 4);
        assert_eq!(result.ids[0], "d");

        let prior = store.query(1, &[1.0, 0.0, 0.0], 10).unwrap();
        assert_eq!(prior.ids[0], "a");
        assert_eq!(prior.documents[0], "doc a");
        assert_eq!(prior.metadatas[0].file_path, "a.py");
    }

    #[test]
    fn test_add_rejects_unequal_sequences() {
        let (_dir, store) = store();
        let err = store.add(
            1,
            vec!["a".into()],
            vec![],
            vec![vec![1.0]],
            vec![meta("a.py")],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_add_rejects_dimension_mismatch() {
        let (_dir, store) = store();
        seed(&store, 1);
        let err = store.add(
            1,
            vec!["bad".into()],
            vec!["doc".into()],
            vec![vec![1.0, 0.0]],
            vec![meta("bad.py")],
        );
        assert!(err.is_err());
    }

    #[test]
    fn test_persistence_across_store_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = VectorStore::new(dir.path());
            seed(&store, 7);
        }

        let reopened = VectorStore::new(dir.path());
        let result = reopened.query(7, &[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(result.ids, vec!["b"]);
        assert_eq!(result.documents, vec!["doc b"]);
    }

    #[test]
    fn test_delete_is_idempotent() {
        let (dir, store) = store();
        seed(&store, 1);
        assert!(dir.path().join("project_1.json").exists());

        store.delete(1).unwrap();
        assert!(!dir.path().join("project_1.json").exists());
        assert!(store.query(1, &[1.0, 0.0, 0.0], 5).unwrap().is_empty());

        // Deleting again is a no-op.
        store.delete(1).unwrap();
    }

    #[test]
    fn test_collections_are_isolated_per_project() {
        let (_dir, store) = store();
        seed(&store, 1);
        seed(&store, 2);

        store.delete(1).unwrap();
        assert!(store.query(1, &[1.0, 0.0, 0.0], 5).unwrap().is_empty());
        assert_eq!(store.query(2, &[1.0, 0.0, 0.0], 5).unwrap().len(), 3);
    }
}
