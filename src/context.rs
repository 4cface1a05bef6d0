//! Process-wide shared state.
//!
//! The expensive long-lived resources — the database pool, the embedding
//! model, the vector collection cache, and the chunker — are created once
//! at startup and handed to whoever needs them (HTTP handlers, background
//! ingestion tasks, CLI commands). Cloning an [`AppContext`] clones only
//! handles.

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::chunk::Chunker;
use crate::config::Config;
use crate::db;
use crate::embedding::Embedder;
use crate::vector_store::VectorStore;

#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pub embedder: Arc<Embedder>,
    pub vectors: Arc<VectorStore>,
    pub chunker: Arc<Chunker>,
}

impl AppContext {
    pub async fn init(config: Config) -> Result<Self> {
        let pool = db::connect(&config).await?;
        let embedder = Arc::new(Embedder::new(&config.embedding)?);
        let vectors = Arc::new(VectorStore::new(config.storage.vectors_dir.clone()));
        let chunker = Arc::new(Chunker::new(&config.chunking));

        Ok(Self {
            config: Arc::new(config),
            pool,
            embedder,
            vectors,
            chunker,
        })
    }
}
