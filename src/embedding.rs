//! Local embedding model.
//!
//! Wraps a fastembed text-embedding model behind an [`Embedder`] that is
//! created once at startup and shared. The model itself is expensive to
//! initialize (first use downloads it from Hugging Face), so it is loaded
//! lazily on the first embed call and reused for the life of the process.
//! Inference runs on a blocking thread to keep the async runtime free.
//!
//! All output vectors are normalized to unit length, so a dot product
//! between any two of them is their cosine similarity.

use anyhow::{anyhow, bail, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::config::EmbeddingConfig;

pub struct Embedder {
    model_name: String,
    dims: usize,
    batch_size: usize,
    model: Arc<Mutex<Option<TextEmbedding>>>,
}

impl Embedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let (_, dims) = resolve_model(&config.model)?;
        Ok(Self {
            model_name: config.model.clone(),
            dims,
            batch_size: config.batch_size,
            model: Arc::new(Mutex::new(None)),
        })
    }

    /// Model identifier (e.g. `"all-minilm-l6-v2"`).
    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Output vector dimensionality, fixed by the model.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Embed a batch of texts, returning one unit-length vector per input
    /// in input order. Batch size affects throughput only, not results.
    pub async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let model_slot = Arc::clone(&self.model);
        let model_name = self.model_name.clone();
        let dims = self.dims;
        let batch_size = self.batch_size;

        tokio::task::spawn_blocking(move || {
            let mut guard = model_slot
                .lock()
                .map_err(|_| anyhow!("embedding model lock poisoned"))?;

            if guard.is_none() {
                info!(model = %model_name, "loading embedding model");
                let (fastembed_model, _) = resolve_model(&model_name)?;
                let model = TextEmbedding::try_new(
                    InitOptions::new(fastembed_model).with_show_download_progress(false),
                )
                .map_err(|e| anyhow!("Failed to initialize embedding model: {e}"))?;
                *guard = Some(model);
            }

            let model = guard
                .as_mut()
                .ok_or_else(|| anyhow!("embedding model missing after initialization"))?;

            let mut embeddings = model
                .embed(texts, Some(batch_size))
                .map_err(|e| anyhow!("Embedding failed: {e}"))?;

            for vec in &mut embeddings {
                if vec.len() != dims {
                    bail!(
                        "Embedding model returned {} dims, expected {}",
                        vec.len(),
                        dims
                    );
                }
                normalize(vec);
            }

            Ok(embeddings)
        })
        .await?
    }

    /// Embed a single text (e.g. a search query).
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let results = self.embed_batch(vec![text.to_string()]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding result"))
    }
}

/// Map a configured model name to its fastembed model and dimensionality.
fn resolve_model(name: &str) -> Result<(EmbeddingModel, usize)> {
    let resolved = match name {
        "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
        "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
        "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
        "bge-large-en-v1.5" => (EmbeddingModel::BGELargeENV15, 1024),
        "nomic-embed-text-v1" => (EmbeddingModel::NomicEmbedTextV1, 768),
        "nomic-embed-text-v1.5" => (EmbeddingModel::NomicEmbedTextV15, 768),
        "multilingual-e5-small" => (EmbeddingModel::MultilingualE5Small, 384),
        "multilingual-e5-base" => (EmbeddingModel::MultilingualE5Base, 768),
        "multilingual-e5-large" => (EmbeddingModel::MultilingualE5Large, 1024),
        other => bail!(
            "Unknown embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1, nomic-embed-text-v1.5, \
             multilingual-e5-small, multilingual-e5-base, multilingual-e5-large",
            other
        ),
    };
    Ok(resolved)
}

/// Scale a vector to unit length in place. Zero vectors are left as-is.
fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vec.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_unit_length() {
        let mut v = vec![3.0f32, 4.0];
        normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_zero_vector_unchanged() {
        let mut v = vec![0.0f32, 0.0, 0.0];
        normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_resolve_model_known() {
        let (_, dims) = resolve_model("all-minilm-l6-v2").unwrap();
        assert_eq!(dims, 384);
        let (_, dims) = resolve_model("bge-base-en-v1.5").unwrap();
        assert_eq!(dims, 768);
    }

    #[test]
    fn test_resolve_model_unknown() {
        assert!(resolve_model("word2vec").is_err());
    }

    #[test]
    fn test_embedder_construction_does_not_load_model() {
        let embedder = Embedder::new(&EmbeddingConfig::default()).unwrap();
        assert_eq!(embedder.dims(), 384);
        assert_eq!(embedder.model_name(), "all-minilm-l6-v2");
        assert!(embedder.model.lock().unwrap().is_none());
    }
}
