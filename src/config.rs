use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// SQLite database file holding project and chunk metadata.
    pub database_path: PathBuf,
    /// Directory of per-project vector collection files.
    pub vectors_dir: PathBuf,
    /// Directory acquired repositories are cloned/extracted into.
    pub repos_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    /// Largest class or file (in lines) kept as a single chunk.
    #[serde(default = "default_max_chunk_lines")]
    pub max_chunk_lines: usize,
    /// Window size for the line-window fallback.
    #[serde(default = "default_window_lines")]
    pub window_lines: usize,
    /// Overlap between consecutive fallback windows.
    #[serde(default = "default_overlap_lines")]
    pub overlap_lines: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_lines: default_max_chunk_lines(),
            window_lines: default_window_lines(),
            overlap_lines: default_overlap_lines(),
        }
    }
}

fn default_max_chunk_lines() -> usize {
    200
}
fn default_window_lines() -> usize {
    150
}
fn default_overlap_lines() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Local embedding model identifier (e.g. `all-minilm-l6-v2`).
    #[serde(default = "default_embedding_model")]
    pub model: String,
    /// Number of texts embedded per inference batch. Affects throughput only.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_embedding_model() -> String {
    "all-minilm-l6-v2".to_string()
}
fn default_batch_size() -> usize {
    64
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Default number of chunks returned per query.
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    20
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// Provider used when a request does not name one: gemini, grok, or kimi.
    #[serde(default = "default_provider")]
    pub default_provider: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_grok_model")]
    pub grok_model: String,
    #[serde(default = "default_kimi_model")]
    pub kimi_model: String,
    #[serde(default = "default_chat_temperature")]
    pub chat_temperature: f32,
    #[serde(default = "default_code_temperature")]
    pub code_temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_provider: default_provider(),
            gemini_model: default_gemini_model(),
            grok_model: default_grok_model(),
            kimi_model: default_kimi_model(),
            chat_temperature: default_chat_temperature(),
            code_temperature: default_code_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "gemini".to_string()
}
fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_grok_model() -> String {
    "grok-3-mini-fast".to_string()
}
fn default_kimi_model() -> String {
    "moonshotai/kimi-k2-instruct".to_string()
}
fn default_chat_temperature() -> f32 {
    0.7
}
fn default_code_temperature() -> f32 {
    0.2
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Directory names pruned during the repository walk. Dot-directories
    /// are always pruned regardless of this list.
    #[serde(default = "default_ignored_dirs")]
    pub ignored_dirs: Vec<String>,
    /// Extra glob patterns (matched against repo-relative paths) whose
    /// files are excluded from indexing.
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Files larger than this many bytes are skipped.
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            ignored_dirs: default_ignored_dirs(),
            exclude_globs: Vec::new(),
            max_file_bytes: default_max_file_bytes(),
        }
    }
}

fn default_ignored_dirs() -> Vec<String> {
    [
        "node_modules",
        "dist",
        "build",
        "venv",
        "__pycache__",
        "env",
        "coverage",
        "target",
        "egg-info",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_max_file_bytes() -> usize {
    500_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.chunking.max_chunk_lines == 0 {
        anyhow::bail!("chunking.max_chunk_lines must be > 0");
    }
    if config.chunking.window_lines == 0 {
        anyhow::bail!("chunking.window_lines must be > 0");
    }
    if config.chunking.overlap_lines >= config.chunking.window_lines {
        anyhow::bail!(
            "chunking.overlap_lines ({}) must be less than chunking.window_lines ({})",
            config.chunking.overlap_lines,
            config.chunking.window_lines
        );
    }

    if config.embedding.batch_size == 0 {
        anyhow::bail!("embedding.batch_size must be > 0");
    }

    if config.retrieval.top_k == 0 {
        anyhow::bail!("retrieval.top_k must be >= 1");
    }

    match config.llm.default_provider.as_str() {
        "gemini" | "grok" | "kimi" => {}
        other => anyhow::bail!(
            "Unknown LLM provider: '{}'. Must be gemini, grok, or kimi.",
            other
        ),
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file
    }

    const MINIMAL: &str = r#"
[storage]
database_path = "./data/codectx.db"
vectors_dir = "./data/vectors"
repos_dir = "./data/repos"

[server]
bind = "127.0.0.1:8080"
"#;

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.chunking.max_chunk_lines, 200);
        assert_eq!(config.chunking.window_lines, 150);
        assert_eq!(config.chunking.overlap_lines, 20);
        assert_eq!(config.embedding.model, "all-minilm-l6-v2");
        assert_eq!(config.embedding.batch_size, 64);
        assert_eq!(config.retrieval.top_k, 20);
        assert_eq!(config.llm.default_provider, "gemini");
        assert_eq!(config.discovery.max_file_bytes, 500_000);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_window() {
        let body = format!("{MINIMAL}\n[chunking]\nwindow_lines = 20\noverlap_lines = 20\n");
        let file = write_config(&body);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let body = format!("{MINIMAL}\n[llm]\ndefault_provider = \"openai\"\n");
        let file = write_config(&body);
        assert!(load_config(file.path()).is_err());
    }

    #[test]
    fn test_zero_top_k_rejected() {
        let body = format!("{MINIMAL}\n[retrieval]\ntop_k = 0\n");
        let file = write_config(&body);
        assert!(load_config(file.path()).is_err());
    }
}
