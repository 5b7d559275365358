//! Configuration loading.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. Built-in defaults (every field has one).
//! 2. An optional TOML file (`--config`, default `./lowe.toml`).
//! 3. Environment variables (`MODEL_NAME`, `MODEL_PROVIDER`,
//!    `KNOWLEDGE_BASE_URL`, `INDEX_PATH` / `CHROMA_DB_PATH`).
//!
//! ```toml
//! [model]
//! provider = "openai"
//! name = "gpt-4o-mini"
//!
//! [knowledge_base]
//! url = "http://localhost:4000/"
//!
//! [index]
//! path = "./lowe_index"
//! collection = "lowe_collection"
//!
//! [chunking]
//! max_chunk_size = 300
//!
//! [embedding]
//! provider = "local"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub knowledge_base: KnowledgeBaseConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_model_provider")]
    pub provider: String,
    #[serde(default = "default_model_name")]
    pub name: String,
    /// Override for OpenAI-compatible or Ollama endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: default_model_provider(),
            name: default_model_name(),
            base_url: None,
            temperature: None,
            timeout_secs: default_model_timeout_secs(),
        }
    }
}

fn default_model_provider() -> String {
    "google_genai".to_string()
}
fn default_model_name() -> String {
    "gemini-2.0-flash".to_string()
}
fn default_model_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    #[serde(default = "default_knowledge_base_url")]
    pub url: String,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            url: default_knowledge_base_url(),
        }
    }
}

fn default_knowledge_base_url() -> String {
    "http://localhost:4000/".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            path: default_index_path(),
            collection: default_collection(),
        }
    }
}

fn default_index_path() -> PathBuf {
    PathBuf::from("./lowe_index")
}
fn default_collection() -> String {
    "lowe_collection".to_string()
}

impl IndexConfig {
    /// SQLite file holding every collection's chunks and vectors.
    pub fn db_path(&self) -> PathBuf {
        self.path.join("index.sqlite")
    }

    /// Marker whose presence means the collection was fully indexed.
    pub fn marker_path(&self) -> PathBuf {
        self.path.join(format!("{}.indexed", self.collection))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,
    #[serde(default)]
    pub min_chunk_size: Option<usize>,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            min_chunk_size: None,
        }
    }
}

/// Smallest chunk bound that still fits any single escaped character.
pub const MIN_CHUNK_BYTES: usize = 16;

fn default_max_chunk_size() -> usize {
    300
}

impl ChunkingConfig {
    /// Size at which a chunk is considered full enough to be closed.
    /// Defaults to `max - 200`, never below 50 and never above `max`.
    pub fn effective_min_chunk_size(&self) -> usize {
        self.min_chunk_size
            .unwrap_or_else(|| self.max_chunk_size.saturating_sub(200).max(50))
            .min(self.max_chunk_size)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { k: default_k() }
    }
}

fn default_k() -> usize {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
            url: None,
        }
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
fn default_embedding_provider() -> String {
    "local".to_string()
}
#[cfg(not(feature = "local-embeddings-fastembed"))]
fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_max_lines")]
    pub max_lines: usize,
    #[serde(default = "default_max_input_size")]
    pub max_input_size: usize,
    /// Upper bound enforced by the dispatcher before forwarding a command.
    #[serde(default = "default_max_command_chars")]
    pub max_command_chars: usize,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            max_lines: default_max_lines(),
            max_input_size: default_max_input_size(),
            max_command_chars: default_max_command_chars(),
        }
    }
}

fn default_max_lines() -> usize {
    1000
}
fn default_max_input_size() -> usize {
    5000
}
fn default_max_command_chars() -> usize {
    10_000
}

#[derive(Debug, Deserialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_lines")]
    pub max_lines: usize,
    /// Explicit history file; otherwise `$HISTFILE`, `~/.zsh_history`, `~/.bash_history`.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_lines: default_history_lines(),
            file: None,
        }
    }
}

fn default_history_lines() -> usize {
    100
}

impl Config {
    /// Apply overrides from a variable lookup. Empty values count as unset.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(name) = get("MODEL_NAME") {
            self.model.name = name;
        }
        if let Some(provider) = get("MODEL_PROVIDER") {
            self.model.provider = provider;
        }
        if let Some(url) = get("KNOWLEDGE_BASE_URL") {
            self.knowledge_base.url = url;
        }
        if let Some(path) = get("INDEX_PATH").or_else(|| get("CHROMA_DB_PATH")) {
            self.index.path = PathBuf::from(path);
        }
    }

    /// Apply overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_chunk_size < MIN_CHUNK_BYTES {
            bail!(
                "chunking.max_chunk_size must be >= {} bytes",
                MIN_CHUNK_BYTES
            );
        }

        if self.retrieval.k == 0 {
            bail!("retrieval.k must be >= 1");
        }

        if self.input.max_lines == 0 {
            bail!("input.max_lines must be >= 1");
        }
        if self.input.max_input_size == 0 {
            bail!("input.max_input_size must be >= 1");
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be >= 1");
        }

        if self.index.collection.trim().is_empty() {
            bail!("index.collection must not be empty");
        }

        match self.model.provider.as_str() {
            "google_genai" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown model provider: '{}'. Must be google_genai, openai, or ollama.",
                other
            ),
        }

        match self.embedding.provider.as_str() {
            "local" | "openai" | "ollama" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local, openai, or ollama.",
                other
            ),
        }

        Ok(())
    }
}

/// Load configuration from `path` (optional), then the environment.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = read_config_file(path)?;
    config.apply_env();
    config.validate()?;
    Ok(config)
}

/// Parse the TOML file at `path`, or return defaults when it does not exist.
pub fn read_config_file(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    toml::from_str(&content).with_context(|| "Failed to parse config file")
}
