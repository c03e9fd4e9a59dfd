//! TOML configuration parsing and validation.
//!
//! Every section except `[store]` has defaults, so a minimal config is just
//! the store directory. [`load_config`] rejects invalid settings up front:
//! a bad chunking window is a startup failure, never a per-document one.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub store: StoreConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the index artifact and the hash ledger live.
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl StoreConfig {
    pub fn index_path(&self) -> PathBuf {
        self.dir.join("index.sqlite")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.dir.join("ledger.json")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    #[serde(default = "default_corpus_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            root: default_corpus_root(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
        }
    }
}

fn default_corpus_root() -> PathBuf {
    PathBuf::from("./documents")
}

/// Character-window chunking. `chunk_overlap` must stay below `chunk_size`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
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
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL: OpenAI-compatible `/embeddings` root, or the Ollama server.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            api_key_env: default_api_key_env(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_batch_size() -> usize {
    10
}
fn default_concurrency() -> usize {
    2
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexingConfig {
    #[serde(default = "default_read_concurrency")]
    pub read_concurrency: usize,
    #[serde(default = "default_io_timeout_secs")]
    pub io_timeout_secs: u64,
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            read_concurrency: default_read_concurrency(),
            io_timeout_secs: default_io_timeout_secs(),
        }
    }
}

fn default_read_concurrency() -> usize {
    8
}
fn default_io_timeout_secs() -> u64 {
    30
}

impl IndexingConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

/// `default` is an `EnvFilter` directive; `modules` adds `target=level` pairs.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub default: String,
    #[serde(default)]
    pub modules: BTreeMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: BTreeMap::new(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Defaults everywhere, rooted at `store_dir`. Used by tests and embedders.
    pub fn minimal(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreConfig {
                dir: store_dir.into(),
            },
            corpus: CorpusConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Checks every cross-field rule. Called by [`load_config`].
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            anyhow::bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            anyhow::bail!(
                "chunking.chunk_overlap ({}) must be less than chunking.chunk_size ({})",
                self.chunking.chunk_overlap,
                self.chunking.chunk_size
            );
        }

        if self.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be >= 1");
        }

        if self.embedding.batch_size == 0 {
            anyhow::bail!("embedding.batch_size must be >= 1");
        }
        if self.embedding.concurrency == 0 {
            anyhow::bail!("embedding.concurrency must be >= 1");
        }
        if self.indexing.read_concurrency == 0 {
            anyhow::bail!("indexing.read_concurrency must be >= 1");
        }

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => anyhow::bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }

        if self.embedding.is_enabled() && self.embedding.provider != "local" {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                anyhow::bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() {
                anyhow::bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
        }

        if self.store.dir == self.corpus.root {
            anyhow::bail!(
                "store.dir must differ from corpus.root ({})",
                self.store.dir.display()
            );
        }

        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.validate()?;

    Ok(config)
}
