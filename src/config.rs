//! Configuration loading and validation.
//!
//! docqa is configured by an optional TOML file (default
//! `./config/docqa.toml`). Every field has a default, so a missing file or
//! a missing section falls back to built-in values suitable for local use.
//! A small set of environment variables override the file afterwards.
//!
//! # Example
//!
//! ```toml
//! [documents]
//! dir = "documents"
//! manifest = "context.md"
//!
//! [store]
//! url = "sqlite:data/vectordb.sqlite"
//! connect_retries = 30
//! retry_interval_ms = 2000
//!
//! [chunking]
//! chunk_size = 100
//! chunk_overlap = 20
//!
//! [embedding]
//! provider = "local"
//! model = "all-minilm-l6-v2"
//!
//! [answer]
//! model = "claude-3-5-sonnet-20241022"
//!
//! [[answer.pricing]]
//! name = "conservative"
//! input_per_mtok = 3.0
//! output_per_mtok = 15.0
//! ```
//!
//! # Environment overrides
//!
//! | Variable | Field |
//! |----------|-------|
//! | `DATABASE_URL` | `store.url` |
//! | `DOCQA_DOCUMENTS_DIR` | `documents.dir` |
//! | `DOCQA_COLLECTION` | `index.collection` |
//! | `DOCQA_ANSWER_MODEL` | `answer.model` |
//! | `DOCQA_EMBEDDING_PROVIDER` | `embedding.provider` |
//! | `DOCQA_CHUNK_SIZE` | `chunking.chunk_size` |
//! | `DOCQA_CHUNK_OVERLAP` | `chunking.chunk_overlap` |
//! | `DOCQA_CONNECT_RETRIES` | `store.connect_retries` |
//! | `DOCQA_RETRY_INTERVAL_MS` | `store.retry_interval_ms` |

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use docqa_core::chunk::{DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
use docqa_core::pricing::{default_tiers, PricingTier};
use docqa_core::search::DEFAULT_K;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    #[serde(default = "default_documents_dir")]
    pub dir: PathBuf,
    /// Matched against file names in the top level of `dir`.
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    /// Static system context prepended to every prompt.
    #[serde(default = "default_manifest")]
    pub manifest: PathBuf,
    /// Used when the manifest file does not exist.
    #[serde(default = "default_fallback_context")]
    pub fallback_context: String,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            dir: default_documents_dir(),
            include_globs: default_include_globs(),
            manifest: default_manifest(),
            fallback_context: default_fallback_context(),
        }
    }
}

fn default_documents_dir() -> PathBuf {
    PathBuf::from("documents")
}
fn default_include_globs() -> Vec<String> {
    vec!["*.txt".to_string(), "*.md".to_string()]
}
fn default_manifest() -> PathBuf {
    PathBuf::from("context.md")
}
fn default_fallback_context() -> String {
    "You are answering questions about the documents in this knowledge base.".to_string()
}

/// What to do when an eligible file cannot be read while fingerprinting.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnreadableFilePolicy {
    /// Leave the file out of the digest and carry on.
    #[default]
    Skip,
    /// Treat the index as stale and rebuild.
    Rebuild,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    /// Side file recording the digest of the corpus behind the collection.
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub on_unreadable_file: UnreadableFilePolicy,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            collection: default_collection(),
            on_unreadable_file: UnreadableFilePolicy::default(),
        }
    }
}

fn default_state_file() -> PathBuf {
    PathBuf::from("data/document_hash.txt")
}
fn default_collection() -> String {
    "document_search".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_store_url")]
    pub url: String,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

impl StoreConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
            connect_retries: default_connect_retries(),
            retry_interval_ms: default_retry_interval_ms(),
        }
    }
}

fn default_store_url() -> String {
    "sqlite:data/vectordb.sqlite".to_string()
}
fn default_connect_retries() -> u32 {
    30
}
fn default_retry_interval_ms() -> u64 {
    2000
}

#[derive(Debug, Deserialize, Clone)]
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
    DEFAULT_CHUNK_SIZE
}
fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
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
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct AnswerConfig {
    #[serde(default = "default_answer_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Name of the environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_answer_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_tiers")]
    pub pricing: Vec<PricingTier>,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            model: default_answer_model(),
            max_tokens: default_max_tokens(),
            api_url: default_api_url(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_answer_timeout_secs(),
            pricing: default_tiers(),
        }
    }
}

fn default_answer_model() -> String {
    "claude-3-5-sonnet-20241022".to_string()
}
fn default_max_tokens() -> u32 {
    1500
}
fn default_api_url() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}
fn default_api_key_env() -> String {
    "ANTHROPIC_API_KEY".to_string()
}
fn default_answer_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub default_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            default_k: default_k(),
        }
    }
}

fn default_k() -> usize {
    DEFAULT_K
}

/// Load the config file (if present), apply environment overrides, validate.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

/// Apply overrides from `lookup` (normally the process environment).
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(url) = lookup("DATABASE_URL") {
        config.store.url = url;
    }
    if let Some(dir) = lookup("DOCQA_DOCUMENTS_DIR") {
        config.documents.dir = PathBuf::from(dir);
    }
    if let Some(collection) = lookup("DOCQA_COLLECTION") {
        config.index.collection = collection;
    }
    if let Some(model) = lookup("DOCQA_ANSWER_MODEL") {
        config.answer.model = model;
    }
    if let Some(provider) = lookup("DOCQA_EMBEDDING_PROVIDER") {
        config.embedding.provider = provider;
    }
    if let Some(v) = lookup("DOCQA_CHUNK_SIZE") {
        config.chunking.chunk_size = parse_override("DOCQA_CHUNK_SIZE", &v)?;
    }
    if let Some(v) = lookup("DOCQA_CHUNK_OVERLAP") {
        config.chunking.chunk_overlap = parse_override("DOCQA_CHUNK_OVERLAP", &v)?;
    }
    if let Some(v) = lookup("DOCQA_CONNECT_RETRIES") {
        config.store.connect_retries = parse_override("DOCQA_CONNECT_RETRIES", &v)?;
    }
    if let Some(v) = lookup("DOCQA_RETRY_INTERVAL_MS") {
        config.store.retry_interval_ms = parse_override("DOCQA_RETRY_INTERVAL_MS", &v)?;
    }
    Ok(())
}

fn parse_override<T: FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| anyhow::anyhow!("{} has invalid value '{}': {}", key, value, e))
}

pub fn validate(config: &Config) -> Result<()> {
    if config.chunking.chunk_size == 0 {
        bail!("chunking.chunk_size must be > 0");
    }
    if config.chunking.chunk_overlap >= config.chunking.chunk_size {
        bail!("chunking.chunk_overlap must be smaller than chunking.chunk_size");
    }

    if config.store.connect_retries == 0 {
        bail!("store.connect_retries must be >= 1");
    }

    if config.retrieval.default_k == 0 {
        bail!("retrieval.default_k must be >= 1");
    }

    if config.index.collection.trim().is_empty() {
        bail!("index.collection must not be empty");
    }

    if config.documents.include_globs.is_empty() {
        bail!("documents.include_globs must list at least one pattern");
    }

    if config.embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    match config.embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if config.embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    config.embedding.provider
                );
            }
            if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    config.embedding.provider
                );
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, local, openai, or ollama.",
            other
        ),
    }

    if config.answer.pricing.len() < 3 {
        tracing::warn!(
            tiers = config.answer.pricing.len(),
            "fewer than three pricing tiers configured"
        );
    }

    Ok(())
}
