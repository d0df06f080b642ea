//! TOML configuration with environment overrides.
//!
//! Every section is optional and falls back to defaults that match a local
//! docker-compose deployment (MinIO on `:9000`, Chroma on `:8000`, Ollama on
//! `:11434`). Connection parameters can be overridden from the environment
//! after the file is parsed; bucket and collection names are fixed per
//! deployment.
//!
//! ```toml
//! [db]
//! path = "./data/ragops.sqlite"
//!
//! [object_store]
//! endpoint_url = "http://localhost:9000"
//! bucket = "knowledge-base"
//!
//! [vector_index]
//! url = "http://localhost:8000"
//! collection = "docs_collection"
//!
//! [generation]
//! url = "http://localhost:11434"
//! default_model = "llama3.2"
//!
//! [retrieval]
//! top_k = 3
//!
//! [server]
//! bind = "127.0.0.1:8080"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "Using the following context, answer the user's question.\n\nContext: {context}\n\nQuestion: {question}";
pub const DEFAULT_EMPTY_CONTEXT: &str = "No relevant context found.";
pub const DEFAULT_MODEL: &str = "llama3.2";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub object_store: ObjectStoreConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./data/ragops.sqlite")
}
fn default_max_connections() -> u32 {
    5
}

/// S3-compatible object store settings.
///
/// With `endpoint_url` unset the AWS virtual-hosted endpoint
/// `<bucket>.s3.<region>.amazonaws.com` is used; with it set (MinIO,
/// LocalStack) requests use path-style addressing against that host.
#[derive(Debug, Deserialize, Clone)]
pub struct ObjectStoreConfig {
    #[serde(default = "default_endpoint_url")]
    pub endpoint_url: Option<String>,
    #[serde(default = "default_bucket")]
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            endpoint_url: default_endpoint_url(),
            bucket: default_bucket(),
            region: default_region(),
            access_key: None,
            secret_key: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_endpoint_url() -> Option<String> {
    Some("http://localhost:9000".to_string())
}
fn default_bucket() -> String {
    "knowledge-base".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorIndexConfig {
    #[serde(default = "default_chroma_url")]
    pub url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default = "default_database")]
    pub database: String,
    /// Ollama model used by the index adapter to embed documents and queries.
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    /// Ollama base URL for embeddings. Defaults to `generation.url`.
    #[serde(default)]
    pub embedding_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            url: default_chroma_url(),
            collection: default_collection(),
            tenant: default_tenant(),
            database: default_database(),
            embedding_model: default_embedding_model(),
            embedding_url: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_chroma_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_collection() -> String {
    "docs_collection".to_string()
}
fn default_tenant() -> String {
    "default_tenant".to_string()
}
fn default_database() -> String {
    "default_database".to_string()
}
fn default_embedding_model() -> String {
    "nomic-embed-text".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_ollama_url")]
    pub url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            url: default_ollama_url(),
            default_model: default_model(),
            timeout_secs: default_generation_timeout_secs(),
        }
    }
}

fn default_ollama_url() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_generation_timeout_secs() -> u64 {
    300
}

/// Retrieval knobs that are fixed per deployment, never per request.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Must contain the `{context}` and `{question}` placeholders.
    #[serde(default = "default_prompt_template")]
    pub prompt_template: String,
    #[serde(default = "default_empty_context")]
    pub empty_context: String,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            prompt_template: default_prompt_template(),
            empty_context: default_empty_context(),
        }
    }
}

fn default_top_k() -> usize {
    3
}
fn default_prompt_template() -> String {
    DEFAULT_PROMPT_TEMPLATE.to_string()
}
fn default_empty_context() -> String {
    DEFAULT_EMPTY_CONTEXT.to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IngestionConfig {
    /// Delete the stored blob when decoding or indexing fails after the
    /// object-store write. Best effort: a failed delete is only logged.
    #[serde(default)]
    pub compensate_orphans: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_prefix: default_api_prefix(),
            allowed_origins: Vec::new(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}
fn default_api_prefix() -> String {
    "/api/v1".to_string()
}
fn default_max_upload_bytes() -> usize {
    25 * 1024 * 1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_bind")]
    pub bind: String,
    #[serde(default = "default_backend_url")]
    pub backend_url: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind: default_proxy_bind(),
            backend_url: default_backend_url(),
        }
    }
}

fn default_proxy_bind() -> String {
    "0.0.0.0:5000".to_string()
}
fn default_backend_url() -> String {
    "http://localhost:8080".to_string()
}

/// Load configuration from `path`, apply environment overrides, validate.
///
/// A missing file is not an error: the built-in defaults are used so that a
/// containerised deployment can be configured from the environment alone.
pub fn load_config(path: &Path) -> Result<Config> {
    let mut config = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config(&content)?
    } else {
        Config::default()
    };

    config.apply_env_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse config file")
}

impl Config {
    /// Apply overrides from a variable lookup (normally `std::env::var`).
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATABASE_PATH") {
            self.db.path = PathBuf::from(v);
        }

        let secure = lookup("MINIO_SECURE").map(|v| matches!(v.as_str(), "1" | "true" | "True"));
        if let Some(endpoint) = lookup("MINIO_ENDPOINT") {
            self.object_store.endpoint_url = Some(with_scheme(&endpoint, secure.unwrap_or(false)));
        }
        if let Some(v) = lookup("MINIO_BUCKET") {
            self.object_store.bucket = v;
        }
        if let Some(v) = lookup("MINIO_ACCESS_KEY") {
            self.object_store.access_key = Some(v);
        }
        if let Some(v) = lookup("MINIO_SECRET_KEY") {
            self.object_store.secret_key = Some(v);
        }

        if let Some(v) = lookup("CHROMA_URL") {
            self.vector_index.url = v;
        }
        if let Some(v) = lookup("CHROMA_COLLECTION") {
            self.vector_index.collection = v;
        }
        if let Some(v) = lookup("CHROMA_TENANT") {
            self.vector_index.tenant = v;
        }
        if let Some(v) = lookup("CHROMA_DATABASE") {
            self.vector_index.database = v;
        }

        if let Some(v) = lookup("OLLAMA_HOST") {
            self.generation.url = with_scheme(&v, false);
        }
        if let Some(v) = lookup("DEFAULT_MODEL") {
            self.generation.default_model = v;
        }

        if let Some(v) = lookup("RAGOPS_BIND") {
            self.server.bind = v;
        }
        if let Some(v) = lookup("RAGOPS_BACKEND_URL") {
            self.proxy.backend_url = v;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        for placeholder in ["{context}", "{question}"] {
            if !self.retrieval.prompt_template.contains(placeholder) {
                bail!("retrieval.prompt_template must contain {}", placeholder);
            }
        }
        if self.object_store.bucket.trim().is_empty() {
            bail!("object_store.bucket must not be empty");
        }
        if self.vector_index.collection.trim().is_empty() {
            bail!("vector_index.collection must not be empty");
        }
        if self.vector_index.tenant.trim().is_empty() || self.vector_index.database.trim().is_empty() {
            bail!("vector_index.tenant and vector_index.database must not be empty");
        }
        if self.generation.default_model.trim().is_empty() {
            bail!("generation.default_model must not be empty");
        }
        if !self.server.api_prefix.is_empty()
            && (!self.server.api_prefix.starts_with('/') || self.server.api_prefix.ends_with('/'))
        {
            bail!(
                "server.api_prefix must start with '/' and not end with '/': '{}'",
                self.server.api_prefix
            );
        }
        if self.db.max_connections == 0 {
            bail!("db.max_connections must be > 0");
        }
        Ok(())
    }

    /// Base URL for embedding requests made by the index adapter.
    pub fn embedding_url(&self) -> &str {
        self.vector_index
            .embedding_url
            .as_deref()
            .unwrap_or(&self.generation.url)
    }
}

/// `localhost:9000` → `http://localhost:9000`; URLs with a scheme pass through.
fn with_scheme(endpoint: &str, secure: bool) -> String {
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        endpoint.trim_end_matches('/').to_string()
    } else if secure {
        format!("https://{}", endpoint.trim_end_matches('/'))
    } else {
        format!("http://{}", endpoint.trim_end_matches('/'))
    }
}
