//! Seams to the four external collaborators.
//!
//! ```text
//!            ┌──────────────┐
//!  upload ──▶│  RagService  │◀── query
//!            └──────┬───────┘
//!     ┌─────────────┼──────────────┬────────────────┐
//!     ▼             ▼              ▼                ▼
//! ObjectStore   VectorIndex    AuditLog     GenerationClient
//!  (MinIO)       (Chroma)      (SQLite)        (Ollama)
//! ```
//!
//! Production implementations live in [`object_store`](crate::object_store),
//! [`vector_index`](crate::vector_index), [`audit`](crate::audit) and
//! [`generation`](crate::generation); in-memory doubles live in
//! [`memory`](crate::memory). All implementations must be `Send + Sync` and
//! safe to share across request tasks behind an `Arc`.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AuditEntry, ChatMessage, IndexEntry, IndexMatch, NewAuditEntry};

/// Durable blob storage addressed by bucket and key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `bucket/key`, replacing any existing object.
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Deleting a missing key is not an error.
    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()>;

    async fn bucket_exists(&self, bucket: &str) -> Result<bool>;

    async fn create_bucket(&self, bucket: &str) -> Result<()>;

    /// Create the bucket if it does not exist yet.
    async fn ensure_bucket(&self, bucket: &str) -> Result<()> {
        if !self.bucket_exists(bucket).await? {
            self.create_bucket(bucket).await?;
        }
        Ok(())
    }
}

/// Text-similarity index. Implementations compute embeddings themselves;
/// callers only ever deal in text.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn add(&self, entry: &IndexEntry) -> Result<()>;

    /// Up to `top_k` matches, closest first.
    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<IndexMatch>>;
}

/// Append-only store of interactions.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Persist an entry and return the store-assigned id.
    async fn append(&self, entry: &NewAuditEntry) -> Result<i64>;

    /// Most recent entries first.
    async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>>;
}

/// Synchronous (non-streaming) chat completion.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Returns the assistant message content.
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String>;
}
