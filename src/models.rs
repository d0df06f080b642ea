//! Core data models passed between the pipelines and their collaborators.
//!
//! Adapters convert the wire shapes of MinIO, Chroma and Ollama into these
//! types before returning, so nothing outside an adapter ever sees an
//! external client's response format.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of a successful ingestion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestReceipt {
    pub file_name: String,
    /// `<file_name>-<uuid v4>`; also the vector index key.
    pub document_id: String,
}

/// One document as written to the vector index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub id: String,
    pub text: String,
    /// Stored as the `source` metadata field.
    pub source: String,
}

/// A nearest-neighbour hit returned by the vector index.
#[derive(Debug, Clone)]
pub struct IndexMatch {
    pub id: String,
    pub text: String,
    pub source: String,
    /// Backend-specific distance, lower is closer. `None` when unreported.
    pub distance: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Audit row before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub timestamp: DateTime<Utc>,
    pub user_query: String,
    pub retrieved_doc_ids: Vec<String>,
    pub generated_response: String,
    pub model_used: String,
    /// Seconds.
    pub execution_time: f64,
}

/// A persisted row of `audit_logs`.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub user_query: String,
    pub retrieved_doc_ids: Vec<String>,
    pub generated_response: String,
    pub model_used: String,
    pub execution_time: f64,
}

/// Outcome of the query pipeline.
#[derive(Debug, Clone)]
pub struct Answer {
    pub answer: String,
    /// Source filenames, positionally aligned with `retrieved_ids`.
    pub sources: Vec<String>,
    pub retrieved_ids: Vec<String>,
    pub audit_id: i64,
}
