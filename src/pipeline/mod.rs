//! Ingestion and query orchestration.
//!
//! [`RagService`] owns one handle to each external collaborator and the
//! per-deployment settings. It is built once at startup and shared behind
//! an `Arc` by the HTTP handlers and CLI commands.
//!
//! Adapter failures arrive as [`anyhow::Error`] and leave this module as a
//! [`RagError`](crate::error::RagError) variant naming which collaborator
//! failed.

pub mod ingest;
pub mod query;

use std::sync::Arc;

use crate::config::Config;
use crate::error::{RagError, Result, StoreKind};
use crate::models::AuditEntry;
use crate::traits::{AuditLog, GenerationClient, ObjectStore, VectorIndex};

/// Settings the pipelines read on every call.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub bucket: String,
    pub top_k: usize,
    pub prompt_template: String,
    pub empty_context: String,
    pub default_model: String,
    pub compensate_orphans: bool,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            bucket: config.object_store.bucket.clone(),
            top_k: config.retrieval.top_k,
            prompt_template: config.retrieval.prompt_template.clone(),
            empty_context: config.retrieval.empty_context.clone(),
            default_model: config.generation.default_model.clone(),
            compensate_orphans: config.ingestion.compensate_orphans,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

pub struct RagService {
    object_store: Arc<dyn ObjectStore>,
    index: Arc<dyn VectorIndex>,
    audit: Arc<dyn AuditLog>,
    generator: Arc<dyn GenerationClient>,
    config: PipelineConfig,
}

impl RagService {
    pub fn new(
        object_store: Arc<dyn ObjectStore>,
        index: Arc<dyn VectorIndex>,
        audit: Arc<dyn AuditLog>,
        generator: Arc<dyn GenerationClient>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            object_store,
            index,
            audit,
            generator,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Most recent audit entries, newest first.
    pub async fn recent_audit(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        self.audit
            .recent(limit)
            .await
            .map_err(|e| RagError::store(StoreKind::AuditLog, e))
    }
}
