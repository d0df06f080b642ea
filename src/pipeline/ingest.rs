//! Upload → object store → vector index.
//!
//! The blob write and the index write are not transactional. When decoding
//! or indexing fails after the blob is stored, the blob is left behind (an
//! orphan) unless `compensate_orphans` is set, in which case one delete is
//! attempted and its outcome only logged.

use uuid::Uuid;

use super::RagService;
use crate::error::{RagError, Result, StoreKind};
use crate::models::{IndexEntry, IngestReceipt};

impl RagService {
    /// Store `content` under `file_name`, index its text and return the new
    /// document id (`<file_name>-<uuid>`).
    pub async fn ingest(&self, file_name: &str, content: &[u8]) -> Result<IngestReceipt> {
        if file_name.is_empty() {
            return Err(RagError::validation("file name must not be empty"));
        }
        let bucket = &self.config.bucket;

        self.object_store
            .put_object(bucket, file_name, content)
            .await
            .map_err(|e| RagError::store(StoreKind::ObjectStore, e))?;
        tracing::debug!(bucket = %bucket, key = %file_name, bytes = content.len(), "stored upload");

        let text = match std::str::from_utf8(content) {
            Ok(text) => text,
            Err(source) => {
                self.compensate(file_name).await;
                return Err(RagError::Decode {
                    file_name: file_name.to_string(),
                    source,
                });
            }
        };

        let document_id = new_document_id(file_name);
        let entry = IndexEntry {
            id: document_id.clone(),
            text: text.to_string(),
            source: file_name.to_string(),
        };

        if let Err(e) = self.index.add(&entry).await {
            self.compensate(file_name).await;
            return Err(RagError::store(StoreKind::VectorIndex, e));
        }

        tracing::info!(file = %file_name, document_id = %document_id, "ingested document");
        Ok(IngestReceipt {
            file_name: file_name.to_string(),
            document_id,
        })
    }

    async fn compensate(&self, file_name: &str) {
        if !self.config.compensate_orphans {
            tracing::warn!(file = %file_name, "ingestion failed after upload; blob left in object store");
            return;
        }
        match self
            .object_store
            .delete_object(&self.config.bucket, file_name)
            .await
        {
            Ok(()) => tracing::info!(file = %file_name, "removed orphaned blob"),
            Err(e) => tracing::warn!(file = %file_name, error = %format!("{:#}", e), "failed to remove orphaned blob"),
        }
    }
}

fn new_document_id(file_name: &str) -> String {
    format!("{}-{}", file_name, Uuid::new_v4())
}
