//! In-memory collaborators for tests and offline runs.
//!
//! [`InMemoryVectorIndex`] ranks by keyword overlap instead of embeddings:
//! an entry scores one point per lowercase query term found in its text,
//! entries with no matching term are skipped, and ties keep insertion order.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{AuditEntry, IndexEntry, IndexMatch, NewAuditEntry};
use crate::traits::{AuditLog, ObjectStore, VectorIndex};

/// Object store backed by a `HashMap`. Putting into a missing bucket
/// creates it.
#[derive(Default)]
pub struct InMemoryObjectStore {
    buckets: RwLock<HashSet<String>>,
    objects: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .read()
            .unwrap()
            .contains_key(&(bucket.to_string(), key.to_string()))
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().unwrap().len()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        self.buckets.write().unwrap().insert(bucket.to_string());
        self.objects
            .write()
            .unwrap()
            .insert((bucket.to_string(), key.to_string()), data.to_vec());
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .objects
            .read()
            .unwrap()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned())
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.objects
            .write()
            .unwrap()
            .remove(&(bucket.to_string(), key.to_string()));
        Ok(())
    }

    async fn bucket_exists(&self, bucket: &str) -> Result<bool> {
        Ok(self.buckets.read().unwrap().contains(bucket))
    }

    async fn create_bucket(&self, bucket: &str) -> Result<()> {
        self.buckets.write().unwrap().insert(bucket.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<Vec<IndexEntry>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.read().unwrap().iter().any(|e| e.id == id)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn add(&self, entry: &IndexEntry) -> Result<()> {
        let mut entries = self.entries.write().unwrap();
        entries.retain(|e| e.id != entry.id);
        entries.push(entry.clone());
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<IndexMatch>> {
        let query_lower = text.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().unwrap();
        let mut scored: Vec<(usize, &IndexEntry)> = entries
            .iter()
            .filter_map(|e| {
                let text_lower = e.text.to_lowercase();
                let hits = terms.iter().filter(|t| text_lower.contains(*t)).count();
                (hits > 0).then_some((hits, e))
            })
            .collect();
        // sort_by is stable, so equal scores stay in insertion order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(hits, e)| IndexMatch {
                id: e.id.clone(),
                text: e.text.clone(),
                source: e.source.clone(),
                distance: Some(1.0 / (1.0 + hits as f32)),
            })
            .collect())
    }
}

/// Audit log kept in a `Vec`; ids start at 1.
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().unwrap().clone()
    }
}

#[async_trait]
impl AuditLog for InMemoryAuditLog {
    async fn append(&self, entry: &NewAuditEntry) -> Result<i64> {
        let mut entries = self.entries.write().unwrap();
        let id = entries.last().map(|e| e.id + 1).unwrap_or(1);
        entries.push(AuditEntry {
            id,
            timestamp: entry.timestamp,
            user_query: entry.user_query.clone(),
            retrieved_doc_ids: entry.retrieved_doc_ids.clone(),
            generated_response: entry.generated_response.clone(),
            model_used: entry.model_used.clone(),
            execution_time: entry.execution_time,
        });
        Ok(id)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let entries = self.entries.read().unwrap();
        Ok(entries
            .iter()
            .rev()
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }
}
