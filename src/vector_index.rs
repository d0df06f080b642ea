//! Chroma vector index client.
//!
//! Uses the Chroma REST API (v2) with embeddings computed locally by an
//! [`Embedder`]. Collections live under a tenant and database
//! (`default_tenant` / `default_database` unless configured). The
//! collection is resolved with `get_or_create` on first use and its id is
//! cached for the life of the client.
//!
//! Paths below are relative to
//! `/api/v2/tenants/{tenant}/databases/{database}/collections`.
//!
//! | Trait method | Chroma call |
//! |--------------|-------------|
//! | (first use) | `POST .` `{name, get_or_create: true}` |
//! | `add` | `POST ./{id}/add` |
//! | `query` | `POST ./{id}/query` |
//!
//! Query responses are column-oriented and nested one level per query
//! embedding; [`matches_from_response`] flattens the first (only) row into
//! [`IndexMatch`] values before anything leaves this module.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;

use crate::config::VectorIndexConfig;
use crate::embedding::Embedder;
use crate::models::{IndexEntry, IndexMatch};
use crate::traits::VectorIndex;

pub struct ChromaIndex {
    client: reqwest::Client,
    url: String,
    collections_url: String,
    collection: String,
    collection_id: OnceCell<String>,
    embedder: Arc<dyn Embedder>,
}

#[derive(Deserialize)]
struct CollectionResponse {
    id: String,
}

/// Wire shape of `/query`. Every field is a list per query embedding.
#[derive(Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<serde_json::Map<String, serde_json::Value>>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<Option<f32>>>>,
}

impl ChromaIndex {
    pub fn new(config: &VectorIndexConfig, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        let url = config.url.trim_end_matches('/').to_string();
        Ok(Self {
            client,
            collections_url: collections_url(&url, &config.tenant, &config.database),
            url,
            collection: config.collection.clone(),
            collection_id: OnceCell::new(),
            embedder,
        })
    }

    /// Resolve (creating if needed) the collection and return its id.
    pub async fn ensure_collection(&self) -> Result<&str> {
        let id = self
            .collection_id
            .get_or_try_init(|| async {
                let resp = self
                    .client
                    .post(&self.collections_url)
                    .json(&serde_json::json!({
                        "name": self.collection,
                        "get_or_create": true,
                    }))
                    .send()
                    .await
                    .with_context(|| format!("Failed to reach Chroma at {}", self.url))?;

                if !resp.status().is_success() {
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    bail!(
                        "Chroma get_or_create_collection '{}' failed (HTTP {}): {}",
                        self.collection,
                        status,
                        body
                    );
                }

                let collection: CollectionResponse = resp.json().await?;
                tracing::debug!(
                    collection = %self.collection,
                    id = %collection.id,
                    "resolved chroma collection"
                );
                Ok::<_, anyhow::Error>(collection.id)
            })
            .await?;
        Ok(id.as_str())
    }
}

#[async_trait]
impl VectorIndex for ChromaIndex {
    async fn add(&self, entry: &IndexEntry) -> Result<()> {
        let embedding = self
            .embedder
            .embed_one(&entry.text)
            .await
            .with_context(|| {
                format!(
                    "Failed to embed document {} with {}",
                    entry.id,
                    self.embedder.model_name()
                )
            })?;

        let collection_id = self.ensure_collection().await?;

        let body = serde_json::json!({
            "ids": [entry.id],
            "embeddings": [embedding],
            "metadatas": [{ "source": entry.source }],
            "documents": [entry.text],
        });

        let resp = self
            .client
            .post(format!("{}/{}/add", self.collections_url, collection_id))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to add {} to Chroma", entry.id))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Chroma add failed (HTTP {}): {}", status, body);
        }
        Ok(())
    }

    async fn query(&self, text: &str, top_k: usize) -> Result<Vec<IndexMatch>> {
        let embedding = self
            .embedder
            .embed_one(text)
            .await
            .with_context(|| format!("Failed to embed query with {}", self.embedder.model_name()))?;

        let collection_id = self.ensure_collection().await?;

        let body = serde_json::json!({
            "query_embeddings": [embedding],
            "n_results": top_k,
            "include": ["documents", "metadatas", "distances"],
        });

        let resp = self
            .client
            .post(format!("{}/{}/query", self.collections_url, collection_id))
            .json(&body)
            .send()
            .await
            .context("Failed to query Chroma")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            bail!("Chroma query failed (HTTP {}): {}", status, body);
        }

        let parsed: QueryResponse = resp.json().await?;
        matches_from_response(parsed)
    }
}

fn collections_url(base: &str, tenant: &str, database: &str) -> String {
    format!(
        "{}/api/v2/tenants/{}/databases/{}/collections",
        base, tenant, database
    )
}

/// Flatten the first result row of a Chroma query response.
fn matches_from_response(resp: QueryResponse) -> Result<Vec<IndexMatch>> {
    let ids = resp.ids.into_iter().next().unwrap_or_default();
    let documents = resp
        .documents
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();
    let metadatas = resp
        .metadatas
        .and_then(|m| m.into_iter().next())
        .unwrap_or_default();
    let distances = resp
        .distances
        .and_then(|d| d.into_iter().next())
        .unwrap_or_default();

    if documents.len() != ids.len() {
        bail!(
            "Malformed Chroma response: {} ids but {} documents",
            ids.len(),
            documents.len()
        );
    }

    let matches = ids
        .into_iter()
        .enumerate()
        .map(|(i, id)| {
            let source = metadatas
                .get(i)
                .and_then(|m| m.as_ref())
                .and_then(|m| m.get("source"))
                .and_then(|s| s.as_str())
                .unwrap_or_default()
                .to_string();
            IndexMatch {
                text: documents[i].clone().unwrap_or_default(),
                source,
                distance: distances.get(i).copied().flatten(),
                id,
            }
        })
        .collect();

    Ok(matches)
}
