//! CLI command implementations.
//!
//! Each `run_*` function loads nothing itself: it takes a parsed
//! [`Config`], a ready [`RagService`] or the one store it reads, and prints
//! results to stdout.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::audit::SqliteAuditLog;
use crate::config::Config;
use crate::embedding::OllamaEmbedder;
use crate::generation::OllamaChat;
use crate::object_store::S3ObjectStore;
use crate::pipeline::RagService;
use crate::traits::{AuditLog, ObjectStore};
use crate::vector_index::ChromaIndex;

/// Prepare every external store: audit table, bucket and collection.
pub async fn run_init(config: &Config) -> Result<()> {
    SqliteAuditLog::open(&config.db).await?;
    println!("Audit database ready at {}", config.db.path.display());

    let store = S3ObjectStore::new(&config.object_store)?;
    store
        .ensure_bucket(&config.object_store.bucket)
        .await
        .with_context(|| format!("Failed to ensure bucket '{}'", config.object_store.bucket))?;
    println!("Bucket '{}' ready", config.object_store.bucket);

    let embedder = Arc::new(OllamaEmbedder::new(
        config.embedding_url(),
        &config.vector_index.embedding_model,
        config.vector_index.timeout_secs,
    )?);
    let index = ChromaIndex::new(&config.vector_index, embedder)?;
    let collection_id = index.ensure_collection().await?;
    println!(
        "Collection '{}' ready ({})",
        config.vector_index.collection, collection_id
    );

    let chat = OllamaChat::new(&config.generation)?;
    if !chat.ping().await {
        eprintln!(
            "Warning: Ollama is not reachable at {}; queries will fail until it is",
            config.generation.url
        );
    }
    Ok(())
}

pub async fn run_upload(service: &RagService, path: &Path) -> Result<()> {
    let data = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("No usable file name in {}", path.display()))?;

    let receipt = service.ingest(file_name, &data).await?;
    println!("Uploaded {}", receipt.file_name);
    println!("  vector_id: {}", receipt.document_id);
    Ok(())
}

pub async fn run_ask(service: &RagService, query: &str, model: Option<&str>) -> Result<()> {
    let answer = service.answer(query, model).await?;

    println!("{}", answer.answer);
    println!();
    if answer.sources.is_empty() {
        println!("Sources: (none)");
    } else {
        println!("Sources:");
        for (source, id) in answer.sources.iter().zip(&answer.retrieved_ids) {
            println!("  {} ({})", source, id);
        }
    }
    println!("Audit id: {}", answer.audit_id);
    Ok(())
}

/// Print the newest `limit` audit rows. Only the audit store is touched.
pub async fn run_audit(audit: &dyn AuditLog, limit: i64) -> Result<()> {
    let entries = audit.recent(limit).await?;
    if entries.is_empty() {
        println!("No audit entries.");
        return Ok(());
    }

    for e in entries {
        println!(
            "#{} {} [{}] {:.2}s",
            e.id,
            e.timestamp.format("%Y-%m-%d %H:%M:%S"),
            e.model_used,
            e.execution_time
        );
        println!("  Q: {}", e.user_query);
        println!("  A: {}", first_line(&e.generated_response, 100));
        if !e.retrieved_doc_ids.is_empty() {
            println!("  docs: {}", e.retrieved_doc_ids.join(", "));
        }
    }
    Ok(())
}

fn first_line(text: &str, max_chars: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max_chars {
        let cut: String = line.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
