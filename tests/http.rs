//! HTTP API tests: a real server on a free port with in-memory stores, a
//! temp SQLite audit log and stub chat clients.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use ragops::audit::SqliteAuditLog;
use ragops::config::Config;
use ragops::memory::{InMemoryObjectStore, InMemoryVectorIndex};
use ragops::models::{AuditEntry, ChatMessage, NewAuditEntry};
use ragops::pipeline::{PipelineConfig, RagService};
use ragops::server::run_server_with_services;
use ragops::traits::{AuditLog, GenerationClient};

struct EchoChat;

#[async_trait]
impl GenerationClient for EchoChat {
    async fn chat(&self, model: &str, _messages: &[ChatMessage]) -> Result<String> {
        Ok(format!("answered by {}", model))
    }
}

struct DownChat;

#[async_trait]
impl GenerationClient for DownChat {
    async fn chat(&self, _model: &str, _messages: &[ChatMessage]) -> Result<String> {
        bail!("Failed to connect to Ollama at http://localhost:11434")
    }
}

/// Audit store whose writes always fail.
struct FullDiskAudit;

#[async_trait]
impl AuditLog for FullDiskAudit {
    async fn append(&self, _entry: &NewAuditEntry) -> Result<i64> {
        bail!("disk full")
    }

    async fn recent(&self, _limit: i64) -> Result<Vec<AuditEntry>> {
        Ok(Vec::new())
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

struct TestServer {
    _tmp: TempDir,
    base: String,
    handle: tokio::task::JoinHandle<()>,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn start_server(chat: Arc<dyn GenerationClient>) -> TestServer {
    start_server_with(chat, None, |_| {}).await
}

/// Start a server; `audit` replaces the temp SQLite log when given.
async fn start_server_with(
    chat: Arc<dyn GenerationClient>,
    audit: Option<Arc<dyn AuditLog>>,
    configure: impl FnOnce(&mut Config),
) -> TestServer {
    let tmp = TempDir::new().unwrap();
    let port = find_free_port();

    let mut cfg = Config::default();
    cfg.db.path = tmp.path().join("ragops.sqlite");
    cfg.server.bind = format!("127.0.0.1:{}", port);
    configure(&mut cfg);
    cfg.validate().unwrap();

    let audit: Arc<dyn AuditLog> = match audit {
        Some(audit) => audit,
        None => Arc::new(SqliteAuditLog::open(&cfg.db).await.unwrap()),
    };
    let service = Arc::new(RagService::new(
        Arc::new(InMemoryObjectStore::new()),
        Arc::new(InMemoryVectorIndex::new()),
        audit,
        chat,
        PipelineConfig::from_config(&cfg),
    ));

    let handle = tokio::spawn(async move {
        run_server_with_services(&cfg, service).await.ok();
    });
    wait_for_server(port).await;

    TestServer {
        _tmp: tmp,
        base: format!("http://127.0.0.1:{}", port),
        handle,
    }
}

async fn upload(client: &reqwest::Client, url: &str, name: &str, data: &[u8]) -> reqwest::Response {
    let part = reqwest::multipart::Part::bytes(data.to_vec()).file_name(name.to_string());
    let form = reqwest::multipart::Form::new().part("file", part);
    client.post(url).multipart(form).send().await.unwrap()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_and_root() {
    let server = start_server(Arc::new(EchoChat)).await;
    let client = reqwest::Client::new();

    for path in ["/health", "/api/v1/health"] {
        let resp = client
            .get(format!("{}{}", server.base, path))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
        for svc in ["database", "minio", "chromadb", "ollama"] {
            assert_eq!(body["services"][svc], "connected");
        }
    }

    let resp = client.get(format!("{}/", server.base)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["message"], "RAG Knowledge Base API");
    assert_eq!(body["docs"], "/docs");
}

#[tokio::test]
async fn test_upload_then_query() {
    let server = start_server(Arc::new(EchoChat)).await;
    let client = reqwest::Client::new();

    let resp = upload(
        &client,
        &format!("{}/upload", server.base),
        "a.txt",
        b"cats are great",
    )
    .await;
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert_eq!(body["file"], "a.txt");
    assert!(body["vector_id"].as_str().unwrap().starts_with("a.txt-"));

    let resp = client
        .post(format!("{}/query", server.base))
        .json(&json!({ "query": "tell me about cats" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["context_sources"], json!(["a.txt"]));
    assert_eq!(body["audit_id"], 1);
    assert_eq!(body["answer"], "answered by llama3.2");
}

#[tokio::test]
async fn test_prefixed_routes_share_state() {
    let server = start_server(Arc::new(EchoChat)).await;
    let client = reqwest::Client::new();

    let resp = upload(
        &client,
        &format!("{}/api/v1/upload", server.base),
        "doc.txt",
        b"hello world",
    )
    .await;
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/query", server.base))
        .json(&json!({ "query": "hello", "model": "mistral" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["context_sources"], json!(["doc.txt"]));
    assert_eq!(body["answer"], "answered by mistral");

    let resp = client
        .post(format!("{}/api/v1/query", server.base))
        .json(&json!({ "query": "hello" }))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["audit_id"], 2);

    let resp = client
        .get(format!("{}/api/v1/audit?limit=1", server.base))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["id"], 2);
    assert_eq!(entries[0]["model_used"], "llama3.2");
}

#[tokio::test]
async fn test_root_banner_not_under_prefix() {
    let server = start_server(Arc::new(EchoChat)).await;
    let resp = reqwest::get(format!("{}/api/v1/", server.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_empty_query_is_422() {
    let server = start_server(Arc::new(EchoChat)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/query", server.base))
        .json(&json!({ "query": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("empty"));

    let resp = client
        .post(format!("{}/query", server.base))
        .json(&json!({ "model": "llama3.2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_upload_without_file_field_is_422() {
    let server = start_server(Arc::new(EchoChat)).await;
    let client = reqwest::Client::new();

    let form = reqwest::multipart::Form::new().text("note", "no file here");
    let resp = client
        .post(format!("{}/upload", server.base))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
}

#[tokio::test]
async fn test_non_utf8_upload_is_500() {
    let server = start_server(Arc::new(EchoChat)).await;
    let client = reqwest::Client::new();

    let resp = upload(
        &client,
        &format!("{}/upload", server.base),
        "blob.bin",
        &[0xff, 0xfe, 0xfd],
    )
    .await;
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert!(body["detail"].as_str().unwrap().contains("blob.bin"));
}

#[tokio::test]
async fn test_generation_failure_is_503() {
    let server = start_server(Arc::new(DownChat)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/query", server.base))
        .json(&json!({ "query": "tell me about cats" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("Ollama Error: "));
    assert!(detail.contains("Failed to connect to Ollama"));

    let resp = client
        .get(format!("{}/audit", server.base))
        .send()
        .await
        .unwrap();
    let body: Value = resp.json().await.unwrap();
    assert!(body["entries"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_audit_write_failure_is_500() {
    let server = start_server_with(Arc::new(EchoChat), Some(Arc::new(FullDiskAudit)), |_| {}).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/query", server.base))
        .json(&json!({ "query": "tell me about cats" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.contains("audit log"));
    assert!(detail.contains("disk full"));
}

#[tokio::test]
async fn test_empty_prefix_serves_root_routes_only() {
    let server = start_server_with(Arc::new(EchoChat), None, |cfg| {
        cfg.server.api_prefix = String::new();
    })
    .await;

    let resp = reqwest::get(format!("{}/health", server.base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let resp = reqwest::get(format!("{}/api/v1/health", server.base))
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_whitespace_query_is_answered() {
    let server = start_server(Arc::new(EchoChat)).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/query", server.base))
        .json(&json!({ "query": " " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["context_sources"], json!([]));
}
