//! Frontend proxy tests: the proxy in front of a real API server, and in
//! front of nothing.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;

use ragops::audit::SqliteAuditLog;
use ragops::config::Config;
use ragops::memory::{InMemoryObjectStore, InMemoryVectorIndex};
use ragops::models::ChatMessage;
use ragops::pipeline::{PipelineConfig, RagService};
use ragops::proxy::run_proxy;
use ragops::server::run_server_with_services;
use ragops::traits::GenerationClient;

struct EchoChat;

#[async_trait]
impl GenerationClient for EchoChat {
    async fn chat(&self, model: &str, _messages: &[ChatMessage]) -> Result<String> {
        Ok(format!("answered by {}", model))
    }
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_port(port: u16) {
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .is_ok()
        {
            return;
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

/// Start an API server, returning its base URL.
async fn start_backend(tmp: &TempDir) -> String {
    let port = find_free_port();
    let mut cfg = Config::default();
    cfg.db.path = tmp.path().join("ragops.sqlite");
    cfg.server.bind = format!("127.0.0.1:{}", port);

    let audit = Arc::new(SqliteAuditLog::open(&cfg.db).await.unwrap());
    let service = Arc::new(RagService::new(
        Arc::new(InMemoryObjectStore::new()),
        Arc::new(InMemoryVectorIndex::new()),
        audit,
        Arc::new(EchoChat),
        PipelineConfig::from_config(&cfg),
    ));
    tokio::spawn(async move {
        run_server_with_services(&cfg, service).await.ok();
    });
    wait_for_port(port).await;
    format!("http://127.0.0.1:{}", port)
}

/// Start a proxy forwarding to `backend_url`, returning its base URL.
async fn start_proxy(backend_url: &str) -> String {
    let port = find_free_port();
    let mut cfg = Config::default();
    cfg.proxy.bind = format!("127.0.0.1:{}", port);
    cfg.proxy.backend_url = backend_url.to_string();

    tokio::spawn(async move {
        run_proxy(&cfg).await.ok();
    });
    wait_for_port(port).await;
    format!("http://127.0.0.1:{}", port)
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_proxy_forwards_upload_and_query() {
    let tmp = TempDir::new().unwrap();
    let backend = start_backend(&tmp).await;
    let proxy = start_proxy(&backend).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/health", proxy)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "online");

    let part = reqwest::multipart::Part::bytes(b"cats are great".to_vec())
        .file_name("a.txt")
        .mime_str("text/plain")
        .unwrap();
    let resp = client
        .post(format!("{}/upload", proxy))
        .multipart(reqwest::multipart::Form::new().part("file", part))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert!(body["vector_id"].as_str().unwrap().starts_with("a.txt-"));

    let resp = client
        .post(format!("{}/query", proxy))
        .json(&json!({ "query": "tell me about cats" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["context_sources"], json!(["a.txt"]));
    assert_eq!(body["answer"], "answered by llama3.2");
}

#[tokio::test]
async fn test_proxy_wraps_backend_errors() {
    let tmp = TempDir::new().unwrap();
    let backend = start_backend(&tmp).await;
    let proxy = start_proxy(&backend).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/query", proxy))
        .json(&json!({ "query": "" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("detail"));
}

#[tokio::test]
async fn test_proxy_validates_locally() {
    let proxy = start_proxy("http://127.0.0.1:1").await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/query", proxy))
        .json(&json!({ "model": "llama3.2" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No query provided");

    let form = reqwest::multipart::Form::new().text("note", "nothing");
    let resp = client
        .post(format!("{}/upload", proxy))
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No file provided");

    let part = reqwest::multipart::Part::bytes(b"x".to_vec()).file_name("");
    let resp = client
        .post(format!("{}/upload", proxy))
        .multipart(reqwest::multipart::Form::new().part("file", part))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "No file selected");
}

#[tokio::test]
async fn test_proxy_reports_offline_backend() {
    let dead = format!("http://127.0.0.1:{}", find_free_port());
    let proxy = start_proxy(&dead).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/health", proxy)).send().await.unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "offline");

    let resp = client
        .post(format!("{}/query", proxy))
        .json(&json!({ "query": "anything" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Cannot connect to backend server");
}
