//! Ollama chat client.
//!
//! Calls `POST /api/chat` with `stream: false` and returns the assistant
//! message content. A single attempt per call; the only time limit is the
//! HTTP client timeout from `[generation] timeout_secs`.
//!
//! Ollama reports failures as `{"error": "..."}` with a non-2xx status
//! (e.g. `model "x" not found, try pulling it first`). That message is
//! surfaced verbatim so it reaches the `Ollama Error: ...` response detail.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::models::ChatMessage;
use crate::traits::GenerationClient;

pub struct OllamaChat {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

impl OllamaChat {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.trim_end_matches('/').to_string(),
        })
    }

    /// `GET /api/tags`; used by the CLI to warn early when Ollama is down.
    pub async fn ping(&self) -> bool {
        match self.client.get(format!("{}/api/tags", self.url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl GenerationClient for OllamaChat {
    async fn chat(&self, model: &str, messages: &[ChatMessage]) -> Result<String> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": false,
        });

        let resp = self
            .client
            .post(format!("{}/api/chat", self.url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to connect to Ollama at {}", self.url))?;

        let status = resp.status();
        let text = resp.text().await.context("Failed to read Ollama response")?;

        if !status.is_success() {
            bail!("{} (status code: {})", upstream_message(&text), status.as_u16());
        }

        parse_chat_response(&text)
    }
}

fn parse_chat_response(text: &str) -> Result<String> {
    let parsed: ChatResponse =
        serde_json::from_str(text).context("Invalid Ollama chat response")?;
    Ok(parsed.message.content)
}

/// The `error` field of an Ollama error body, or the raw body.
fn upstream_message(body: &str) -> String {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(e) => e.error,
        Err(_) => body.chars().take(500).collect(),
    }
}
