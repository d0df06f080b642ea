//! Frontend proxy.
//!
//! A thin forwarding server for browser clients that cannot reach the API
//! directly. It validates the obvious cases itself and relays everything
//! else to `[proxy].backend_url`. Errors use `{"error": "..."}` rather than
//! the API's `{"detail": "..."}`.
//!
//! | Method | Path | Forwards to |
//! |--------|------|-------------|
//! | `POST` | `/upload` | `POST {backend}/upload` (multipart, field `file`) |
//! | `POST` | `/query` | `POST {backend}/query` |
//! | `GET`  | `/health` | `GET {backend}/health`, 2 s timeout |
//!
//! Non-200 backend responses are wrapped as `{"error": <backend body>}` with
//! the backend's status code.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::time::Duration;
use tower_http::trace::TraceLayer;

use crate::config::{Config, DEFAULT_MODEL};

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone)]
struct ProxyState {
    client: reqwest::Client,
    backend: String,
}

/// Start the proxy on `[proxy].bind`. Runs until the process is terminated.
pub async fn run_proxy(config: &Config) -> anyhow::Result<()> {
    let app = proxy_router(&config.proxy.backend_url)?;
    let listener = tokio::net::TcpListener::bind(&config.proxy.bind).await?;

    tracing::info!(
        "Proxy listening on http://{} (backend {})",
        config.proxy.bind,
        config.proxy.backend_url
    );
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn proxy_router(backend_url: &str) -> anyhow::Result<Router> {
    let state = ProxyState {
        client: reqwest::Client::builder().build()?,
        backend: backend_url.trim_end_matches('/').to_string(),
    };

    Ok(Router::new()
        .route("/upload", post(handle_upload))
        .route("/query", post(handle_query))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({ "error": message.into() }))).into_response()
}

/// Map a forwarding failure. Connection failures become 503.
fn transport_error(err: reqwest::Error) -> Response {
    if err.is_connect() {
        tracing::warn!(error = %err, "backend unreachable");
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Cannot connect to backend server",
        )
    } else {
        error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
    }
}

/// Pass a 200 JSON body through; wrap anything else as `{"error": body}`.
async fn relay(resp: reqwest::Response) -> Response {
    let status = StatusCode::from_u16(resp.status().as_u16())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let text = match resp.text().await {
        Ok(t) => t,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    if status == StatusCode::OK {
        match serde_json::from_str::<Value>(&text) {
            Ok(body) => Json(body).into_response(),
            Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        }
    } else {
        error_response(status, text)
    }
}

async fn handle_upload(State(state): State<ProxyState>, mut multipart: Multipart) -> Response {
    let mut file = None;
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) if field.name() == Some("file") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field.content_type().map(str::to_string);
                match field.bytes().await {
                    Ok(data) => file = Some((file_name, content_type, data)),
                    Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
                }
                break;
            }
            Ok(Some(_)) => continue,
            Ok(None) => break,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        }
    }

    let Some((file_name, content_type, data)) = file else {
        return error_response(StatusCode::BAD_REQUEST, "No file provided");
    };
    if file_name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No file selected");
    }

    let form = match upload_form(file_name, content_type, data) {
        Ok(form) => form,
        Err(e) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };

    match state
        .client
        .post(format!("{}/upload", state.backend))
        .multipart(form)
        .send()
        .await
    {
        Ok(resp) => relay(resp).await,
        Err(e) => transport_error(e),
    }
}

fn upload_form(
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
) -> reqwest::Result<reqwest::multipart::Form> {
    let mut part = reqwest::multipart::Part::bytes(data.to_vec()).file_name(file_name);
    if let Some(ct) = content_type {
        part = part.mime_str(&ct)?;
    }
    Ok(reqwest::multipart::Form::new().part("file", part))
}

async fn handle_query(State(state): State<ProxyState>, body: Bytes) -> Response {
    let data: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    let Some(query) = data.get("query") else {
        return error_response(StatusCode::BAD_REQUEST, "No query provided");
    };
    let model = data
        .get("model")
        .cloned()
        .unwrap_or_else(|| Value::String(DEFAULT_MODEL.to_string()));

    match state
        .client
        .post(format!("{}/query", state.backend))
        .json(&json!({ "query": query, "model": model }))
        .send()
        .await
    {
        Ok(resp) => relay(resp).await,
        Err(e) => transport_error(e),
    }
}

async fn handle_health(State(state): State<ProxyState>) -> Response {
    let probe = state
        .client
        .get(format!("{}/health", state.backend))
        .timeout(HEALTH_TIMEOUT)
        .send()
        .await;

    match probe {
        Ok(resp) if resp.status() == reqwest::StatusCode::OK => {
            Json(json!({ "status": "online" })).into_response()
        }
        Ok(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "status": "error" })),
        )
            .into_response(),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "offline" })),
        )
            .into_response(),
    }
}
