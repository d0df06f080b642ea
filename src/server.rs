//! HTTP facade over the ingestion and query pipelines.
//!
//! # Endpoints
//!
//! Every route except `GET /` is served twice: at the root and under
//! `[server].api_prefix` (default `/api/v1`). Both copies share handlers,
//! so request and response shapes are identical.
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Static liveness report; does not probe collaborators |
//! | `POST` | `/upload` | Multipart upload, field `file` |
//! | `POST` | `/query` | `{"query": "...", "model": "llama3.2"}` |
//! | `GET`  | `/audit` | Recent audit entries, `?limit=N` (default 20, max 200) |
//! | `GET`  | `/` | Service banner (root only) |
//!
//! # Error Contract
//!
//! Errors are `{"detail": "<message>"}`:
//!
//! | Status | Cause |
//! |--------|-------|
//! | 422 | empty query, missing `file` field, malformed JSON body |
//! | 503 | generation failed; detail is `Ollama Error: <upstream message>` |
//! | 500 | any other pipeline failure (decode, object store, index, audit) |

use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, Query, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::audit::SqliteAuditLog;
use crate::config::{Config, ServerConfig};
use crate::embedding::OllamaEmbedder;
use crate::error::RagError;
use crate::generation::OllamaChat;
use crate::models::AuditEntry;
use crate::object_store::S3ObjectStore;
use crate::pipeline::{PipelineConfig, RagService};
use crate::vector_index::ChromaIndex;

const DEFAULT_AUDIT_LIMIT: i64 = 20;
const MAX_AUDIT_LIMIT: i64 = 200;

#[derive(Clone)]
struct AppState {
    service: Arc<RagService>,
}

/// Construct the production collaborators from `config` and wire them
/// into a [`RagService`]. Runs audit migrations; does not contact MinIO,
/// Chroma or Ollama.
pub async fn build_services(config: &Config) -> anyhow::Result<Arc<RagService>> {
    let object_store = Arc::new(S3ObjectStore::new(&config.object_store)?);
    let embedder = Arc::new(OllamaEmbedder::new(
        config.embedding_url(),
        &config.vector_index.embedding_model,
        config.vector_index.timeout_secs,
    )?);
    let index = Arc::new(ChromaIndex::new(&config.vector_index, embedder)?);
    let audit = Arc::new(SqliteAuditLog::open(&config.db).await?);
    let generator = Arc::new(OllamaChat::new(&config.generation)?);

    Ok(Arc::new(RagService::new(
        object_store,
        index,
        audit,
        generator,
        PipelineConfig::from_config(config),
    )))
}

/// Start the HTTP facade on `[server].bind` with production collaborators.
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let service = build_services(config).await?;
    run_server_with_services(config, service).await
}

/// Like [`run_server`], but with caller-supplied collaborators.
pub async fn run_server_with_services(
    config: &Config,
    service: Arc<RagService>,
) -> anyhow::Result<()> {
    let app = router(&config.server, service);
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;

    tracing::info!(
        "API server listening on http://{} (prefix {})",
        config.server.bind,
        config.server.api_prefix
    );
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(config: &ServerConfig, service: Arc<RagService>) -> Router {
    let api = Router::new()
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload))
        .route("/query", post(handle_query))
        .route("/audit", get(handle_audit));

    let mut app = Router::new().route("/", get(handle_root)).merge(api.clone());
    // An empty prefix means the root set is the only one.
    if !config.api_prefix.is_empty() {
        app = app.nest(&config.api_prefix, api);
    }

    app.layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(cors_layer(&config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { service })
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return cors.allow_origin(Any);
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    cors.allow_origin(AllowOrigin::list(allowed))
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

struct AppError {
    status: StatusCode,
    detail: String,
}

impl AppError {
    fn unprocessable(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            detail: detail.into(),
        }
    }

    fn internal(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            detail: detail.into(),
        }
    }
}

impl From<RagError> for AppError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Validation(msg) => AppError::unprocessable(msg),
            RagError::GenerationUnavailable(msg) => AppError {
                status: StatusCode::SERVICE_UNAVAILABLE,
                detail: format!("Ollama Error: {}", msg),
            },
            other => AppError::internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, detail = %self.detail, "request failed");
        }
        (self.status, Json(ErrorBody { detail: self.detail })).into_response()
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    services: ServiceStatus,
}

#[derive(Serialize)]
struct ServiceStatus {
    database: &'static str,
    minio: &'static str,
    chromadb: &'static str,
    ollama: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        services: ServiceStatus {
            database: "connected",
            minio: "connected",
            chromadb: "connected",
            ollama: "connected",
        },
    })
}

// ============ GET / ============

async fn handle_root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "RAG Knowledge Base API",
        "version": env!("CARGO_PKG_VERSION"),
        "docs": "/docs",
    }))
}

// ============ POST /upload ============

#[derive(Serialize)]
struct UploadResponse {
    status: &'static str,
    file: String,
    vector_id: String,
}

async fn handle_upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::internal(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::internal(e.to_string()))?;
        upload = Some((file_name, data.to_vec()));
        break;
    }

    let (file_name, data) =
        upload.ok_or_else(|| AppError::unprocessable("field 'file' is required"))?;
    tracing::info!(file = %file_name, bytes = data.len(), "upload received");

    let receipt = state.service.ingest(&file_name, &data).await?;

    Ok(Json(UploadResponse {
        status: "success",
        file: receipt.file_name,
        vector_id: receipt.document_id,
    }))
}

// ============ POST /query ============

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Serialize)]
struct QueryResponse {
    answer: String,
    context_sources: Vec<String>,
    audit_id: i64,
}

async fn handle_query(
    State(state): State<AppState>,
    body: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<Json<QueryResponse>, AppError> {
    let Json(req) = body.map_err(|e| AppError::unprocessable(e.body_text()))?;

    let answer = state
        .service
        .answer(&req.query, req.model.as_deref())
        .await?;

    Ok(Json(QueryResponse {
        answer: answer.answer,
        context_sources: answer.sources,
        audit_id: answer.audit_id,
    }))
}

// ============ GET /audit ============

#[derive(Deserialize)]
struct AuditParams {
    limit: Option<i64>,
}

#[derive(Serialize)]
struct AuditResponse {
    entries: Vec<AuditEntry>,
}

async fn handle_audit(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> Result<Json<AuditResponse>, AppError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let entries = state.service.recent_audit(limit).await?;
    Ok(Json(AuditResponse { entries }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_and_detail(err: RagError) -> (StatusCode, String) {
        let app: AppError = err.into();
        (app.status, app.detail)
    }

    #[test]
    fn test_generation_maps_to_503_with_prefix() {
        let (status, detail) = status_and_detail(RagError::GenerationUnavailable(
            "model \"x\" not found".to_string(),
        ));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(detail, "Ollama Error: model \"x\" not found");
    }

    #[test]
    fn test_validation_maps_to_422() {
        let (status, _) = status_and_detail(RagError::validation("query must not be empty"));
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_store_failure_maps_to_500() {
        let err = RagError::store(
            crate::error::StoreKind::ObjectStore,
            anyhow::anyhow!("connection refused"),
        );
        let (status, detail) = status_and_detail(err);
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(detail.contains("connection refused"));
    }

    #[test]
    fn test_cors_skips_invalid_origins() {
        let _ = cors_layer(&["http://localhost:3000".to_string(), "bad\norigin".to_string()]);
        let _ = cors_layer(&[]);
    }

    struct NoChat;

    #[async_trait::async_trait]
    impl crate::traits::GenerationClient for NoChat {
        async fn chat(
            &self,
            _model: &str,
            _messages: &[crate::models::ChatMessage],
        ) -> anyhow::Result<String> {
            anyhow::bail!("unused")
        }
    }

    fn memory_service() -> Arc<RagService> {
        use crate::memory::{InMemoryAuditLog, InMemoryObjectStore, InMemoryVectorIndex};
        Arc::new(RagService::new(
            Arc::new(InMemoryObjectStore::new()),
            Arc::new(InMemoryVectorIndex::new()),
            Arc::new(InMemoryAuditLog::new()),
            Arc::new(NoChat),
            PipelineConfig::default(),
        ))
    }

    #[test]
    fn test_router_with_empty_prefix_mounts_root_only() {
        let cfg = crate::config::parse_config("[server]\napi_prefix = \"\"\n").unwrap();
        cfg.validate().unwrap();
        let _ = router(&cfg.server, memory_service());
    }

    #[test]
    fn test_router_with_default_prefix() {
        let _ = router(&ServerConfig::default(), memory_service());
    }
}
