//! Question → retrieval → prompt → chat → audit.

use std::time::Instant;

use chrono::Utc;

use super::RagService;
use crate::error::{RagError, Result, StoreKind};
use crate::models::{Answer, ChatMessage, NewAuditEntry};
use crate::prompt;

impl RagService {
    /// Answer `query` with `model` (the configured default when `None` or
    /// empty). Generation failures are not audited and not retried.
    pub async fn answer(&self, query: &str, model: Option<&str>) -> Result<Answer> {
        if query.is_empty() {
            return Err(RagError::validation("query must not be empty"));
        }
        let model = match model {
            Some(m) if !m.is_empty() => m,
            _ => self.config.default_model.as_str(),
        };
        let started = Instant::now();

        let matches = self
            .index
            .query(query, self.config.top_k)
            .await
            .map_err(|e| RagError::store(StoreKind::VectorIndex, e))?;

        let context = prompt::build_context(&matches, &self.config.empty_context);
        let prompt = prompt::render(&self.config.prompt_template, &context, query);
        tracing::debug!(
            matches = matches.len(),
            distances = ?matches.iter().map(|m| m.distance).collect::<Vec<_>>(),
            prompt_chars = prompt.len(),
            "assembled prompt"
        );

        let answer = self
            .generator
            .chat(model, &[ChatMessage::user(prompt)])
            .await
            .map_err(|e| {
                tracing::warn!(model = %model, error = %format!("{:#}", e), "generation failed");
                RagError::generation(e)
            })?;

        let execution_time = started.elapsed().as_secs_f64();
        let (retrieved_ids, sources): (Vec<String>, Vec<String>) =
            matches.into_iter().map(|m| (m.id, m.source)).unzip();

        let audit_id = self
            .audit
            .append(&NewAuditEntry {
                timestamp: Utc::now(),
                user_query: query.to_string(),
                retrieved_doc_ids: retrieved_ids.clone(),
                generated_response: answer.clone(),
                model_used: model.to_string(),
                execution_time,
            })
            .await
            .map_err(|e| RagError::store(StoreKind::AuditLog, e))?;

        tracing::info!(
            audit_id,
            model = %model,
            sources = sources.len(),
            elapsed_ms = (execution_time * 1000.0) as u64,
            "answered query"
        );

        Ok(Answer {
            answer,
            sources,
            retrieved_ids,
            audit_id,
        })
    }
}
