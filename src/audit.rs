//! SQLite-backed [`AuditLog`].
//!
//! One row per answered query in `audit_logs`. Rows are only ever
//! inserted; ids come from SQLite's `AUTOINCREMENT`, so they increase
//! strictly and are never reused. `retrieved_doc_ids` is stored
//! comma-joined; reads use the JSON copy in `retrieved_doc_ids_json` and
//! only split the joined column for rows written before that existed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::config::DbConfig;
use crate::db;
use crate::migrate;
use crate::models::{AuditEntry, NewAuditEntry};
use crate::traits::AuditLog;

pub struct SqliteAuditLog {
    pool: SqlitePool,
}

impl SqliteAuditLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect and run migrations.
    pub async fn open(config: &DbConfig) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub async fn get(&self, id: i64) -> Result<Option<AuditEntry>> {
        let row = sqlx::query(
            "SELECT id, timestamp, user_query, retrieved_doc_ids, retrieved_doc_ids_json,
                    generated_response, model_used, execution_time
             FROM audit_logs WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| entry_from_row(&r)).transpose()
    }

    pub async fn count(&self) -> Result<i64> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_logs")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }
}

#[async_trait]
impl AuditLog for SqliteAuditLog {
    async fn append(&self, entry: &NewAuditEntry) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (timestamp, user_query, retrieved_doc_ids,
                                    retrieved_doc_ids_json, generated_response,
                                    model_used, execution_time)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.timestamp.to_rfc3339())
        .bind(&entry.user_query)
        .bind(entry.retrieved_doc_ids.join(","))
        .bind(serde_json::to_string(&entry.retrieved_doc_ids)?)
        .bind(&entry.generated_response)
        .bind(&entry.model_used)
        .bind(entry.execution_time)
        .execute(&self.pool)
        .await
        .context("Failed to insert audit log entry")?;

        Ok(result.last_insert_rowid())
    }

    async fn recent(&self, limit: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query(
            "SELECT id, timestamp, user_query, retrieved_doc_ids, retrieved_doc_ids_json,
                    generated_response, model_used, execution_time
             FROM audit_logs ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry> {
    let timestamp: String = row.get("timestamp");
    let timestamp = DateTime::parse_from_rfc3339(&timestamp)
        .with_context(|| format!("Bad audit timestamp: {}", timestamp))?
        .with_timezone(&Utc);
    let retrieved_doc_ids = match row.get::<Option<String>, _>("retrieved_doc_ids_json") {
        Some(json) => serde_json::from_str(&json)
            .with_context(|| format!("Bad retrieved_doc_ids_json: {}", json))?,
        None => split_ids(
            row.get::<Option<String>, _>("retrieved_doc_ids")
                .as_deref()
                .unwrap_or(""),
        ),
    };

    Ok(AuditEntry {
        id: row.get("id"),
        timestamp,
        user_query: row.get("user_query"),
        retrieved_doc_ids,
        generated_response: row
            .get::<Option<String>, _>("generated_response")
            .unwrap_or_default(),
        model_used: row.get("model_used"),
        execution_time: row.get::<Option<f64>, _>("execution_time").unwrap_or(0.0),
    })
}

/// Legacy rows only; ids containing commas cannot be recovered here.
fn split_ids(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        Vec::new()
    } else {
        joined.split(',').map(str::to_string).collect()
    }
}
