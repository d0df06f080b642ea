use anyhow::Result;
use sqlx::SqlitePool;

/// Create the `audit_logs` table and its index. Idempotent.
///
/// `retrieved_doc_ids` keeps the comma-joined form; `retrieved_doc_ids_json`
/// holds the same ids as a JSON array so ids containing commas read back
/// intact. Tables created before the JSON column existed get it added.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp TEXT NOT NULL,
            user_query TEXT NOT NULL,
            retrieved_doc_ids TEXT,
            retrieved_doc_ids_json TEXT,
            generated_response TEXT,
            model_used TEXT NOT NULL,
            execution_time REAL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let has_json_column: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM pragma_table_info('audit_logs') WHERE name = 'retrieved_doc_ids_json'",
    )
    .fetch_one(pool)
    .await?;
    if has_json_column == 0 {
        sqlx::query("ALTER TABLE audit_logs ADD COLUMN retrieved_doc_ids_json TEXT")
            .execute(pool)
            .await?;
    }

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_logs_timestamp ON audit_logs(timestamp)")
        .execute(pool)
        .await?;

    Ok(())
}
