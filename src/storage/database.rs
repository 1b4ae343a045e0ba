use sqlx::{SqlitePool, sqlite::SqlitePoolOptions};
use tracing::info;

use crate::parser::ProcessedDocument;
use crate::storage::models::{QueryRun, StoredDocument};
use crate::utils::DocsiftResult;

pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub async fn new(database_url: &str) -> DocsiftResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(
                database_url.parse::<sqlx::sqlite::SqliteConnectOptions>()?
                    .create_if_missing(true)
            )
            .await?;

        info!("数据库连接成功: {}", database_url);
        Ok(Self { pool })
    }

    pub async fn init_schema(&self) -> DocsiftResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                filename TEXT NOT NULL UNIQUE,
                original_name TEXT NOT NULL,
                outline_json TEXT NOT NULL,
                sections_json TEXT NOT NULL,
                line_count INTEGER NOT NULL DEFAULT 0,
                row_count INTEGER NOT NULL DEFAULT 0,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS query_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                mode TEXT NOT NULL,
                query_text TEXT NOT NULL,
                output_json TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("数据库表结构初始化完成");
        Ok(())
    }

    /// 保存提取结果，同名文件覆盖
    pub async fn save_document(
        &self,
        filename: &str,
        original_name: &str,
        document: &ProcessedDocument,
    ) -> DocsiftResult<i64> {
        let outline_json = serde_json::to_string(&document.outline)?;
        let sections_json = serde_json::to_string(&document.sections)?;

        let result = sqlx::query(
            r#"
            INSERT INTO documents (filename, original_name, outline_json, sections_json, line_count, row_count)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(filename) DO UPDATE SET
                original_name = excluded.original_name,
                outline_json = excluded.outline_json,
                sections_json = excluded.sections_json,
                line_count = excluded.line_count,
                row_count = excluded.row_count
            "#,
        )
        .bind(filename)
        .bind(original_name)
        .bind(outline_json)
        .bind(sections_json)
        .bind(document.line_count as i64)
        .bind(document.row_count as i64)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn get_document(&self, filename: &str) -> DocsiftResult<Option<StoredDocument>> {
        let document = sqlx::query_as::<_, StoredDocument>(
            "SELECT * FROM documents WHERE filename = ?"
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(document)
    }

    pub async fn list_documents(&self) -> DocsiftResult<Vec<StoredDocument>> {
        let documents = sqlx::query_as::<_, StoredDocument>(
            "SELECT * FROM documents ORDER BY id"
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(documents)
    }

    pub async fn save_query_run(&self, mode: &str, query_text: &str, output_json: &str) -> DocsiftResult<i64> {
        let result = sqlx::query(
            "INSERT INTO query_runs (mode, query_text, output_json) VALUES (?, ?, ?)"
        )
        .bind(mode)
        .bind(query_text)
        .bind(output_json)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    pub async fn recent_query_runs(&self, limit: i64) -> DocsiftResult<Vec<QueryRun>> {
        let runs = sqlx::query_as::<_, QueryRun>(
            "SELECT * FROM query_runs ORDER BY id DESC LIMIT ?"
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(runs)
    }

    /// 清空所有表
    pub async fn clear_all_tables(&self) -> DocsiftResult<()> {
        sqlx::query("DELETE FROM documents").execute(&self.pool).await?;
        sqlx::query("DELETE FROM query_runs").execute(&self.pool).await?;
        info!("已清空 documents 和 query_runs 表");
        Ok(())
    }
}
