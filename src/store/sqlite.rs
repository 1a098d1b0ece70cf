//! SQLite 存储（sqlx，完全异步）
//!
//! 需要启用 `sqlite` feature。files 以 JSON 文本保存。

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use super::{
    now_rfc3339, ArtifactRecord, ArtifactStore, MessageRecord, MessageRole, MessageType,
    StoreError,
};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;
        let store = Self { pool };
        store.init_tables().await?;
        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                project_id TEXT NOT NULL,
                content TEXT NOT NULL,
                role TEXT NOT NULL,
                kind TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS artifacts (
                id TEXT PRIMARY KEY,
                message_id TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                files TEXT NOT NULL,
                preview_handle TEXT NOT NULL,
                created_at TEXT NOT NULL,
                FOREIGN KEY (message_id) REFERENCES messages(id) ON DELETE CASCADE
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_project ON messages(project_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn message_from_row(row: &SqliteRow) -> Result<MessageRecord, StoreError> {
    let role: String = row.get("role");
    let kind: String = row.get("kind");
    Ok(MessageRecord {
        id: row.get("id"),
        project_id: row.get("project_id"),
        content: row.get("content"),
        role: MessageRole::parse(&role)
            .ok_or_else(|| StoreError::Backend(format!("unknown role: {role}")))?,
        kind: MessageType::parse(&kind)
            .ok_or_else(|| StoreError::Backend(format!("unknown message type: {kind}")))?,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl ArtifactStore for SqliteStore {
    async fn create_message(
        &self,
        project_id: &str,
        content: &str,
        role: MessageRole,
        kind: MessageType,
    ) -> Result<MessageRecord, StoreError> {
        let record = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            content: content.to_string(),
            role,
            kind,
            created_at: now_rfc3339(),
        };
        sqlx::query(
            "INSERT INTO messages (id, project_id, content, role, kind, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.project_id)
        .bind(&record.content)
        .bind(record.role.as_str())
        .bind(record.kind.as_str())
        .bind(&record.created_at)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn create_artifact(
        &self,
        message_id: &str,
        title: &str,
        files: &BTreeMap<String, String>,
        preview_handle: &str,
    ) -> Result<ArtifactRecord, StoreError> {
        let files_json = serde_json::to_string(files)?;
        let mut tx = self.pool.begin().await?;

        let exists = sqlx::query("SELECT 1 FROM messages WHERE id = ?")
            .bind(message_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(StoreError::NotFound(format!("message {message_id}")));
        }
        let taken = sqlx::query("SELECT 1 FROM artifacts WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(StoreError::Conflict(format!(
                "message {message_id} already has an artifact"
            )));
        }

        let record = ArtifactRecord {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            title: title.to_string(),
            files: files.clone(),
            preview_handle: preview_handle.to_string(),
            created_at: now_rfc3339(),
        };
        sqlx::query(
            "INSERT INTO artifacts (id, message_id, title, files, preview_handle, created_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id)
        .bind(&record.message_id)
        .bind(&record.title)
        .bind(&files_json)
        .bind(&record.preview_handle)
        .bind(&record.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(record)
    }

    async fn find_latest_artifact(
        &self,
        project_id: &str,
    ) -> Result<Option<(MessageRecord, ArtifactRecord)>, StoreError> {
        let row = sqlx::query(
            "SELECT m.id, m.project_id, m.content, m.role, m.kind, m.created_at,
                    a.id AS artifact_id, a.title, a.files, a.preview_handle,
                    a.created_at AS artifact_created_at
             FROM messages m JOIN artifacts a ON a.message_id = m.id
             WHERE m.project_id = ?
             ORDER BY m.seq DESC LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let message = message_from_row(&row)?;
        let files: String = row.get("files");
        let artifact = ArtifactRecord {
            id: row.get("artifact_id"),
            message_id: message.id.clone(),
            title: row.get("title"),
            files: serde_json::from_str(&files)?,
            preview_handle: row.get("preview_handle"),
            created_at: row.get("artifact_created_at"),
        };
        Ok(Some((message, artifact)))
    }

    async fn recent_messages(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, project_id, content, role, kind, created_at FROM messages
             WHERE project_id = ? ORDER BY seq DESC LIMIT ?",
        )
        .bind(project_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }
}
