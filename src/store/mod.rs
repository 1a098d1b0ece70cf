//! 结果持久化适配层
//!
//! 对外部记录存储只暴露窄接口：创建消息、为消息创建产物（1:1）、查询项目最新产物、
//! 读取最近消息（用于对话上下文注入）。实现：内存（默认）与 SQLite（feature `sqlite`）。

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppConfig;

pub use memory::MemoryStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    /// 同一条消息已有产物
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store backend error: {0}")]
    Backend(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "USER",
            MessageRole::Assistant => "ASSISTANT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "USER" => Some(MessageRole::User),
            "ASSISTANT" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// 消息类型：正常结果或错误标记
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageType {
    Result,
    Error,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Result => "RESULT",
            MessageType::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RESULT" => Some(MessageType::Result),
            "ERROR" => Some(MessageType::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: String,
    pub project_id: String,
    pub content: String,
    pub role: MessageRole,
    pub kind: MessageType,
    /// RFC 3339
    pub created_at: String,
}

/// 一次成功运行的产物，创建后不可变
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub id: String,
    pub message_id: String,
    pub title: String,
    /// 规范项目文件表
    pub files: BTreeMap<String, String>,
    /// 预览地址或不透明标识
    pub preview_handle: String,
    pub created_at: String,
}

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn create_message(
        &self,
        project_id: &str,
        content: &str,
        role: MessageRole,
        kind: MessageType,
    ) -> Result<MessageRecord, StoreError>;

    /// 为消息创建产物；消息不存在返回 NotFound，已有产物返回 Conflict
    async fn create_artifact(
        &self,
        message_id: &str,
        title: &str,
        files: &BTreeMap<String, String>,
        preview_handle: &str,
    ) -> Result<ArtifactRecord, StoreError>;

    /// 项目最新一次产物（连同所属消息）
    async fn find_latest_artifact(
        &self,
        project_id: &str,
    ) -> Result<Option<(MessageRecord, ArtifactRecord)>, StoreError>;

    /// 最近 limit 条消息，按时间正序
    async fn recent_messages(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError>;

    /// 结果消息 + 产物
    async fn create_result_with_artifact(
        &self,
        project_id: &str,
        content: &str,
        title: &str,
        files: &BTreeMap<String, String>,
        preview_handle: &str,
    ) -> Result<(MessageRecord, ArtifactRecord), StoreError> {
        let message = self
            .create_message(project_id, content, MessageRole::Assistant, MessageType::Result)
            .await?;
        let artifact = self
            .create_artifact(&message.id, title, files, preview_handle)
            .await?;
        Ok((message, artifact))
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// 按配置创建存储
pub async fn create_store_from_config(cfg: &AppConfig) -> Result<Arc<dyn ArtifactStore>, StoreError> {
    match cfg.store.provider.as_str() {
        "memory" => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "sqlite")]
        "sqlite" => {
            if let Some(parent) = cfg.store.db_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .map_err(|e| StoreError::Backend(e.to_string()))?;
                }
            }
            Ok(Arc::new(SqliteStore::new(&cfg.store.db_path).await?))
        }
        #[cfg(not(feature = "sqlite"))]
        "sqlite" => Err(StoreError::Backend(
            "sqlite store requires the `sqlite` feature".to_string(),
        )),
        other => Err(StoreError::Backend(format!("unknown store provider: {other}"))),
    }
}
