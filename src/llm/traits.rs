//! 模型客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 ModelClient：
//! complete（system + 对话历史 + 工具定义 → 文本回复 + 工具调用）、complete_text（单次纯文本）。

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::memory::{Message, ToolCall};

/// 提供给模型的工具定义：名称、描述、参数 JSON Schema
#[derive(Clone, Debug, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// 一次模型调用的结果
#[derive(Clone, Debug, Default)]
pub struct ModelReply {
    pub text: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_calls(text: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self { text, tool_calls }
    }

    pub fn text_or_empty(&self) -> &str {
        self.text.as_deref().unwrap_or("")
    }
}

/// 模型提供方错误
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("rate limited")]
    RateLimited,

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    Other(String),
}

/// 模型客户端 trait
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// 带工具的对话补全
    async fn complete(
        &self,
        system: &str,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError>;

    /// 单次纯文本补全（标题、回复生成、直接生成模式）
    async fn complete_text(&self, system: &str, prompt: &str) -> Result<String, ModelError> {
        let reply = self.complete(system, &[Message::user(prompt)], &[]).await?;
        Ok(reply.text.unwrap_or_default())
    }

    /// 累计 token 使用：(prompt, completion, total)，默认 (0, 0, 0)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
