//! Planner：一次模型调用
//!
//! 持有模型客户端与 system prompt，把 ModelError 映射为 AgentError；
//! extract_json_block 从回复中取出 JSON（```json ... ``` 或首尾花括号之间），供直接生成模式使用。

use std::sync::Arc;

use crate::core::AgentError;
use crate::llm::{ModelClient, ModelError, ModelReply, ToolDefinition};
use crate::memory::Message;

/// Planner：持有模型与 system prompt
pub struct Planner {
    model: Arc<dyn ModelClient>,
    system_prompt: String,
}

impl Planner {
    pub fn new(model: Arc<dyn ModelClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            model,
            system_prompt: system_prompt.into(),
        }
    }

    /// 获取模型累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.model.token_usage()
    }

    /// 以当前对话与工具定义调用一次模型
    pub async fn plan(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, AgentError> {
        self.model
            .complete(&self.system_prompt, messages, tools)
            .await
            .map_err(model_error)
    }
}

pub(crate) fn model_error(e: ModelError) -> AgentError {
    match e {
        ModelError::Parse(msg) => AgentError::JsonParseError(msg),
        other => AgentError::ModelError(other.to_string()),
    }
}

/// 从模型文本中提取 JSON 片段
pub fn extract_json_block(output: &str) -> &str {
    let trimmed = output.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim());
    }
    if let Some(start) = trimmed.find("```") {
        let rest = &trimmed[start + 3..];
        if let Some(end) = rest.find("```") {
            return rest[..end].trim();
        }
    }
    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => &trimmed[start..=end],
        _ => trimmed,
    }
}
