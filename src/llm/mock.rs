//! Mock 模型客户端（用于测试与离线运行，无需 API）
//!
//! 按脚本依次返回预设回复；脚本耗尽后重复最后一条（或默认回复）。记录调用次数，便于断言循环步数。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::llm::{ModelClient, ModelError, ModelReply, ToolDefinition};
use crate::memory::{Message, ToolCall};

/// 脚本化 Mock 客户端
#[derive(Debug, Default)]
pub struct MockModelClient {
    replies: Mutex<VecDeque<Result<ModelReply, ModelError>>>,
    fallback: Option<ModelReply>,
    text_replies: Mutex<VecDeque<Result<String, ModelError>>>,
    calls: AtomicUsize,
    text_calls: AtomicUsize,
}

impl MockModelClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定回复
    pub fn scripted(replies: Vec<ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// 永远返回同一条回复
    pub fn repeating(reply: ModelReply) -> Self {
        Self {
            fallback: Some(reply),
            ..Self::default()
        }
    }

    /// 追加一条错误（用于重试测试）
    pub fn push_error(self, err: ModelError) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Err(err));
        }
        self
    }

    pub fn push_reply(self, reply: ModelReply) -> Self {
        if let Ok(mut q) = self.replies.lock() {
            q.push_back(Ok(reply));
        }
        self
    }

    /// complete_text 依次返回的文本（标题、回复、直接生成）
    pub fn with_text_replies(self, texts: Vec<&str>) -> Self {
        if let Ok(mut q) = self.text_replies.lock() {
            q.extend(texts.into_iter().map(|t| Ok(t.to_string())));
        }
        self
    }

    pub fn push_text_error(self, err: ModelError) -> Self {
        if let Ok(mut q) = self.text_replies.lock() {
            q.push_back(Err(err));
        }
        self
    }

    /// complete 被调用的次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn text_calls(&self) -> usize {
        self.text_calls.load(Ordering::SeqCst)
    }

    /// 构造一次工具调用
    pub fn call(id: &str, name: &str, arguments: serde_json::Value) -> ToolCall {
        ToolCall {
            id: id.to_string(),
            name: name.to_string(),
            arguments,
        }
    }

    /// 构造一次 createOrUpdateFiles 调用
    pub fn write_call(id: &str, files: &[(&str, &str)]) -> ToolCall {
        let files: Vec<_> = files
            .iter()
            .map(|(path, content)| json!({"path": path, "content": content}))
            .collect();
        Self::call(id, "createOrUpdateFiles", json!({ "files": files }))
    }
}

#[async_trait]
impl ModelClient for MockModelClient {
    async fn complete(
        &self,
        _system: &str,
        history: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        match next {
            Some(r) => r,
            None => Ok(self.fallback.clone().unwrap_or_else(|| {
                let last_user = history
                    .iter()
                    .rev()
                    .find(|m| matches!(m.role, crate::memory::Role::User))
                    .map(|m| m.content.as_str())
                    .unwrap_or("(no input)");
                ModelReply::text(format!("Echo from Mock: {last_user}"))
            })),
        }
    }

    async fn complete_text(&self, _system: &str, _prompt: &str) -> Result<String, ModelError> {
        self.text_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.text_replies.lock().ok().and_then(|mut q| q.pop_front());
        next.unwrap_or_else(|| Ok(String::new()))
    }
}
