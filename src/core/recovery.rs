//! 错误恢复引擎
//!
//! 根据 AgentError 类型与已重试次数返回 RecoveryAction，供编排循环决定是重试、反馈给模型还是终止。

use crate::core::{AgentError, RecoveryAction};

/// 语义化错误恢复：模型错误先在本轮重试，超过上限后作为文本反馈给模型；取消与内部错误直接终止
#[derive(Debug)]
pub struct RecoveryEngine {
    max_model_retries: u32,
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(2)
    }
}

impl RecoveryEngine {
    pub fn new(max_model_retries: u32) -> Self {
        Self { max_model_retries }
    }

    pub fn max_model_retries(&self) -> u32 {
        self.max_model_retries
    }

    /// attempt 为本轮已失败的次数（从 1 开始）
    pub fn handle(&self, err: &AgentError, attempt: u32) -> RecoveryAction {
        match err {
            AgentError::ModelError(msg) | AgentError::JsonParseError(msg) => {
                if attempt <= self.max_model_retries {
                    RecoveryAction::Retry
                } else {
                    RecoveryAction::RetryWithPrompt(format!(
                        "The previous turn failed: {msg}. Continue the task; \
                         call the available tools with valid JSON arguments."
                    ))
                }
            }
            AgentError::Cancelled => RecoveryAction::Abort,
            _ => RecoveryAction::Abort,
        }
    }
}
