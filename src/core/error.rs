//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 AgentError 决定 Retry / RetryWithPrompt / Abort。

use thiserror::Error;

use crate::sandbox::SandboxError;
use crate::store::StoreError;

/// 一次生成运行中可能出现的错误（模型、工具、循环耗尽、空结果、沙箱、存储等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Model error: {0}")]
    ModelError(String),

    #[error("JSON parse error: {0}")]
    JsonParseError(String),

    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidToolArgs { tool: String, reason: String },

    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Hallucinated tool: {0}")]
    HallucinatedTool(String),

    /// 路由次数达到上限仍未得到 summary
    #[error("Iteration limit reached ({0}) without a task summary")]
    LoopExhausted(usize),

    /// 看似结束但没有可用产物（summary 或 files 为空）
    #[error("Empty result: {0}")]
    EmptyResult(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    ConfigError(String),

    /// 同一项目已有进行中的生成
    #[error("Generation already running for project {0}")]
    AlreadyRunning(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 在当前轮内重试同一次模型调用
    Retry,
    /// 将失败描述作为文本注入对话，结束本轮，由下一次路由继续
    RetryWithPrompt(String),
    /// 终止当前运行
    Abort,
}
