//! 生成过程事件：用于展示进度（路由步数、工具调用、观察、恢复动作、完成 / 错误）

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GenerationEvent {
    /// 路由步数更新（当前第几步）
    StepUpdate { step: usize, max_steps: usize },
    /// 正在调用模型
    Thinking,
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 错误恢复动作（Retry / RetryWithPrompt / Abort）
    Recovery { action: String, detail: String },
    /// 检测到完成信号
    SummaryDetected { preview: String },
    /// 运行结束并已持久化
    Completed { title: String },
    /// 错误
    Error { text: String },
}

/// 截断过长文本，用于事件预览
pub(crate) fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}
