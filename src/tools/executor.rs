//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时。execute(tool_name, args) 先按工具的参数 schema 校验，
//! 再在超时内调用工具；未知工具、参数不合法、超时、失败分别转为对应的 AgentError。
//! 每次调用输出结构化审计日志（JSON）。dispatch 把任何错误转成给模型看的文本，从不让工具失败终止运行。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::AgentError;
use crate::llm::ToolDefinition;
use crate::memory::ToolCall;
use crate::tools::schema::validate_args;
use crate::tools::{Tool, ToolRegistry};

/// 工具执行器：分发前校验参数，对每次调用施加超时，并将结果映射为 AgentError
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；输出 JSON 审计日志
    pub async fn execute(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<String, AgentError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = self.execute_inner(tool_name, args).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(AgentError::HallucinatedTool(_)) => "unknown_tool",
            Err(AgentError::InvalidToolArgs { .. }) => "invalid_args",
            Err(AgentError::ToolTimeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        result
    }

    async fn execute_inner(
        &self,
        tool_name: &str,
        args: serde_json::Value,
    ) -> Result<String, AgentError> {
        let tool = self
            .registry
            .get(tool_name)
            .ok_or_else(|| AgentError::HallucinatedTool(tool_name.to_string()))?;

        validate_args(&tool.parameters_schema(), &args).map_err(|reason| {
            AgentError::InvalidToolArgs {
                tool: tool_name.to_string(),
                reason,
            }
        })?;

        match timeout(self.timeout, tool.execute(args)).await {
            Ok(Ok(content)) => Ok(content),
            Ok(Err(e)) => Err(AgentError::ToolExecutionFailed(e)),
            Err(_) => Err(AgentError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 执行一次模型请求的工具调用，结果（含失败）一律以文本返回
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        match self.execute(&call.name, call.arguments.clone()).await {
            Ok(content) => content,
            Err(e @ AgentError::HallucinatedTool(_)) => format!(
                "Error: {e}. Available tools: {}",
                self.tool_names().join(", ")
            ),
            Err(e) => format!("Error: {e}"),
        }
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.len() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "sleeps"
        }

        async fn execute(&self, _args: Value) -> Result<String, String> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok("done".to_string())
        }
    }

    struct NeedsPath;

    #[async_trait]
    impl Tool for NeedsPath {
        fn name(&self) -> &str {
            "needs_path"
        }

        fn description(&self) -> &str {
            "requires path"
        }

        fn parameters_schema(&self) -> Value {
            json!({
                "type": "object",
                "properties": { "path": { "type": "string" } },
                "required": ["path"]
            })
        }

        async fn execute(&self, args: Value) -> Result<String, String> {
            Ok(args["path"].as_str().unwrap_or_default().to_string())
        }
    }

    fn executor(timeout_secs: u64) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(SlowTool);
        registry.register(NeedsPath);
        ToolExecutor::new(registry, timeout_secs)
    }

    #[tokio::test]
    async fn test_unknown_tool_is_hallucination() {
        let err = executor(1).execute("rm_rf", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::HallucinatedTool(_)));
    }

    #[tokio::test]
    async fn test_args_validated_before_dispatch() {
        let ex = executor(1);
        let err = ex.execute("needs_path", json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::InvalidToolArgs { .. }));
        assert_eq!(
            ex.execute("needs_path", json!({"path": "a.js"})).await.unwrap(),
            "a.js"
        );
    }

    #[tokio::test]
    async fn test_timeout_becomes_text_for_model() {
        let ex = executor(1);
        let call = ToolCall {
            id: "c1".to_string(),
            name: "slow".to_string(),
            arguments: json!({}),
        };
        let text = ex.dispatch(&call).await;
        assert!(text.starts_with("Error: Tool timeout"));
    }
}
