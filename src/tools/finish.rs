//! finish：结构化完成信号，写入 AgentState.summary

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::SharedState;
use crate::tools::schema::args_schema;
use crate::tools::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FinishArgs {
    /// 对已完成工作的简短总结
    pub summary: String,
}

pub struct FinishTool {
    state: SharedState,
}

impl FinishTool {
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

#[async_trait]
impl Tool for FinishTool {
    fn name(&self) -> &str {
        "finish"
    }

    fn description(&self) -> &str {
        "Call once all files are written to end the task, with a short summary of what was built."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<FinishArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: FinishArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))?;
        let summary = args.summary.trim();
        if summary.is_empty() {
            return Err("summary must not be empty".to_string());
        }
        self.state.set_summary(summary).await;
        Ok("Task marked as complete.".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_finish_sets_summary() {
        let state = SharedState::default();
        let tool = FinishTool::new(state.clone());
        assert!(tool.execute(json!({"summary": "  "})).await.is_err());
        tool.execute(json!({"summary": "Built a todo app"}))
            .await
            .unwrap();
        assert_eq!(state.summary().await, "Built a todo app");
    }
}
