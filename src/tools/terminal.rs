//! terminal：在沙箱中执行 shell 命令
//!
//! 成功返回 stdout；失败（非零退出、超时、沙箱不可用）返回含 stdout / stderr 的 "Command failed: ..." 文本，
//! 从不以 Err 返回，命令失败是给模型的信息而不是流水线故障。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::sandbox::{SandboxError, SandboxHandle};
use crate::tools::schema::args_schema;
use crate::tools::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct TerminalArgs {
    /// 要执行的 shell 命令，如 `npm install lucide-react --yes`
    pub command: String,
}

/// 沙箱 shell 工具
pub struct TerminalTool {
    sandbox: Option<SandboxHandle>,
}

impl TerminalTool {
    pub fn new(sandbox: Option<SandboxHandle>) -> Self {
        Self { sandbox }
    }
}

/// 失败时给模型的文本：错误 + 两路输出
pub fn format_failure(err: &SandboxError) -> String {
    match err {
        SandboxError::CommandFailed {
            exit_code,
            stdout,
            stderr,
        } => format!(
            "Command failed: exit code {exit_code}\nstdout: {stdout}\nstderr: {stderr}"
        ),
        other => format!("Command failed: {other}\nstdout: \nstderr: "),
    }
}

#[async_trait]
impl Tool for TerminalTool {
    fn name(&self) -> &str {
        "terminal"
    }

    fn description(&self) -> &str {
        "Use the terminal to run commands in the sandbox (e.g. npm install <pkg> --yes). Returns stdout, or the failure with stdout and stderr."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<TerminalArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: TerminalArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(format!("Command failed: invalid arguments: {e}")),
        };
        let command = args.command.trim();
        if command.is_empty() {
            return Ok("Command failed: empty command\nstdout: \nstderr: ".to_string());
        }
        let Some(sandbox) = &self.sandbox else {
            return Ok(format_failure(&SandboxError::Unavailable(
                "no sandbox attached to this run".to_string(),
            )));
        };

        match sandbox.run(command).await {
            Ok(out) => Ok(out.stdout),
            Err(e) => {
                tracing::warn!(command = %command, "terminal command failed: {}", e);
                Ok(format_failure(&e))
            }
        }
    }
}
