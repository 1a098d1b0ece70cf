//! readFiles：读取文件
//!
//! 给定路径时按顺序返回 `[{path, content}]`，先查 AgentState.files，再查沙箱，都没有则返回未找到标记；
//! 未给路径时返回整个文件表。缺失文件作为数据返回，不是错误。

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::SharedState;
use crate::sandbox::SandboxHandle;
use crate::tools::schema::args_schema;
use crate::tools::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadFilesArgs {
    /// 要读取的路径；省略则返回全部文件
    #[serde(default)]
    pub files: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct FileView<'a> {
    path: &'a str,
    content: String,
}

/// 未找到的文件的内容标记
pub fn not_found(path: &str) -> String {
    format!("[not found: {path}]")
}

/// 文件读取工具
pub struct ReadFilesTool {
    state: SharedState,
    sandbox: Option<SandboxHandle>,
}

impl ReadFilesTool {
    pub fn new(state: SharedState, sandbox: Option<SandboxHandle>) -> Self {
        Self { state, sandbox }
    }

    async fn lookup(&self, path: &str) -> String {
        if let Some(content) = self.state.file(path).await {
            return content;
        }
        if let Some(sandbox) = &self.sandbox {
            match sandbox.read_file(path).await {
                Ok(content) => return content,
                Err(e) => tracing::debug!(path = %path, "sandbox read miss: {}", e),
            }
        }
        not_found(path)
    }
}

#[async_trait]
impl Tool for ReadFilesTool {
    fn name(&self) -> &str {
        "readFiles"
    }

    fn description(&self) -> &str {
        "Read files by path. Omit `files` to get every file written so far."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<ReadFilesArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: ReadFilesArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))?;

        let Some(paths) = args.files else {
            let all = self.state.files().await;
            return serde_json::to_string(&all).map_err(|e| e.to_string());
        };

        let mut views = Vec::with_capacity(paths.len());
        for path in &paths {
            views.push(FileView {
                path,
                content: self.lookup(path.trim()).await,
            });
        }
        serde_json::to_string(&views).map_err(|e| e.to_string())
    }
}
