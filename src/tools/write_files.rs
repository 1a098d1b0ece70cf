//! createOrUpdateFiles：批量写入 / 覆盖文件
//!
//! 按给定顺序逐个写入沙箱（若有），写入成功的条目再按同一顺序一次性合并进 AgentState.files，
//! 同一路径后写覆盖先写。空列表与重复路径都合法。

use std::collections::BTreeSet;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::core::SharedState;
use crate::sandbox::SandboxHandle;
use crate::tools::schema::args_schema;
use crate::tools::Tool;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct FileEntry {
    /// 文件路径，如 `src/App.js`
    pub path: String,
    /// 完整文件内容
    pub content: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteFilesArgs {
    pub files: Vec<FileEntry>,
}

/// 文件写入工具
pub struct WriteFilesTool {
    state: SharedState,
    sandbox: Option<SandboxHandle>,
}

impl WriteFilesTool {
    pub fn new(state: SharedState, sandbox: Option<SandboxHandle>) -> Self {
        Self { state, sandbox }
    }
}

#[async_trait]
impl Tool for WriteFilesTool {
    fn name(&self) -> &str {
        "createOrUpdateFiles"
    }

    fn description(&self) -> &str {
        "Create or update files. Each entry replaces the full content of its path; later entries for the same path win."
    }

    fn parameters_schema(&self) -> Value {
        args_schema::<WriteFilesArgs>()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let args: WriteFilesArgs =
            serde_json::from_value(args).map_err(|e| format!("Invalid arguments: {e}"))?;
        if args.files.is_empty() {
            return Ok("No files to update.".to_string());
        }

        let mut written: Vec<(String, String)> = Vec::with_capacity(args.files.len());
        let mut failures: Vec<String> = Vec::new();
        for entry in args.files {
            let path = entry.path.trim().to_string();
            if path.is_empty() {
                failures.push("(empty path): skipped".to_string());
                continue;
            }
            if let Some(sandbox) = &self.sandbox {
                if let Err(e) = sandbox.write_file(&path, &entry.content).await {
                    tracing::warn!(path = %path, "sandbox write failed: {}", e);
                    failures.push(format!("{path}: {e}"));
                    continue;
                }
            }
            written.push((path, entry.content));
        }

        let names: Vec<String> = written
            .iter()
            .map(|(p, _)| p.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let count = self.state.merge_files(written).await;

        let mut out = format!("Updated {count} file(s): {}", names.join(", "));
        if !failures.is_empty() {
            out.push_str(&format!("\nFailed: {}", failures.join("; ")));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentState;
    use crate::tools::ReadFilesTool;
    use serde_json::json;

    #[tokio::test]
    async fn test_last_write_wins_in_call_order() {
        let state = SharedState::new(AgentState::new());
        let write = WriteFilesTool::new(state.clone(), None);
        let read = ReadFilesTool::new(state.clone(), None);

        write
            .execute(json!({"files": [
                {"path": "a", "content": "1"},
                {"path": "a", "content": "2"}
            ]}))
            .await
            .unwrap();

        let out = read.execute(json!({"files": ["a"]})).await.unwrap();
        let parsed: Vec<Value> = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["content"], "2");
    }

    #[tokio::test]
    async fn test_summary_lists_each_path_once() {
        let state = SharedState::default();
        let write = WriteFilesTool::new(state.clone(), None);
        let out = write
            .execute(json!({"files": [
                {"path": "b.js", "content": "1"},
                {"path": "a.js", "content": "2"},
                {"path": "b.js", "content": "3"}
            ]}))
            .await
            .unwrap();
        assert_eq!(out, "Updated 3 file(s): a.js, b.js");
        assert_eq!(state.file("b.js").await.as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_empty_list_is_tolerated() {
        let state = SharedState::default();
        let write = WriteFilesTool::new(state.clone(), None);
        let out = write.execute(json!({"files": []})).await.unwrap();
        assert_eq!(out, "No files to update.");
        assert!(state.files().await.is_empty());
    }

    #[tokio::test]
    async fn test_escaping_path_is_reported_not_merged() {
        use crate::sandbox::{InMemorySandbox, SandboxHandle};
        use std::sync::Arc;

        let handle = SandboxHandle::create(Arc::new(InMemorySandbox::new()), 5)
            .await
            .unwrap();
        let state = SharedState::default();
        let write = WriteFilesTool::new(state.clone(), Some(handle));
        let out = write
            .execute(json!({"files": [
                {"path": "../../etc/passwd", "content": "x"},
                {"path": "src/App.js", "content": "y"}
            ]}))
            .await
            .unwrap();
        assert!(out.contains("Failed: ../../etc/passwd"));
        let files = state.files().await;
        assert_eq!(files.len(), 1);
        assert_eq!(files.get("src/App.js").map(String::as_str), Some("y"));
    }
}
