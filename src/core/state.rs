//! 运行状态：AgentState（summary + 文件表）、循环阶段与生成状态
//!
//! AgentState 只通过 SharedState 的串行化合并操作修改（Mutex 保护），工具并发执行时写入顺序确定。
//! 文件表中同一逻辑文件（规范路径相同）只保留最近一次写入使用的键。

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::materialize::paths::logical_path;

/// 逻辑路径 -> 完整文件内容
pub type FileMap = BTreeMap<String, String>;

/// 一次生成运行的可变状态
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentState {
    /// 模型给出完成信号前为空；非空即表示循环应终止
    pub summary: String,
    pub files: FileMap,
}

impl AgentState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以上一次运行的文件表作为初始状态（增量修改）
    pub fn seeded(files: FileMap) -> Self {
        Self {
            summary: String::new(),
            files,
        }
    }

    pub fn has_summary(&self) -> bool {
        !self.summary.trim().is_empty()
    }
}

/// 单写者共享状态：所有修改经由 Mutex 串行化
#[derive(Clone, Debug, Default)]
pub struct SharedState {
    inner: Arc<Mutex<AgentState>>,
}

impl SharedState {
    pub fn new(state: AgentState) -> Self {
        Self {
            inner: Arc::new(Mutex::new(state)),
        }
    }

    /// 按给定顺序合并文件（同一逻辑文件后写覆盖先写），一次加锁完成
    ///
    /// `App.js` 与 `/src/App.js` 指向同一文件：写入时先移除旧写法的键，
    /// 物化阶段因此不会在多个键之间按字典序挑选。
    pub async fn merge_files<I>(&self, files: I) -> usize
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut guard = self.inner.lock().await;
        let mut count = 0;
        for (path, content) in files {
            if let Some(logical) = logical_path(&path) {
                let aliases: Vec<String> = guard
                    .files
                    .keys()
                    .filter(|k| **k != path && logical_path(k).as_deref() == Some(logical.as_str()))
                    .cloned()
                    .collect();
                for alias in aliases {
                    tracing::debug!(from = %alias, to = %path, "file rewritten under another path");
                    guard.files.remove(&alias);
                }
            }
            guard.files.insert(path, content);
            count += 1;
        }
        count
    }

    /// 按路径读取；原样不存在时按逻辑路径匹配
    pub async fn file(&self, path: &str) -> Option<String> {
        let guard = self.inner.lock().await;
        if let Some(content) = guard.files.get(path) {
            return Some(content.clone());
        }
        let logical = logical_path(path)?;
        guard
            .files
            .iter()
            .find(|(k, _)| logical_path(k).as_deref() == Some(logical.as_str()))
            .map(|(_, c)| c.clone())
    }

    pub async fn files(&self) -> FileMap {
        self.inner.lock().await.files.clone()
    }

    pub async fn set_summary(&self, summary: impl Into<String>) {
        self.inner.lock().await.summary = summary.into();
    }

    pub async fn summary(&self) -> String {
        self.inner.lock().await.summary.clone()
    }

    pub async fn snapshot(&self) -> AgentState {
        self.inner.lock().await.clone()
    }
}

/// 编排循环的状态机阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum RunPhase {
    Routing,
    ToolExecuting,
    Terminated,
}

/// 对外暴露的生成状态（GetStatus）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationStatus {
    Generating,
    Completed,
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_merge_preserves_order_last_write_wins() {
        let state = SharedState::default();
        let n = state
            .merge_files(vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x".to_string()),
                ("a".to_string(), "2".to_string()),
            ])
            .await;
        assert_eq!(n, 3);
        assert_eq!(state.file("a").await.as_deref(), Some("2"));
        assert_eq!(state.files().await.len(), 2);
    }

    #[tokio::test]
    async fn test_rewrite_under_alias_replaces_earlier_key() {
        let state = SharedState::default();
        state
            .merge_files(vec![("src/App.js".to_string(), "OLD".to_string())])
            .await;
        state
            .merge_files(vec![("App.js".to_string(), "NEW".to_string())])
            .await;
        let files = state.files().await;
        assert_eq!(files.len(), 1);
        assert_eq!(files.get("App.js").map(String::as_str), Some("NEW"));
        assert_eq!(state.file("/src/App.js").await.as_deref(), Some("NEW"));
    }

    #[tokio::test]
    async fn test_edit_replaces_seeded_file() {
        let mut seed = FileMap::new();
        seed.insert("/src/App.js".to_string(), "SEEDED".to_string());
        seed.insert("/src/Header.js".to_string(), "HEADER".to_string());
        let state = SharedState::new(AgentState::seeded(seed));
        state
            .merge_files(vec![("./src/App.js".to_string(), "EDITED".to_string())])
            .await;
        let files = state.files().await;
        assert_eq!(files.len(), 2);
        assert!(!files.contains_key("/src/App.js"));
        assert_eq!(files.get("./src/App.js").map(String::as_str), Some("EDITED"));
    }

    #[tokio::test]
    async fn test_summary_signals_termination() {
        let state = SharedState::default();
        assert!(!state.snapshot().await.has_summary());
        state.set_summary("<task_summary>done</task_summary>").await;
        assert!(state.snapshot().await.has_summary());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let s = serde_json::to_string(&GenerationStatus::Generating).unwrap();
        assert_eq!(s, "\"generating\"");
    }
}
