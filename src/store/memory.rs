//! 内存存储（进程内，测试与单机 CLI 使用）

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{
    now_rfc3339, ArtifactRecord, ArtifactStore, MessageRecord, MessageRole, MessageType,
    StoreError,
};

#[derive(Default)]
struct Inner {
    /// 按创建顺序
    messages: Vec<MessageRecord>,
    /// message_id -> 产物
    artifacts: HashMap<String, ArtifactRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 项目全部消息（正序）
    pub async fn messages(&self, project_id: &str) -> Vec<MessageRecord> {
        self.inner
            .read()
            .await
            .messages
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect()
    }

    pub async fn artifact_count(&self) -> usize {
        self.inner.read().await.artifacts.len()
    }
}

#[async_trait]
impl ArtifactStore for MemoryStore {
    async fn create_message(
        &self,
        project_id: &str,
        content: &str,
        role: MessageRole,
        kind: MessageType,
    ) -> Result<MessageRecord, StoreError> {
        let record = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            content: content.to_string(),
            role,
            kind,
            created_at: now_rfc3339(),
        };
        self.inner.write().await.messages.push(record.clone());
        Ok(record)
    }

    async fn create_artifact(
        &self,
        message_id: &str,
        title: &str,
        files: &BTreeMap<String, String>,
        preview_handle: &str,
    ) -> Result<ArtifactRecord, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.messages.iter().any(|m| m.id == message_id) {
            return Err(StoreError::NotFound(format!("message {message_id}")));
        }
        if inner.artifacts.contains_key(message_id) {
            return Err(StoreError::Conflict(format!(
                "message {message_id} already has an artifact"
            )));
        }
        let record = ArtifactRecord {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message_id.to_string(),
            title: title.to_string(),
            files: files.clone(),
            preview_handle: preview_handle.to_string(),
            created_at: now_rfc3339(),
        };
        inner.artifacts.insert(message_id.to_string(), record.clone());
        Ok(record)
    }

    /// 消息与产物在同一次写锁内插入，不会留下无产物的结果消息
    async fn create_result_with_artifact(
        &self,
        project_id: &str,
        content: &str,
        title: &str,
        files: &BTreeMap<String, String>,
        preview_handle: &str,
    ) -> Result<(MessageRecord, ArtifactRecord), StoreError> {
        let created_at = now_rfc3339();
        let message = MessageRecord {
            id: uuid::Uuid::new_v4().to_string(),
            project_id: project_id.to_string(),
            content: content.to_string(),
            role: MessageRole::Assistant,
            kind: MessageType::Result,
            created_at: created_at.clone(),
        };
        let artifact = ArtifactRecord {
            id: uuid::Uuid::new_v4().to_string(),
            message_id: message.id.clone(),
            title: title.to_string(),
            files: files.clone(),
            preview_handle: preview_handle.to_string(),
            created_at,
        };

        let mut inner = self.inner.write().await;
        inner.messages.push(message.clone());
        inner
            .artifacts
            .insert(message.id.clone(), artifact.clone());
        Ok((message, artifact))
    }

    async fn find_latest_artifact(
        &self,
        project_id: &str,
    ) -> Result<Option<(MessageRecord, ArtifactRecord)>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.project_id == project_id)
            .find_map(|m| inner.artifacts.get(&m.id).map(|a| (m.clone(), a.clone()))))
    }

    async fn recent_messages(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let inner = self.inner.read().await;
        let mut recent: Vec<MessageRecord> = inner
            .messages
            .iter()
            .rev()
            .filter(|m| m.project_id == project_id)
            .take(limit)
            .cloned()
            .collect();
        recent.reverse();
        Ok(recent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn files(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_artifact_linked_once() {
        let store = MemoryStore::new();
        let msg = store
            .create_message("p1", "done", MessageRole::Assistant, MessageType::Result)
            .await
            .unwrap();
        store
            .create_artifact(&msg.id, "Todo", &files(&[("/src/App.js", "x")]), "sandpack://preview")
            .await
            .unwrap();

        let again = store
            .create_artifact(&msg.id, "Todo", &BTreeMap::new(), "h")
            .await;
        assert!(matches!(again, Err(StoreError::Conflict(_))));

        let missing = store.create_artifact("nope", "t", &BTreeMap::new(), "h").await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_latest_artifact_per_project() {
        let store = MemoryStore::new();
        assert!(store.find_latest_artifact("p1").await.unwrap().is_none());

        store
            .create_result_with_artifact("p1", "first", "One", &files(&[("/a", "1")]), "h1")
            .await
            .unwrap();
        store
            .create_result_with_artifact("p2", "other", "Other", &files(&[("/b", "2")]), "h2")
            .await
            .unwrap();
        store
            .create_message("p1", "boom", MessageRole::Assistant, MessageType::Error)
            .await
            .unwrap();
        store
            .create_result_with_artifact("p1", "second", "Two", &files(&[("/a", "3")]), "h3")
            .await
            .unwrap();

        let (msg, artifact) = store.find_latest_artifact("p1").await.unwrap().unwrap();
        assert_eq!(msg.content, "second");
        assert_eq!(artifact.title, "Two");
        assert_eq!(artifact.files["/a"], "3");
    }

    #[tokio::test]
    async fn test_result_and_artifact_written_together() {
        let store = std::sync::Arc::new(MemoryStore::new());
        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                for _ in 0..50 {
                    let inner = store.inner.read().await;
                    for m in inner.messages.iter().filter(|m| m.kind == MessageType::Result) {
                        assert!(inner.artifacts.contains_key(&m.id), "result {} has no artifact", m.id);
                    }
                    drop(inner);
                    tokio::task::yield_now().await;
                }
            })
        };
        for i in 0..20 {
            store
                .create_result_with_artifact("p1", &format!("r{i}"), "T", &files(&[("/a", "1")]), "h")
                .await
                .unwrap();
            tokio::task::yield_now().await;
        }
        reader.await.unwrap();

        let (msg, artifact) = store.find_latest_artifact("p1").await.unwrap().unwrap();
        assert_eq!(artifact.message_id, msg.id);
        assert_eq!(msg.role, MessageRole::Assistant);
        assert_eq!(store.messages("p1").await.len(), 20);
        assert_eq!(store.artifact_count().await, 20);
    }

    #[tokio::test]
    async fn test_recent_messages_oldest_first() {
        let store = MemoryStore::new();
        for i in 0..4 {
            store
                .create_message("p", &format!("m{i}"), MessageRole::User, MessageType::Result)
                .await
                .unwrap();
        }
        let recent = store.recent_messages("p", 2).await.unwrap();
        let contents: Vec<&str> = recent.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m3"]);
    }
}
