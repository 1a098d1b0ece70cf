//! 内存沙箱（测试与纯规范化模式使用）
//!
//! 文件保存在内存表中；命令默认成功且无输出，可通过 with_command_handler 注入脚本化结果。

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::sandbox::{contain_path, CommandOutput, SandboxError, SandboxId, SandboxProvider};

type CommandHandler = Box<dyn Fn(&str) -> Result<CommandOutput, SandboxError> + Send + Sync>;

/// 内存沙箱
#[derive(Default)]
pub struct InMemorySandbox {
    files: Mutex<HashMap<SandboxId, BTreeMap<String, String>>>,
    commands: Mutex<Vec<(SandboxId, String)>>,
    handler: Option<CommandHandler>,
    delay: Option<Duration>,
    fail_create: bool,
}

impl InMemorySandbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// 自定义命令执行结果
    pub fn with_command_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&str) -> Result<CommandOutput, SandboxError> + Send + Sync + 'static,
    {
        self.handler = Some(Box::new(handler));
        self
    }

    /// 每条命令执行前等待（用于超时测试）
    pub fn with_command_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// create 总是失败（模拟沙箱不可用）
    pub fn unavailable() -> Self {
        Self {
            fail_create: true,
            ..Self::default()
        }
    }

    /// 已执行过的命令（含后台命令）
    pub fn commands(&self) -> Vec<(SandboxId, String)> {
        self.commands.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// 某个沙箱内的全部文件
    pub fn files(&self, id: &str) -> BTreeMap<String, String> {
        self.files
            .lock()
            .ok()
            .and_then(|f| f.get(id).cloned())
            .unwrap_or_default()
    }

    fn with_files<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut BTreeMap<String, String>) -> Result<T, SandboxError>,
    ) -> Result<T, SandboxError> {
        let mut guard = self
            .files
            .lock()
            .map_err(|_| SandboxError::Unavailable("sandbox state poisoned".to_string()))?;
        let files = guard
            .get_mut(id)
            .ok_or_else(|| SandboxError::UnknownSandbox(id.to_string()))?;
        f(files)
    }

    fn record(&self, id: &str, command: &str) {
        if let Ok(mut c) = self.commands.lock() {
            c.push((id.to_string(), command.to_string()));
        }
    }
}

#[async_trait]
impl SandboxProvider for InMemorySandbox {
    async fn create(&self) -> Result<SandboxId, SandboxError> {
        if self.fail_create {
            return Err(SandboxError::Unavailable("sandbox service offline".to_string()));
        }
        let id = format!("mem_{}", uuid::Uuid::new_v4().simple());
        self.files
            .lock()
            .map_err(|_| SandboxError::Unavailable("sandbox state poisoned".to_string()))?
            .insert(id.clone(), BTreeMap::new());
        Ok(id)
    }

    async fn run(&self, id: &str, command: &str) -> Result<CommandOutput, SandboxError> {
        self.with_files(id, |_| Ok(()))?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.record(id, command);
        match &self.handler {
            Some(h) => h(command),
            None => Ok(CommandOutput::default()),
        }
    }

    async fn spawn_background(&self, id: &str, command: &str) -> Result<(), SandboxError> {
        self.with_files(id, |_| Ok(()))?;
        self.record(id, command);
        Ok(())
    }

    async fn write_file(&self, id: &str, path: &str, content: &str) -> Result<(), SandboxError> {
        let rel = contain_path(path)?;
        self.with_files(id, |files| {
            files.insert(rel, content.to_string());
            Ok(())
        })
    }

    async fn read_file(&self, id: &str, path: &str) -> Result<String, SandboxError> {
        let rel = contain_path(path)?;
        self.with_files(id, |files| {
            files
                .get(&rel)
                .cloned()
                .ok_or_else(|| SandboxError::NotFound(path.to_string()))
        })
    }

    fn get_host(&self, id: &str, port: u16) -> Result<String, SandboxError> {
        Ok(format!("{port}-{id}.sandbox.local"))
    }

    async fn kill(&self, id: &str) -> Result<(), SandboxError> {
        self.with_files(id, |_| Ok(()))
    }
}
