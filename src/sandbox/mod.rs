//! 沙箱句柄：远程/本地隔离执行环境的生命周期封装
//!
//! SandboxProvider 定义 create / run / write_file / read_file / get_host / kill；
//! SandboxHandle 绑定一个沙箱 ID，对每次调用施加超时，超时转为 SandboxError::Timeout。
//! 所有失败以值返回，由调用方决定是作为文本反馈给模型还是终止运行。

pub mod local;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::timeout;

pub use local::LocalSandbox;
pub use memory::InMemorySandbox;

use crate::config::AppConfig;

/// 沙箱标识，在一次运行内有效
pub type SandboxId = String;

/// 命令执行结果
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// 沙箱错误
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SandboxError {
    #[error("sandbox unavailable: {0}")]
    Unavailable(String),

    #[error("unknown sandbox: {0}")]
    UnknownSandbox(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("path escapes sandbox: {0}")]
    PathEscape(String),

    #[error("command exited with code {exit_code}")]
    CommandFailed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("{op} timed out after {secs}s")]
    Timeout { op: String, secs: u64 },

    #[error("io error: {0}")]
    Io(String),
}

/// 沙箱实现需提供的操作
#[async_trait]
pub trait SandboxProvider: Send + Sync {
    async fn create(&self) -> Result<SandboxId, SandboxError>;

    /// 执行命令；非零退出码返回 CommandFailed（含 stdout / stderr）
    async fn run(&self, id: &str, command: &str) -> Result<CommandOutput, SandboxError>;

    /// 后台启动长期运行的命令（如预览服务）
    async fn spawn_background(&self, id: &str, command: &str) -> Result<(), SandboxError>;

    async fn write_file(&self, id: &str, path: &str, content: &str) -> Result<(), SandboxError>;

    async fn read_file(&self, id: &str, path: &str) -> Result<String, SandboxError>;

    /// 端口对应的公网主机名（不含协议）
    fn get_host(&self, id: &str, port: u16) -> Result<String, SandboxError>;

    /// 释放沙箱（停止后台进程等）
    async fn kill(&self, id: &str) -> Result<(), SandboxError>;
}

/// 单次运行持有的沙箱句柄：绑定 ID + 每次调用的超时
#[derive(Clone)]
pub struct SandboxHandle {
    provider: Arc<dyn SandboxProvider>,
    id: SandboxId,
    timeout: Duration,
}

impl std::fmt::Debug for SandboxHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxHandle")
            .field("id", &self.id)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SandboxHandle {
    /// 创建新沙箱并返回句柄
    pub async fn create(
        provider: Arc<dyn SandboxProvider>,
        timeout_secs: u64,
    ) -> Result<Self, SandboxError> {
        let limit = Duration::from_secs(timeout_secs);
        let id = timeout(limit, provider.create())
            .await
            .map_err(|_| SandboxError::Timeout {
                op: "create".to_string(),
                secs: timeout_secs,
            })??;
        tracing::info!(sandbox_id = %id, "sandbox created");
        Ok(Self {
            provider,
            id,
            timeout: limit,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    async fn bounded<T, F>(&self, op: &str, fut: F) -> Result<T, SandboxError>
    where
        F: std::future::Future<Output = Result<T, SandboxError>>,
    {
        timeout(self.timeout, fut)
            .await
            .map_err(|_| SandboxError::Timeout {
                op: op.to_string(),
                secs: self.timeout.as_secs(),
            })?
    }

    pub async fn run(&self, command: &str) -> Result<CommandOutput, SandboxError> {
        self.bounded("run", self.provider.run(&self.id, command)).await
    }

    pub async fn spawn_background(&self, command: &str) -> Result<(), SandboxError> {
        self.bounded(
            "spawn_background",
            self.provider.spawn_background(&self.id, command),
        )
        .await
    }

    pub async fn write_file(&self, path: &str, content: &str) -> Result<(), SandboxError> {
        self.bounded("write_file", self.provider.write_file(&self.id, path, content))
            .await
    }

    pub async fn read_file(&self, path: &str) -> Result<String, SandboxError> {
        self.bounded("read_file", self.provider.read_file(&self.id, path))
            .await
    }

    pub fn get_host(&self, port: u16) -> Result<String, SandboxError> {
        self.provider.get_host(&self.id, port)
    }

    pub async fn kill(&self) -> Result<(), SandboxError> {
        self.bounded("kill", self.provider.kill(&self.id)).await
    }
}

/// 根据 [sandbox] 配置创建沙箱实现：local | memory
pub fn create_sandbox_from_config(cfg: &AppConfig) -> Result<Arc<dyn SandboxProvider>, SandboxError> {
    match cfg.sandbox.provider.as_str() {
        "memory" => Ok(Arc::new(InMemorySandbox::new())),
        "local" => Ok(Arc::new(LocalSandbox::new(&cfg.sandbox.root)?)),
        other => Err(SandboxError::Unavailable(format!(
            "unknown sandbox provider: {other}"
        ))),
    }
}

/// 沙箱内相对路径的词法规范化：去掉前导 `/` 与 `.`，拒绝逃出根目录的 `..`
pub fn contain_path(path: &str) -> Result<String, SandboxError> {
    let mut parts: Vec<&str> = Vec::new();
    for seg in path.split(&['/', '\\'][..]) {
        match seg {
            "" | "." => {}
            ".." => {
                if parts.pop().is_none() {
                    return Err(SandboxError::PathEscape(path.to_string()));
                }
            }
            s => parts.push(s),
        }
    }
    if parts.is_empty() {
        return Err(SandboxError::NotFound(path.to_string()));
    }
    Ok(parts.join("/"))
}
