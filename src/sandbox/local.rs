//! 本地目录沙箱
//!
//! 每个沙箱对应 root 下的一个独立子目录；命令通过 sh -c 在该目录执行，
//! 文件读写做路径约束（拒绝逃出沙箱目录）。后台进程在 kill 时终止。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::sandbox::{contain_path, CommandOutput, SandboxError, SandboxId, SandboxProvider};

/// 本地目录沙箱
pub struct LocalSandbox {
    root: PathBuf,
    sandboxes: Mutex<HashMap<SandboxId, PathBuf>>,
    background: Mutex<HashMap<SandboxId, Vec<Child>>>,
}

impl LocalSandbox {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SandboxError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root).map_err(|e| {
            SandboxError::Unavailable(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self {
            root,
            sandboxes: Mutex::new(HashMap::new()),
            background: Mutex::new(HashMap::new()),
        })
    }

    async fn dir(&self, id: &str) -> Result<PathBuf, SandboxError> {
        self.sandboxes
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SandboxError::UnknownSandbox(id.to_string()))
    }

    async fn resolve(&self, id: &str, path: &str) -> Result<PathBuf, SandboxError> {
        let rel = contain_path(path)?;
        Ok(self.dir(id).await?.join(rel))
    }

    fn shell(command: &str, cwd: &Path) -> Command {
        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(cwd);
        cmd
    }
}

#[async_trait]
impl SandboxProvider for LocalSandbox {
    async fn create(&self) -> Result<SandboxId, SandboxError> {
        let id = format!("sbx_{}", uuid::Uuid::new_v4().simple());
        let dir = self.root.join(&id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| SandboxError::Unavailable(e.to_string()))?;
        self.sandboxes.lock().await.insert(id.clone(), dir);
        Ok(id)
    }

    async fn run(&self, id: &str, command: &str) -> Result<CommandOutput, SandboxError> {
        let dir = self.dir(id).await?;
        tracing::info!(sandbox_id = %id, command = %command, "sandbox run");
        let output = Self::shell(command, &dir)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SandboxError::Io(format!("Execution failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            return Err(SandboxError::CommandFailed {
                exit_code,
                stdout,
                stderr,
            });
        }
        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    async fn spawn_background(&self, id: &str, command: &str) -> Result<(), SandboxError> {
        let dir = self.dir(id).await?;
        let child = Self::shell(command, &dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SandboxError::Io(format!("Spawn failed: {e}")))?;
        self.background
            .lock()
            .await
            .entry(id.to_string())
            .or_default()
            .push(child);
        Ok(())
    }

    async fn write_file(&self, id: &str, path: &str, content: &str) -> Result<(), SandboxError> {
        let target = self.resolve(id, path).await?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| SandboxError::Io(format!("Failed to create parent directory: {e}")))?;
        }
        tokio::fs::write(&target, content)
            .await
            .map_err(|e| SandboxError::Io(format!("Failed to write {path}: {e}")))
    }

    async fn read_file(&self, id: &str, path: &str) -> Result<String, SandboxError> {
        let target = self.resolve(id, path).await?;
        match tokio::fs::read_to_string(&target).await {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SandboxError::NotFound(path.to_string()))
            }
            Err(e) => Err(SandboxError::Io(format!("Failed to read {path}: {e}"))),
        }
    }

    fn get_host(&self, _id: &str, port: u16) -> Result<String, SandboxError> {
        Ok(format!("localhost:{port}"))
    }

    async fn kill(&self, id: &str) -> Result<(), SandboxError> {
        let children = self.background.lock().await.remove(id).unwrap_or_default();
        for mut child in children {
            if let Err(e) = child.kill().await {
                tracing::warn!(sandbox_id = %id, "failed to stop background process: {}", e);
            }
        }
        Ok(())
    }
}
