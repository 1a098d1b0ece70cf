//! 无头生成服务
//!
//! 对外提供 StartGeneration / GetStatus / Cancel：每次运行在后台任务中独立构建上下文
//! （沙箱句柄、共享状态、工具箱、Planner），结束时拆除沙箱并把结果（或错误标记）写入存储。
//! 运行状态保存在进程内登记表；不是本进程启动的项目回退到存储中的最新产物。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, GenerationMode};
use crate::core::{AgentError, AgentState, GenerationStatus, RecoveryEngine, SharedState};
use crate::llm::{create_model_from_config, ModelClient};
use crate::materialize::{materialize, CanonicalProject, RawFiles};
use crate::memory::Message;
use crate::react::prompts::{code_agent_prompt, DIRECT_PROMPT};
use crate::react::{
    extract_json_block, run_network, GenerationEvent, NetworkSession, Planner, SummaryWriter,
};
use crate::sandbox::{create_sandbox_from_config, SandboxHandle, SandboxProvider};
use crate::store::{
    create_store_from_config, ArtifactRecord, ArtifactStore, MessageRecord, MessageRole,
    MessageType,
};
use crate::tools::build_toolbox;

/// 错误运行写入的固定提示
pub const ERROR_MESSAGE: &str =
    "Sorry, I encountered an error while generating your app. Please try again.";
/// 预览不由沙箱提供时的占位标识（浏览器端 sandpack 渲染）
pub const SANDPACK_PREVIEW: &str = "sandpack://preview";
const DIRECT_FALLBACK_TITLE: &str = "React App";
const DIRECT_FALLBACK_RESPONSE: &str = "I've created your React app!";

/// GetStatus 的返回
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub status: GenerationStatus,
    pub artifact: Option<ArtifactRecord>,
    pub error: Option<String>,
}

/// 一次运行的最终结果
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub project_id: String,
    pub status: GenerationStatus,
    /// 写入存储的助手消息
    pub message: Option<MessageRecord>,
    pub artifact: Option<ArtifactRecord>,
    pub project: Option<CanonicalProject>,
    pub error: Option<String>,
    /// 路由次数（直接生成模式为 0）
    pub routing_steps: usize,
}

impl GenerationOutcome {
    pub fn is_error(&self) -> bool {
        self.status == GenerationStatus::Error
    }
}

/// 成功运行在持久化之前的产出
struct Generated {
    title: String,
    response: String,
    project: CanonicalProject,
    preview_handle: String,
    routing_steps: usize,
}

struct RunEntry {
    status: GenerationStatus,
    cancel: CancellationToken,
    artifact: Option<ArtifactRecord>,
    error: Option<String>,
}

struct ServiceInner {
    model: Arc<dyn ModelClient>,
    sandbox: Arc<dyn SandboxProvider>,
    store: Arc<dyn ArtifactStore>,
    config: AppConfig,
    runs: Mutex<HashMap<String, RunEntry>>,
    event_tx: Option<UnboundedSender<GenerationEvent>>,
}

/// 生成服务（克隆共享同一登记表）
#[derive(Clone)]
pub struct GenerationService {
    inner: Arc<ServiceInner>,
}

impl GenerationService {
    pub fn new(
        model: Arc<dyn ModelClient>,
        sandbox: Arc<dyn SandboxProvider>,
        store: Arc<dyn ArtifactStore>,
        config: AppConfig,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                model,
                sandbox,
                store,
                config,
                runs: Mutex::new(HashMap::new()),
                event_tx: None,
            }),
        }
    }

    /// 按配置构建模型、沙箱与存储
    pub async fn from_config(config: AppConfig) -> Result<Self, AgentError> {
        let model = create_model_from_config(&config)?;
        let sandbox = create_sandbox_from_config(&config)?;
        let store = create_store_from_config(&config).await?;
        Ok(Self::new(model, sandbox, store, config))
    }

    /// 设置过程事件通道（须在首次 start_generation 之前调用）
    pub fn with_event_tx(self, tx: UnboundedSender<GenerationEvent>) -> Self {
        match Arc::try_unwrap(self.inner) {
            Ok(mut inner) => {
                inner.event_tx = Some(tx);
                Self {
                    inner: Arc::new(inner),
                }
            }
            Err(inner) => {
                tracing::warn!("service already shared, event channel not attached");
                Self { inner }
            }
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn store(&self) -> Arc<dyn ArtifactStore> {
        self.inner.store.clone()
    }

    /// 启动一次生成：写入用户消息，后台执行，立即返回任务句柄
    pub async fn start_generation(
        &self,
        prompt: &str,
        project_id: &str,
    ) -> Result<JoinHandle<GenerationOutcome>, AgentError> {
        let cancel = CancellationToken::new();
        {
            let mut runs = self.inner.runs.lock().await;
            if runs
                .get(project_id)
                .is_some_and(|r| r.status == GenerationStatus::Generating)
            {
                return Err(AgentError::AlreadyRunning(project_id.to_string()));
            }
            runs.insert(
                project_id.to_string(),
                RunEntry {
                    status: GenerationStatus::Generating,
                    cancel: cancel.clone(),
                    artifact: None,
                    error: None,
                },
            );
        }

        let prepared = self.prepare(prompt, project_id).await;
        let history = match prepared {
            Ok(h) => h,
            Err(e) => {
                self.finish_entry(project_id, GenerationStatus::Error, None, Some(e.to_string()))
                    .await;
                return Err(e);
            }
        };

        let service = self.clone();
        let prompt = prompt.to_string();
        let project_id = project_id.to_string();
        Ok(tokio::spawn(async move {
            service.run(&prompt, &project_id, history, cancel).await
        }))
    }

    /// 启动并等待完成
    pub async fn generate(
        &self,
        prompt: &str,
        project_id: &str,
    ) -> Result<GenerationOutcome, AgentError> {
        let handle = self.start_generation(prompt, project_id).await?;
        handle
            .await
            .map_err(|e| AgentError::Internal(format!("generation task failed: {e}")))
    }

    /// 查询状态；既无进行中的运行也无历史产物时返回 None
    pub async fn get_status(&self, project_id: &str) -> Result<Option<StatusReport>, AgentError> {
        if let Some(entry) = self.inner.runs.lock().await.get(project_id) {
            return Ok(Some(StatusReport {
                status: entry.status,
                artifact: entry.artifact.clone(),
                error: entry.error.clone(),
            }));
        }
        let latest = self.inner.store.find_latest_artifact(project_id).await?;
        Ok(latest.map(|(_, artifact)| StatusReport {
            status: GenerationStatus::Completed,
            artifact: Some(artifact),
            error: None,
        }))
    }

    /// 请求取消；在下一次 Routing 时生效。无进行中的运行返回 false
    pub async fn cancel(&self, project_id: &str) -> bool {
        match self.inner.runs.lock().await.get(project_id) {
            Some(entry) if entry.status == GenerationStatus::Generating => {
                tracing::info!(project_id, "cancellation requested");
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    /// 读取历史消息（用于上下文注入），然后写入本次用户消息
    async fn prepare(&self, prompt: &str, project_id: &str) -> Result<Vec<Message>, AgentError> {
        let store = &self.inner.store;
        let limit = self.inner.config.agent.history_limit;
        let history = if limit == 0 {
            Vec::new()
        } else {
            store
                .recent_messages(project_id, limit)
                .await?
                .into_iter()
                .map(|m| match m.role {
                    MessageRole::User => Message::user(m.content),
                    MessageRole::Assistant => Message::assistant(m.content),
                })
                .collect()
        };
        store
            .create_message(project_id, prompt, MessageRole::User, MessageType::Result)
            .await?;
        Ok(history)
    }

    async fn run(
        &self,
        prompt: &str,
        project_id: &str,
        history: Vec<Message>,
        cancel: CancellationToken,
    ) -> GenerationOutcome {
        let mode = self.inner.config.agent.mode;
        tracing::info!(project_id, ?mode, "generation started");

        let result = match mode {
            GenerationMode::Agent => self.run_agent(prompt, project_id, history, cancel).await,
            GenerationMode::Direct => self.run_direct(prompt).await,
        };

        match result {
            Ok(generated) => self.persist_success(project_id, generated).await,
            Err((e, steps)) => self.persist_error(project_id, e, steps).await,
        }
    }

    /// 工具循环模式
    async fn run_agent(
        &self,
        prompt: &str,
        project_id: &str,
        history: Vec<Message>,
        cancel: CancellationToken,
    ) -> Result<Generated, (AgentError, usize)> {
        let cfg = &self.inner.config;

        let sandbox = match SandboxHandle::create(self.inner.sandbox.clone(), cfg.sandbox.timeout_secs).await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::warn!(project_id, "sandbox unavailable, continuing without one: {}", e);
                None
            }
        };

        if let Some(sb) = &sandbox {
            for command in &cfg.sandbox.setup_commands {
                if let Err(e) = sb.run(command).await {
                    tracing::warn!(sandbox_id = %sb.id(), command = %command, "setup command failed: {}", e);
                }
            }
        }

        let initial = self.initial_state(project_id, sandbox.as_ref()).await;
        let state = SharedState::new(initial);
        let executor = build_toolbox(&state, sandbox.as_ref(), cfg.tools.tool_timeout_secs);
        let system_prompt = code_agent_prompt(
            &cfg.agent.completion_marker,
            cfg.agent.system_prompt_path.as_deref(),
        );
        let planner = Planner::new(self.inner.model.clone(), system_prompt);
        let recovery = RecoveryEngine::new(cfg.agent.model_retries);

        let mut session = NetworkSession::new(&planner, &executor, &recovery, cancel)
            .with_max_iterations(cfg.agent.max_iterations)
            .with_completion_marker(cfg.agent.completion_marker.clone());
        if let Some(tx) = &self.inner.event_tx {
            session = session.with_event_tx(tx);
        }

        let result = run_network(&session, &state, history, prompt).await;
        let steps = result.routing_steps;
        let (prompt_tokens, completion_tokens, total_tokens) = planner.token_usage();
        tracing::info!(project_id, steps, prompt_tokens, completion_tokens, total_tokens, "agent loop finished");

        if let Err(e) = result.check() {
            release_sandbox(sandbox.as_ref()).await;
            return Err((e, steps));
        }

        let writer = SummaryWriter::new(self.inner.model.clone());
        let title = writer.title(&result.state.summary).await;
        let response = writer.response(&result.state.summary).await;

        let preview_handle = self.start_preview(sandbox.as_ref()).await;
        if preview_handle == SANDPACK_PREVIEW {
            release_sandbox(sandbox.as_ref()).await;
        }

        let project = materialize(&RawFiles::from_state(&result.state.files));
        Ok(Generated {
            title,
            response,
            project,
            preview_handle,
            routing_steps: steps,
        })
    }

    /// 初始状态：可选以项目最近一次产物的文件表为种子（同时写入沙箱）
    async fn initial_state(&self, project_id: &str, sandbox: Option<&SandboxHandle>) -> AgentState {
        if !self.inner.config.agent.seed_previous_files {
            return AgentState::new();
        }
        let files = match self.inner.store.find_latest_artifact(project_id).await {
            Ok(Some((_, artifact))) => artifact.files,
            Ok(None) => return AgentState::new(),
            Err(e) => {
                tracing::warn!(project_id, "failed to load previous files: {}", e);
                return AgentState::new();
            }
        };
        tracing::info!(project_id, files = files.len(), "seeding state with previous files");
        if let Some(sb) = sandbox {
            for (path, content) in &files {
                if let Err(e) = sb.write_file(path, content).await {
                    tracing::warn!(sandbox_id = %sb.id(), file = %path, "failed to seed file: {}", e);
                }
            }
        }
        AgentState::seeded(files)
    }

    /// 在沙箱中后台启动预览服务；任何失败都降级为 sandpack 占位
    async fn start_preview(&self, sandbox: Option<&SandboxHandle>) -> String {
        let cfg = &self.inner.config.sandbox;
        let (Some(sb), Some(command)) = (sandbox, cfg.start_command.as_deref()) else {
            return SANDPACK_PREVIEW.to_string();
        };
        if let Err(e) = sb.spawn_background(command).await {
            tracing::warn!(sandbox_id = %sb.id(), "failed to start preview server: {}", e);
            return SANDPACK_PREVIEW.to_string();
        }
        match sb.get_host(cfg.preview_port) {
            Ok(host) => format!("https://{host}"),
            Err(e) => {
                tracing::warn!(sandbox_id = %sb.id(), "failed to resolve preview host: {}", e);
                SANDPACK_PREVIEW.to_string()
            }
        }
    }

    /// 单次 JSON 生成模式
    async fn run_direct(&self, prompt: &str) -> Result<Generated, (AgentError, usize)> {
        let raw = self
            .inner
            .model
            .complete_text(DIRECT_PROMPT, prompt)
            .await
            .map_err(|e| (crate::react::planner::model_error(e), 0))?;

        let parsed: DirectResponse = serde_json::from_str(extract_json_block(&raw))
            .map_err(|e| (AgentError::JsonParseError(e.to_string()), 0))?;

        let files = RawFiles::from_json(&parsed.files);
        if files.is_empty() {
            return Err((
                AgentError::EmptyResult("no files were generated".to_string()),
                0,
            ));
        }
        if !parsed.generated_files.is_empty() && parsed.generated_files.len() != files.len() {
            tracing::warn!(
                listed = parsed.generated_files.len(),
                received = files.len(),
                "generatedFiles does not match files"
            );
        }

        let title = non_empty(parsed.project_title).unwrap_or_else(|| DIRECT_FALLBACK_TITLE.to_string());
        let response =
            non_empty(parsed.explanation).unwrap_or_else(|| DIRECT_FALLBACK_RESPONSE.to_string());
        Ok(Generated {
            title,
            response,
            project: materialize(&files),
            preview_handle: SANDPACK_PREVIEW.to_string(),
            routing_steps: 0,
        })
    }

    async fn persist_success(&self, project_id: &str, generated: Generated) -> GenerationOutcome {
        let stored = self
            .inner
            .store
            .create_result_with_artifact(
                project_id,
                &generated.response,
                &generated.title,
                &generated.project.files,
                &generated.preview_handle,
            )
            .await;

        match stored {
            Ok((message, artifact)) => {
                tracing::info!(
                    project_id,
                    title = %artifact.title,
                    files = artifact.files.len(),
                    preview = %artifact.preview_handle,
                    "generation completed"
                );
                self.send_event(GenerationEvent::Completed {
                    title: artifact.title.clone(),
                });
                self.finish_entry(
                    project_id,
                    GenerationStatus::Completed,
                    Some(artifact.clone()),
                    None,
                )
                .await;
                GenerationOutcome {
                    project_id: project_id.to_string(),
                    status: GenerationStatus::Completed,
                    message: Some(message),
                    artifact: Some(artifact),
                    project: Some(generated.project),
                    error: None,
                    routing_steps: generated.routing_steps,
                }
            }
            Err(e) => {
                self.persist_error(project_id, AgentError::Store(e), generated.routing_steps)
                    .await
            }
        }
    }

    /// 错误运行：写入错误标记消息，不创建产物
    async fn persist_error(
        &self,
        project_id: &str,
        err: AgentError,
        routing_steps: usize,
    ) -> GenerationOutcome {
        tracing::error!(project_id, routing_steps, "generation failed: {}", err);
        self.send_event(GenerationEvent::Error {
            text: err.to_string(),
        });
        let message = match self
            .inner
            .store
            .create_message(project_id, ERROR_MESSAGE, MessageRole::Assistant, MessageType::Error)
            .await
        {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::error!(project_id, "failed to persist error message: {}", e);
                None
            }
        };
        self.finish_entry(project_id, GenerationStatus::Error, None, Some(err.to_string()))
            .await;
        GenerationOutcome {
            project_id: project_id.to_string(),
            status: GenerationStatus::Error,
            message,
            artifact: None,
            project: None,
            error: Some(err.to_string()),
            routing_steps,
        }
    }

    async fn finish_entry(
        &self,
        project_id: &str,
        status: GenerationStatus,
        artifact: Option<ArtifactRecord>,
        error: Option<String>,
    ) {
        if let Some(entry) = self.inner.runs.lock().await.get_mut(project_id) {
            entry.status = status;
            entry.artifact = artifact;
            entry.error = error;
        }
    }

    fn send_event(&self, ev: GenerationEvent) {
        if let Some(tx) = &self.inner.event_tx {
            let _ = tx.send(ev);
        }
    }
}

async fn release_sandbox(sandbox: Option<&SandboxHandle>) {
    if let Some(sb) = sandbox {
        if let Err(e) = sb.kill().await {
            tracing::warn!(sandbox_id = %sb.id(), "failed to release sandbox: {}", e);
        }
    }
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

/// 直接生成模式的 JSON 响应
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectResponse {
    #[serde(default)]
    project_title: String,
    #[serde(default)]
    explanation: String,
    #[serde(default)]
    files: serde_json::Value,
    #[serde(default)]
    generated_files: Vec<String>,
}
