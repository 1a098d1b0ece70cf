//! Agent 编排主循环
//!
//! Routing -> ToolExecuting -> Routing -> ... -> Terminated。
//! 每次 Routing 依次检查：取消、summary 是否已有、路由次数是否到上限；否则进入 ToolExecuting：
//! 调用一次模型（失败在本轮内按 RecoveryEngine 重试），并发执行本轮全部工具调用（结果按请求顺序写回对话），
//! 最后若回复文本含完成标记则写入 summary。任何模型 / 工具异常都在循环边界转为 Termination，不向外抛。

use futures_util::future::join_all;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::{AgentError, AgentState, RecoveryAction, RecoveryEngine, RunPhase, SharedState};
use crate::llm::ModelReply;
use crate::memory::Message;
use crate::react::events::preview;
use crate::react::{GenerationEvent, Planner};
use crate::tools::ToolExecutor;

/// 默认路由次数上限
pub const DEFAULT_MAX_ITERATIONS: usize = 15;
/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 循环结束原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// summary 非空
    Summary,
    /// 路由次数用尽仍无 summary
    Exhausted,
    /// 在某次 Routing 时检测到取消
    Cancelled,
    /// 模型调用不可恢复地失败
    Failed(String),
}

/// 循环执行结果：最终状态、完整对话与路由次数
#[derive(Debug)]
pub struct NetworkResult {
    pub state: AgentState,
    pub messages: Vec<Message>,
    pub routing_steps: usize,
    pub termination: Termination,
}

impl NetworkResult {
    /// 分类运行结果：只有 summary 与 files 都非空才算成功
    pub fn check(&self) -> Result<(), AgentError> {
        match &self.termination {
            Termination::Cancelled => Err(AgentError::Cancelled),
            Termination::Failed(msg) => Err(AgentError::ModelError(msg.clone())),
            Termination::Exhausted => Err(AgentError::LoopExhausted(self.routing_steps)),
            Termination::Summary if self.state.files.is_empty() => Err(AgentError::EmptyResult(
                "no files were generated".to_string(),
            )),
            Termination::Summary if !self.state.has_summary() => Err(AgentError::EmptyResult(
                "no task summary was produced".to_string(),
            )),
            Termination::Summary => Ok(()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.check().is_err()
    }
}

/// 编排会话配置
pub struct NetworkSession<'a> {
    /// Planner（必需）
    pub planner: &'a Planner,
    /// 工具执行器（必需）
    pub executor: &'a ToolExecutor,
    /// 恢复引擎（必需）
    pub recovery: &'a RecoveryEngine,
    /// 取消令牌（必需）
    pub cancel_token: CancellationToken,
    pub max_iterations: usize,
    /// 回复文本中出现即视为完成
    pub completion_marker: String,
    /// 可选：事件推送通道
    pub event_tx: Option<&'a UnboundedSender<GenerationEvent>>,
}

impl<'a> NetworkSession<'a> {
    pub fn new(
        planner: &'a Planner,
        executor: &'a ToolExecutor,
        recovery: &'a RecoveryEngine,
        cancel_token: CancellationToken,
    ) -> Self {
        Self {
            planner,
            executor,
            recovery,
            cancel_token,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            completion_marker: "<task_summary>".to_string(),
            event_tx: None,
        }
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = marker.into();
        self
    }

    /// 设置事件推送通道
    pub fn with_event_tx(mut self, tx: &'a UnboundedSender<GenerationEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, ev: GenerationEvent) {
        if let Some(t) = self.event_tx {
            let _ = t.send(ev);
        }
    }
}

/// 执行编排循环
///
/// history 为注入的历史消息（已按时间升序），prompt 作为最后一条 user 消息追加。
pub async fn run_network(
    session: &NetworkSession<'_>,
    state: &SharedState,
    history: Vec<Message>,
    prompt: &str,
) -> NetworkResult {
    let mut messages = history;
    messages.push(Message::user(prompt));
    let definitions = session.executor.definitions();

    let mut steps = 0usize;
    let termination = loop {
        tracing::debug!(phase = ?RunPhase::Routing, step = steps);
        if session.cancel_token.is_cancelled() {
            session.send_event(GenerationEvent::Error {
                text: "Cancelled by user".to_string(),
            });
            break Termination::Cancelled;
        }
        if state.snapshot().await.has_summary() {
            break Termination::Summary;
        }
        if steps >= session.max_iterations {
            tracing::warn!(steps, "iteration limit reached without a task summary");
            break Termination::Exhausted;
        }

        steps += 1;
        tracing::debug!(phase = ?RunPhase::ToolExecuting, step = steps);
        session.send_event(GenerationEvent::StepUpdate {
            step: steps,
            max_steps: session.max_iterations,
        });

        let reply = match call_model(session, &mut messages, &definitions).await {
            Ok(Some(reply)) => reply,
            Ok(None) => continue,
            Err(e) => {
                session.send_event(GenerationEvent::Error { text: e.to_string() });
                break Termination::Failed(e.to_string());
            }
        };

        let text = reply.text_or_empty().to_string();
        messages.push(Message::assistant_with_calls(
            text.clone(),
            reply.tool_calls.clone(),
        ));

        if !reply.tool_calls.is_empty() {
            for call in &reply.tool_calls {
                session.send_event(GenerationEvent::ToolCall {
                    tool: call.name.clone(),
                    args: call.arguments.clone(),
                });
            }
            let results = join_all(
                reply
                    .tool_calls
                    .iter()
                    .map(|call| session.executor.dispatch(call)),
            )
            .await;
            for (call, result) in reply.tool_calls.iter().zip(results) {
                session.send_event(GenerationEvent::Observation {
                    tool: call.name.clone(),
                    preview: preview(&result, OBSERVATION_PREVIEW_CHARS),
                });
                messages.push(Message::tool(call.id.clone(), result));
            }
        }

        let marked =
            !session.completion_marker.is_empty() && text.contains(&session.completion_marker);
        if marked && !state.snapshot().await.has_summary() {
            state.set_summary(text.clone()).await;
        }
        let summary = state.summary().await;
        if !summary.trim().is_empty() {
            session.send_event(GenerationEvent::SummaryDetected {
                preview: preview(&summary, OBSERVATION_PREVIEW_CHARS),
            });
        }
    };

    tracing::info!(
        phase = ?RunPhase::Terminated,
        routing_steps = steps,
        termination = ?termination,
        "network finished"
    );

    NetworkResult {
        state: state.snapshot().await,
        messages,
        routing_steps: steps,
        termination,
    }
}

/// 一次模型调用，含本轮内重试。
/// Ok(None) 表示重试用尽，失败已作为文本写入对话，本轮结束。
async fn call_model(
    session: &NetworkSession<'_>,
    messages: &mut Vec<Message>,
    definitions: &[crate::llm::ToolDefinition],
) -> Result<Option<ModelReply>, AgentError> {
    let mut attempt = 0u32;
    loop {
        session.send_event(GenerationEvent::Thinking);
        let err = match session.planner.plan(messages, definitions).await {
            Ok(reply) => return Ok(Some(reply)),
            Err(e) => e,
        };
        attempt += 1;
        match session.recovery.handle(&err, attempt) {
            RecoveryAction::Retry => {
                tracing::warn!(attempt, "model call failed, retrying: {}", err);
                session.send_event(GenerationEvent::Recovery {
                    action: "Retry".to_string(),
                    detail: err.to_string(),
                });
            }
            RecoveryAction::RetryWithPrompt(prompt) => {
                session.send_event(GenerationEvent::Recovery {
                    action: "RetryWithPrompt".to_string(),
                    detail: prompt.clone(),
                });
                messages.push(Message::user(prompt));
                return Ok(None);
            }
            RecoveryAction::Abort => {
                session.send_event(GenerationEvent::Recovery {
                    action: "Abort".to_string(),
                    detail: err.to_string(),
                });
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModelClient, ModelError};
    use crate::tools::build_toolbox;
    use serde_json::json;
    use std::sync::Arc;

    async fn run(
        mock: Arc<MockModelClient>,
        max_iterations: usize,
        cancel: CancellationToken,
    ) -> NetworkResult {
        let state = SharedState::default();
        let executor = build_toolbox(&state, None, 5);
        let planner = Planner::new(mock, "system");
        let recovery = RecoveryEngine::new(1);
        let session = NetworkSession::new(&planner, &executor, &recovery, cancel)
            .with_max_iterations(max_iterations);
        run_network(&session, &state, Vec::new(), "build a todo app").await
    }

    #[tokio::test]
    async fn test_bound_is_never_exceeded() {
        let mock = Arc::new(MockModelClient::repeating(ModelReply::text("still working")));
        let result = run(mock.clone(), 3, CancellationToken::new()).await;

        assert_eq!(mock.calls(), 3);
        assert_eq!(result.routing_steps, 3);
        assert_eq!(result.termination, Termination::Exhausted);
        assert!(matches!(result.check(), Err(AgentError::LoopExhausted(3))));
    }

    #[tokio::test]
    async fn test_marker_terminates_and_files_merge() {
        let mock = Arc::new(MockModelClient::scripted(vec![
            ModelReply::with_calls(
                None,
                vec![MockModelClient::write_call(
                    "c1",
                    &[("src/App.js", "export default function App() {}")],
                )],
            ),
            ModelReply::text("<task_summary>A todo app</task_summary>"),
        ]));
        let result = run(mock.clone(), 15, CancellationToken::new()).await;

        assert_eq!(mock.calls(), 2);
        assert_eq!(result.termination, Termination::Summary);
        assert!(result.check().is_ok());
        assert!(result.state.files.contains_key("src/App.js"));
        assert!(result.state.summary.contains("A todo app"));
        // user, assistant(call), tool, assistant(summary)
        assert_eq!(result.messages.len(), 4);
    }

    #[tokio::test]
    async fn test_finish_tool_terminates() {
        let mock = Arc::new(MockModelClient::scripted(vec![ModelReply::with_calls(
            None,
            vec![
                MockModelClient::write_call("c1", &[("src/App.js", "x")]),
                MockModelClient::call("c2", "finish", json!({"summary": "done"})),
            ],
        )]));
        let result = run(mock.clone(), 15, CancellationToken::new()).await;
        assert_eq!(mock.calls(), 1);
        assert!(result.check().is_ok());
        assert_eq!(result.state.summary, "done");
    }

    #[tokio::test]
    async fn test_summary_without_files_is_empty_result() {
        let mock = Arc::new(MockModelClient::scripted(vec![ModelReply::text(
            "<task_summary>nothing</task_summary>",
        )]));
        let result = run(mock, 15, CancellationToken::new()).await;
        assert!(matches!(result.check(), Err(AgentError::EmptyResult(_))));
    }

    #[tokio::test]
    async fn test_model_errors_retried_then_fed_back() {
        let mock = Arc::new(
            MockModelClient::new()
                .push_error(ModelError::Network("reset".to_string()))
                .push_error(ModelError::Network("reset".to_string()))
                .push_reply(ModelReply::with_calls(
                    Some("<task_summary>ok</task_summary>".to_string()),
                    vec![MockModelClient::write_call("c1", &[("src/App.js", "x")])],
                )),
        );
        let result = run(mock.clone(), 5, CancellationToken::new()).await;

        // 第 1 步：失败、重试失败 -> 反馈文本；第 2 步：成功
        assert_eq!(mock.calls(), 3);
        assert_eq!(result.routing_steps, 2);
        assert!(result.check().is_ok());
        assert!(result
            .messages
            .iter()
            .any(|m| m.content.starts_with("The previous turn failed")));
    }

    #[tokio::test]
    async fn test_cancel_checked_at_routing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mock = Arc::new(MockModelClient::repeating(ModelReply::text("hi")));
        let result = run(mock.clone(), 5, cancel).await;
        assert_eq!(mock.calls(), 0);
        assert!(matches!(result.check(), Err(AgentError::Cancelled)));
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fed_back() {
        let mock = Arc::new(MockModelClient::scripted(vec![
            ModelReply::with_calls(None, vec![MockModelClient::call("c1", "deploy", json!({}))]),
            ModelReply::with_calls(
                Some("<task_summary>ok</task_summary>".to_string()),
                vec![MockModelClient::write_call("c2", &[("src/App.js", "x")])],
            ),
        ]));
        let result = run(mock, 5, CancellationToken::new()).await;
        assert!(result.check().is_ok());
        let tool_msg = result
            .messages
            .iter()
            .find(|m| m.tool_call_id.as_deref() == Some("c1"))
            .unwrap();
        assert!(tool_msg.content.contains("Hallucinated tool: deploy"));
    }
}
