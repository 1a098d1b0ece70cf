//! OpenAI 兼容 API 客户端
//!
//! 直接调用 `/chat/completions`（可配置 base_url），支持 function calling；
//! 适用于 OpenAI、Gemini OpenAI 兼容端点、DeepSeek、自建代理等。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::llm::{ModelClient, ModelError, ModelReply, ToolDefinition};
use crate::memory::{Message, Role, ToolCall};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    pub usage: TokenUsage,
}

impl OpenAiClient {
    pub fn new(
        base_url: Option<&str>,
        model: &str,
        api_key: Option<&str>,
        timeout_secs: u64,
    ) -> Result<Self, ModelError> {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_default();
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ModelError::Other(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url
                .unwrap_or("https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.to_string(),
            usage: TokenUsage::default(),
        })
    }

    fn to_wire_messages(system: &str, history: &[Message]) -> Vec<WireMessage> {
        let mut out = Vec::with_capacity(history.len() + 1);
        out.push(WireMessage::text("system", system));
        for m in history {
            let wire = match m.role {
                Role::System => WireMessage::text("system", &m.content),
                Role::User => WireMessage::text("user", &m.content),
                Role::Assistant if m.tool_calls.is_empty() => {
                    WireMessage::text("assistant", &m.content)
                }
                Role::Assistant => WireMessage {
                    role: "assistant".to_string(),
                    content: if m.content.is_empty() {
                        None
                    } else {
                        Some(m.content.clone())
                    },
                    tool_calls: Some(
                        m.tool_calls
                            .iter()
                            .map(|tc| WireToolCall {
                                id: tc.id.clone(),
                                kind: "function".to_string(),
                                function: WireFunctionCall {
                                    name: tc.name.clone(),
                                    arguments: match &tc.arguments {
                                        serde_json::Value::String(raw) => raw.clone(),
                                        other => other.to_string(),
                                    },
                                },
                            })
                            .collect(),
                    ),
                    tool_call_id: None,
                },
                Role::Tool => WireMessage {
                    role: "tool".to_string(),
                    content: Some(m.content.clone()),
                    tool_calls: None,
                    tool_call_id: m.tool_call_id.clone(),
                },
            };
            out.push(wire);
        }
        out
    }
}

#[async_trait]
impl ModelClient for OpenAiClient {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn complete(
        &self,
        system: &str,
        history: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<ModelReply, ModelError> {
        let request = WireRequest {
            model: self.model.clone(),
            messages: Self::to_wire_messages(system, history),
            tools: if tools.is_empty() {
                None
            } else {
                Some(
                    tools
                        .iter()
                        .map(|t| WireTool {
                            kind: "function".to_string(),
                            function: WireFunction {
                                name: t.name.clone(),
                                description: t.description.clone(),
                                parameters: t.parameters.clone(),
                            },
                        })
                        .collect(),
                )
            },
        };

        let mut req = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&request);
        if !self.api_key.is_empty() {
            req = req.bearer_auth(&self.api_key);
        }

        let response = req
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let text = response.text().await.unwrap_or_default();
            if status == 429 {
                return Err(ModelError::RateLimited);
            }
            return Err(ModelError::Api {
                status,
                message: text,
            });
        }

        let body: WireResponse = response
            .json()
            .await
            .map_err(|e| ModelError::Parse(e.to_string()))?;

        self.reply_from(body)
    }
}

impl OpenAiClient {
    /// 响应体 -> ModelReply：累计 token 用量；参数不是合法 JSON 时原样保留为字符串，交由工具校验报错
    fn reply_from(&self, body: WireResponse) -> Result<ModelReply, ModelError> {
        if let Some(usage) = &body.usage {
            self.usage.add(usage.prompt_tokens, usage.completion_tokens);
        }

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Parse("No choices in response".to_string()))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(|tc| ToolCall {
                id: tc.id,
                name: tc.function.name,
                arguments: serde_json::from_str(&tc.function.arguments)
                    .unwrap_or(serde_json::Value::String(tc.function.arguments)),
            })
            .collect();

        Ok(ModelReply {
            text: choice.message.content,
            tool_calls,
        })
    }
}

#[derive(Serialize)]
struct WireRequest {
    model: String,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<WireTool>>,
}

#[derive(Serialize)]
struct WireMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Serialize)]
struct WireTool {
    #[serde(rename = "type")]
    kind: String,
    function: WireFunction,
}

#[derive(Serialize)]
struct WireFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Serialize, Deserialize)]
struct WireToolCall {
    id: String,
    #[serde(rename = "type", default = "default_call_type")]
    kind: String,
    function: WireFunctionCall,
}

fn default_call_type() -> String {
    "function".to_string()
}

#[derive(Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Deserialize)]
struct WireResponse {
    choices: Vec<WireChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireReplyMessage,
}

#[derive(Deserialize)]
struct WireReplyMessage {
    content: Option<String>,
    tool_calls: Option<Vec<WireToolCall>>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_messages_carry_tool_calls_and_results() {
        let history = vec![
            Message::user("build a todo app"),
            Message::assistant_with_calls(
                "",
                vec![ToolCall {
                    id: "call_1".to_string(),
                    name: "terminal".to_string(),
                    arguments: serde_json::json!({"command": "ls"}),
                }],
            ),
            Message::tool("call_1", "src\n"),
        ];
        let wire = OpenAiClient::to_wire_messages("sys", &history);
        assert_eq!(wire.len(), 4);
        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json[0]["role"], "system");
        assert_eq!(json[2]["tool_calls"][0]["function"]["name"], "terminal");
        assert_eq!(
            json[2]["tool_calls"][0]["function"]["arguments"],
            "{\"command\":\"ls\"}"
        );
        assert!(json[2].get("content").is_none());
        assert_eq!(json[3]["tool_call_id"], "call_1");
    }

    fn client() -> OpenAiClient {
        OpenAiClient::new(Some("http://localhost:1"), "test-model", Some("k"), 5).unwrap()
    }

    fn body(raw: &str) -> WireResponse {
        serde_json::from_str(raw).unwrap()
    }

    #[test]
    fn test_reply_with_malformed_arguments_is_kept_raw() {
        let raw = r#"{"choices":[{"message":{"content":null,"tool_calls":[
            {"id":"c1","type":"function","function":{"name":"readFiles","arguments":"{oops"}},
            {"id":"c2","function":{"name":"terminal","arguments":"{\"command\":\"ls\"}"}}]}}]}"#;
        let reply = client().reply_from(body(raw)).unwrap();
        assert!(reply.text.is_none());
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].name, "readFiles");
        assert_eq!(
            reply.tool_calls[0].arguments,
            serde_json::Value::String("{oops".to_string())
        );
        assert_eq!(reply.tool_calls[1].arguments["command"], "ls");
    }

    #[test]
    fn test_reply_without_choices_is_parse_error() {
        let c = client();
        let err = c
            .reply_from(body(r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":0}}"#))
            .unwrap_err();
        assert!(matches!(err, ModelError::Parse(ref m) if m.contains("No choices")));
        assert_eq!(c.token_usage(), (3, 0, 3));
    }

    #[test]
    fn test_usage_accumulates_across_replies() {
        let c = client();
        let raw = r#"{"choices":[{"message":{"content":"hi"}}],"usage":{"prompt_tokens":10,"completion_tokens":4}}"#;
        let reply = c.reply_from(body(raw)).unwrap();
        assert_eq!(reply.text.as_deref(), Some("hi"));
        assert!(reply.tool_calls.is_empty());
        c.reply_from(body(raw)).unwrap();
        assert_eq!(c.token_usage(), (20, 8, 28));

        c.reply_from(body(r#"{"choices":[{"message":{"content":"x"}}]}"#)).unwrap();
        assert_eq!(c.token_usage(), (20, 8, 28));
    }
}
