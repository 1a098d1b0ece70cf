//! 模型层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

pub use mock::MockModelClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{ModelClient, ModelError, ModelReply, ToolDefinition};

use crate::config::AppConfig;
use crate::core::AgentError;

/// 根据 [llm] 配置创建模型客户端：provider = openai | mock
pub fn create_model_from_config(cfg: &AppConfig) -> Result<Arc<dyn ModelClient>, AgentError> {
    match cfg.llm.provider.as_str() {
        "mock" => {
            tracing::warn!("Using mock model client");
            Ok(Arc::new(MockModelClient::new()))
        }
        "openai" => {
            let client = OpenAiClient::new(
                cfg.llm.base_url.as_deref(),
                &cfg.llm.model,
                cfg.llm.api_key.as_deref(),
                cfg.llm.request_timeout_secs,
            )
            .map_err(|e| AgentError::ConfigError(e.to_string()))?;
            Ok(Arc::new(client))
        }
        other => Err(AgentError::ConfigError(format!(
            "Unknown llm provider: {other}"
        ))),
    }
}
