//! 循环结束后的两次辅助模型调用：标题与面向用户的回复
//!
//! 调用失败或返回空 / 畸形文本时回退到固定文案，从不让运行失败。

use std::sync::Arc;

use crate::llm::ModelClient;
use crate::react::prompts::{RESPONSE_PROMPT, TITLE_PROMPT};

pub const FALLBACK_TITLE: &str = "Fragment";
pub const FALLBACK_RESPONSE: &str = "Here's what I built for you.";
/// 标题最多保留的词数
const TITLE_MAX_WORDS: usize = 6;

/// 从 summary 派生标题与回复
pub struct SummaryWriter {
    model: Arc<dyn ModelClient>,
}

impl SummaryWriter {
    pub fn new(model: Arc<dyn ModelClient>) -> Self {
        Self { model }
    }

    pub async fn title(&self, summary: &str) -> String {
        match self.model.complete_text(TITLE_PROMPT, summary).await {
            Ok(raw) => clean_title(&raw).unwrap_or_else(|| FALLBACK_TITLE.to_string()),
            Err(e) => {
                tracing::warn!("title generation failed, using fallback: {}", e);
                FALLBACK_TITLE.to_string()
            }
        }
    }

    pub async fn response(&self, summary: &str) -> String {
        match self.model.complete_text(RESPONSE_PROMPT, summary).await {
            Ok(raw) => clean_response(&raw).unwrap_or_else(|| FALLBACK_RESPONSE.to_string()),
            Err(e) => {
                tracing::warn!("response generation failed, using fallback: {}", e);
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

/// 取首个非空行，去掉引号、标签与结尾标点
fn clean_title(raw: &str) -> Option<String> {
    let line = raw
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('<'))?;
    let line = line
        .trim_start_matches("Title:")
        .trim_matches(|c: char| {
            matches!(c, '"' | '\'' | '`' | '*' | '#' | '.' | '!' | ':') || c.is_whitespace()
        });
    let words: Vec<&str> = line.split_whitespace().take(TITLE_MAX_WORDS).collect();
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn clean_response(raw: &str) -> Option<String> {
    let text = raw.trim();
    if text.is_empty() || text.starts_with('{') {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockModelClient, ModelError};

    #[tokio::test]
    async fn test_title_cleaned() {
        let mock = MockModelClient::new().with_text_replies(vec!["\n\"Expense Tracker\".\n"]);
        let writer = SummaryWriter::new(Arc::new(mock));
        assert_eq!(writer.title("summary").await, "Expense Tracker");
    }

    #[tokio::test]
    async fn test_fallbacks_on_failure_or_empty() {
        let mock = MockModelClient::new()
            .push_text_error(ModelError::RateLimited)
            .with_text_replies(vec!["   "]);
        let writer = SummaryWriter::new(Arc::new(mock));
        assert_eq!(writer.title("s").await, FALLBACK_TITLE);
        assert_eq!(writer.response("s").await, FALLBACK_RESPONSE);
    }
}
