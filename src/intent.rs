//! 意图识别
//!
//! 一次 temperature=0 的 LLM 调用，把用户输入标为 question（需要检索）或 small_talk（跳过检索）。
//! 任何失败（超时、输出无法识别）都按 question 处理：宁可多检索，也不静默跳过。

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::conversation::Message;
use crate::core::OrchestratorError;
use crate::llm::{complete_within, LlmClient};

/// 识别出的意图类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// 需要检索的问题
    Question,
    /// 寒暄、致谢等，无需检索
    SmallTalk,
}

pub(crate) const CLASSIFIER_PROMPT: &str = r#"You are an intent classifier for a business assistant.
Decide whether the user's message needs information lookup or is small talk.

Output ONLY one of these labels (no explanation):
- question: asks for facts, data, status, documents, customers, numbers or anything that needs lookup
- small_talk: greetings, thanks, farewells, chit-chat, questions about the assistant itself

Output format: just the label, nothing else."#;

/// 意图识别器
pub struct IntentClassifier {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl IntentClassifier {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// 识别用户意图；失败时返回 Question
    pub async fn classify(&self, message: &str) -> Intent {
        match self.try_classify(message).await {
            Ok(intent) => intent,
            Err(e) => {
                tracing::warn!(kind = e.kind(), "{}, defaulting to question", e);
                Intent::Question
            }
        }
    }

    async fn try_classify(&self, message: &str) -> Result<Intent, OrchestratorError> {
        let messages = vec![
            Message::system(CLASSIFIER_PROMPT),
            Message::user(format!("User message: {message}")),
        ];
        let response = complete_within(self.llm.as_ref(), &messages, 0.0, self.timeout)
            .await
            .map_err(|e| OrchestratorError::ClassificationFailure(e.to_string()))?;

        parse_label(&response).ok_or_else(|| {
            OrchestratorError::ClassificationFailure(format!("unrecognized label: {}", response.trim()))
        })
    }
}

fn parse_label(response: &str) -> Option<Intent> {
    let label: String = response
        .trim()
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '_' || c.is_whitespace())
        .collect();
    let label = label.trim().replace(' ', "_");

    match label.as_str() {
        "question" => Some(Intent::Question),
        "small_talk" | "smalltalk" => Some(Intent::SmallTalk),
        _ => None,
    }
}
