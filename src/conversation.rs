//! 对话轮次：历史消息 + 当前用户输入
//!
//! 历史由调用方持有，只读；编排器每轮只在调用方一侧追加一条回复，从不重排或去重。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 一轮对话的输入：此前的 (role, text) 序列 + 本轮用户消息
#[derive(Clone, Copy, Debug)]
pub struct ConversationTurn<'a> {
    pub history: &'a [Message],
    pub message: &'a str,
}

impl<'a> ConversationTurn<'a> {
    pub fn new(message: &'a str, history: &'a [Message]) -> Self {
        Self { history, message }
    }

    /// 最近 `max_turns` 轮（每轮约 user + assistant 两条），每条截断到 `max_chars` 个字符；保持原有顺序
    pub fn recent_history(&self, max_turns: usize, max_chars: usize) -> Vec<Message> {
        let keep = max_turns.saturating_mul(2);
        let start = self.history.len().saturating_sub(keep);
        self.history[start..]
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| Message {
                role: m.role,
                content: truncate_chars(&m.content, max_chars),
            })
            .collect()
    }
}

/// 按字符（非字节）截断，超出时追加省略号
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
