//! Mock LLM 客户端（用于测试与无 API Key 的本地运行）
//!
//! 按规则匹配：若任一消息包含某条规则的 marker，则返回该规则的脚本回复；无匹配时回显最后一条 User 消息。
//! 规则按注册顺序匹配，回复完全确定（Sequence 按调用次数依次取值，取尽后停在最后一项）。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;

use crate::conversation::{Message, Role};
use crate::llm::{LlmClient, LlmError, TokenStream};

/// 脚本回复
#[derive(Debug, Clone)]
pub enum MockReply {
    /// 固定文本
    Text(String),
    /// 第 n 次调用返回第 n 项
    Sequence(Vec<String>),
    /// 调用失败
    Fail(String),
    /// 挂起指定时长后返回文本（用于超时测试）
    Stall(Duration, String),
}

#[derive(Debug)]
struct MockRule {
    marker: String,
    reply: MockReply,
    calls: AtomicUsize,
}

/// Mock 客户端：规则匹配 + 默认回显
#[derive(Debug, Default)]
pub struct MockLlmClient {
    rules: Vec<MockRule>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册规则：消息中出现 `marker` 时返回 `reply`
    pub fn on(mut self, marker: impl Into<String>, reply: MockReply) -> Self {
        self.rules.push(MockRule {
            marker: marker.into(),
            reply,
            calls: AtomicUsize::new(0),
        });
        self
    }

    /// `on(marker, MockReply::Text(..))` 的简写
    pub fn reply(self, marker: impl Into<String>, text: impl Into<String>) -> Self {
        self.on(marker, MockReply::Text(text.into()))
    }

    /// 某条规则被命中的次数
    pub fn calls(&self, marker: &str) -> usize {
        self.rules
            .iter()
            .filter(|r| r.marker == marker)
            .map(|r| r.calls.load(Ordering::SeqCst))
            .sum()
    }

    fn matching_rule(&self, messages: &[Message]) -> Option<&MockRule> {
        self.rules
            .iter()
            .find(|r| messages.iter().any(|m| m.content.contains(&r.marker)))
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message], _temperature: f32) -> Result<String, LlmError> {
        let Some(rule) = self.matching_rule(messages) else {
            let last_user = messages
                .iter()
                .rev()
                .find(|m| m.role == Role::User)
                .map(|m| m.content.as_str())
                .unwrap_or("(no input)");
            return Ok(format!("Echo from Mock: {last_user}"));
        };

        let n = rule.calls.fetch_add(1, Ordering::SeqCst);
        match &rule.reply {
            MockReply::Text(text) => Ok(text.clone()),
            MockReply::Sequence(items) => items
                .get(n)
                .or_else(|| items.last())
                .cloned()
                .ok_or(LlmError::EmptyResponse),
            MockReply::Fail(reason) => Err(LlmError::Api(reason.clone())),
            MockReply::Stall(delay, text) => {
                tokio::time::sleep(*delay).await;
                Ok(text.clone())
            }
        }
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<TokenStream, LlmError> {
        let content = self.complete(messages, temperature).await?;
        let chunks: Vec<Result<String, LlmError>> = content
            .split_inclusive(' ')
            .map(|s| Ok(s.to_string()))
            .collect();
        Ok(Box::pin(stream::iter(chunks)))
    }
}
