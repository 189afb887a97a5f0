//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：complete（非流式）、complete_stream（流式 Token）。
//! 每类调用（分类 / 选源 / 抽取 / 合成）的超时由调用方通过 [`complete_within`] 施加。

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream};
use thiserror::Error;

use crate::conversation::Message;

/// LLM 调用错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("LLM API error: {0}")]
    Api(String),

    #[error("LLM call timed out after {0:?}")]
    Timeout(Duration),

    #[error("LLM returned an empty response")]
    EmptyResponse,

    #[error("LLM stream error: {0}")]
    Stream(String),
}

/// 流式 Token
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

/// LLM 客户端 trait：非流式完成与流式完成（返回 Token 流）
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成；temperature 为 0 时要求后端尽量确定性输出
    async fn complete(&self, messages: &[Message], temperature: f32) -> Result<String, LlmError>;

    /// 流式完成，默认实现退化为一次性返回整段文本
    async fn complete_stream(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<TokenStream, LlmError> {
        let content = self.complete(messages, temperature).await?;
        Ok(Box::pin(stream::iter(vec![Ok(content)])))
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 在 `limit` 内完成一次调用；超时映射为 [`LlmError::Timeout`]，空回复映射为 [`LlmError::EmptyResponse`]
pub async fn complete_within(
    llm: &dyn LlmClient,
    messages: &[Message],
    temperature: f32,
    limit: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(limit, llm.complete(messages, temperature)).await {
        Ok(Ok(text)) if text.trim().is_empty() => Err(LlmError::EmptyResponse),
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(limit)),
    }
}
