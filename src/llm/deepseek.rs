//! DeepSeek 预设（OpenAI 兼容格式）
//!
//! - Base URL: https://api.deepseek.com
//! - 模型: deepseek-chat（编排各阶段均为短输出，默认用它）

use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 创建 DeepSeek 客户端：Key 优先取 `DEEPSEEK_API_KEY`，其次 `OPENAI_API_KEY`
pub fn create_deepseek_client(model: Option<&str>) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    OpenAiClient::new(
        Some(DEEPSEEK_BASE_URL),
        model.unwrap_or(DEEPSEEK_CHAT),
        api_key.as_deref(),
    )
}
