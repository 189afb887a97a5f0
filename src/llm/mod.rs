//! LLM 层：客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）与结构化回复解析

pub mod deepseek;
pub mod mock;
pub mod openai;
pub mod reply;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use mock::{MockLlmClient, MockReply};
pub use openai::{OpenAiClient, TokenUsage};
pub use reply::{extract_json_block, neutralize_control_chars, parse_json_reply};
pub use traits::{complete_within, LlmClient, LlmError, TokenStream};
