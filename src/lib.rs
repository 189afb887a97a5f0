//! Honeycomb - Rust 多源问答编排
//!
//! 模块划分：
//! - **conversation**: 消息、对话轮次与历史窗口
//! - **catalog**: 声明式数据源目录（TOML）与可用性
//! - **intent**: 意图识别（问题 / 闲聊）
//! - **selector**: LLM 选源（目录优先推理）与关键词回退
//! - **entity**: 名称抽取、图检索、打分与置信度门限
//! - **tools**: 工具注册表、HTTP / 固定结果工具与并发执行器
//! - **synthesizer**: 答案合成与澄清问题
//! - **briefing**: 领域简报（TTL 缓存）
//! - **core**: 单轮状态机、编排器与构建器
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）
//! - **config**: 应用配置加载（TOML + 环境变量）

pub mod briefing;
pub mod catalog;
pub mod config;
pub mod conversation;
pub mod core;
pub mod entity;
pub mod intent;
pub mod llm;
pub mod observability;
pub mod selector;
pub mod synthesizer;
pub mod tools;

pub use crate::core::{Orchestrator, OrchestratorBuilder, OrchestratorError, TurnPhase, TurnReport};
pub use synthesizer::OrchestrationResult;
