//! 编排错误类型
//!
//! 除 Cancelled 与合成阶段的 Llm 外，其余变体都在流水线内部被降级处理（记录日志后走回退路径），不会返回给调用方。

use thiserror::Error;

use crate::llm::LlmError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    /// 意图分类失败 -> 默认按 question 处理
    #[error("Classification failure: {0}")]
    ClassificationFailure(String),

    /// 选源失败 -> 关键词回退
    #[error("Selection failure: {0}")]
    SelectionFailure(String),

    /// 实体名抽取失败 -> 正则启发式
    #[error("Extraction failure: {0}")]
    ExtractionFailure(String),

    #[error("Tool execution failed: {0}")]
    ToolFailure(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 整轮被取消（如客户端断开），不输出部分答案
    #[error("Turn cancelled")]
    Cancelled,

    #[error(transparent)]
    Llm(#[from] LlmError),
}

impl OrchestratorError {
    /// 日志中使用的分类名
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::ClassificationFailure(_) => "ClassificationFailure",
            OrchestratorError::SelectionFailure(_) => "SelectionFailure",
            OrchestratorError::ExtractionFailure(_) => "ExtractionFailure",
            OrchestratorError::ToolFailure(_)
            | OrchestratorError::ToolTimeout(_)
            | OrchestratorError::UnknownTool(_) => "ToolFailure",
            OrchestratorError::Cancelled => "Cancelled",
            OrchestratorError::Llm(_) => "LlmFailure",
        }
    }
}
