//! 工具执行器
//!
//! 持有 ToolRegistry 与单次调用超时。execute_sources 为每个选中的数据源并发发起一次调用并 join-all 汇合；
//! 单个数据源的失败 / 超时 / 缺少实体只影响它自己的 ToolOutcome，不会中断兄弟调用。执行器内部不做重试。
//! 每次调用输出结构化审计日志（JSON）。

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use serde::Serialize;
use tokio::time::timeout;

use crate::catalog::SourceDefinition;
use crate::conversation::truncate_chars;
use crate::core::OrchestratorError;
use crate::tools::{ToolArgs, ToolRegistry};

/// 缺少实体绑定时的跳过原因
pub const SKIP_ENTITY_UNRESOLVED: &str = "required entity not resolved";

/// 单个数据源的调用状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolStatus {
    Ok { payload: String },
    Error { message: String },
    Skipped { reason: String },
}

/// 单个数据源的调用结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolOutcome {
    pub source_id: String,
    pub tool_name: String,
    #[serde(flatten)]
    pub status: ToolStatus,
}

impl ToolOutcome {
    pub fn payload(&self) -> Option<&str> {
        match &self.status {
            ToolStatus::Ok { payload } => Some(payload),
            _ => None,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self.status, ToolStatus::Ok { .. })
    }

    pub fn label(&self) -> &'static str {
        match self.status {
            ToolStatus::Ok { .. } => "ok",
            ToolStatus::Error { .. } => "error",
            ToolStatus::Skipped { .. } => "skipped",
        }
    }
}

/// 一轮的全部结果，按 source_id 索引；键唯一，合成阶段只依赖 source_id 而非调用顺序
pub type ToolOutcomes = BTreeMap<String, ToolOutcome>;

/// 工具执行器：对每次调用施加超时，并将结果映射为 OrchestratorError / ToolOutcome
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
    max_result_chars: usize,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout: Duration) -> Self {
        Self {
            registry,
            timeout,
            max_result_chars: 8000,
        }
    }

    pub fn with_max_result_chars(mut self, max: usize) -> Self {
        self.max_result_chars = max;
        self
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// 执行指定工具；超时返回 ToolTimeout，工具返回 Err 则转为 ToolFailure；输出 JSON 审计日志
    pub async fn execute(
        &self,
        tool_name: &str,
        args: &ToolArgs,
    ) -> Result<String, OrchestratorError> {
        if !self.registry.contains(tool_name) {
            return Err(OrchestratorError::UnknownTool(tool_name.to_string()));
        }

        let start = Instant::now();
        let result = timeout(self.timeout, self.registry.execute(tool_name, args.to_value())).await;

        let outcome = match &result {
            Ok(Ok(_)) => "ok",
            Ok(Err(_)) => "error",
            Err(_) => "timeout",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "source": args.source_id,
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": truncate_chars(&args.query, 200),
            "entity_id": args.entity_id,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(Ok(content)) => Ok(truncate_chars(&content, self.max_result_chars)),
            Ok(Err(e)) => Err(OrchestratorError::ToolFailure(e)),
            Err(_) => Err(OrchestratorError::ToolTimeout(tool_name.to_string())),
        }
    }

    /// 为每个数据源并发调用其工具（fan-out），全部结束后汇合（fan-in）
    pub async fn execute_sources(
        &self,
        query: &str,
        sources: &[SourceDefinition],
        entity_id: Option<&str>,
    ) -> ToolOutcomes {
        let calls = sources
            .iter()
            .map(|source| self.invoke_source(source, query, entity_id));
        join_all(calls)
            .await
            .into_iter()
            .map(|outcome| (outcome.source_id.clone(), outcome))
            .collect()
    }

    async fn invoke_source(
        &self,
        source: &SourceDefinition,
        query: &str,
        entity_id: Option<&str>,
    ) -> ToolOutcome {
        let status = if source.requires_entity_id && entity_id.is_none() {
            tracing::info!(source = %source.id, "Skipping source: {}", SKIP_ENTITY_UNRESOLVED);
            ToolStatus::Skipped {
                reason: SKIP_ENTITY_UNRESOLVED.to_string(),
            }
        } else {
            let args = ToolArgs {
                source_id: source.id.clone(),
                query: query.to_string(),
                entity_id: entity_id
                    .filter(|_| source.requires_entity_id)
                    .map(String::from),
            };
            match self.execute(&source.tool_name, &args).await {
                Ok(payload) => ToolStatus::Ok { payload },
                Err(e) => {
                    tracing::warn!(source = %source.id, kind = e.kind(), "{}", e);
                    ToolStatus::Error {
                        message: e.to_string(),
                    }
                }
            }
        };

        ToolOutcome {
            source_id: source.id.clone(),
            tool_name: source.tool_name.clone(),
            status,
        }
    }
}
