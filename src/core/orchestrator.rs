//! 编排器：单轮问答的主控流程
//!
//! 意图识别 -> 选源 -> （需要时）实体消歧 -> 并发工具调用 -> 合成答案 / 澄清问题。
//! 编排器只持有启动后不可变的组件；每轮的中间数据都是本轮局部的，并发轮次之间不共享可变状态。
//! 每轮运行在带 turn_id 的 tracing span 中；取消令牌在阶段之间检查，并与每个阶段竞速。

use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::catalog::{SourceCatalog, SourceDefinition};
use crate::conversation::{ConversationTurn, Message};
use crate::core::{OrchestratorError, TurnPhase, TurnReport};
use crate::entity::EntityResolver;
use crate::intent::{Intent, IntentClassifier};
use crate::llm::TokenStream;
use crate::selector::SourceSelector;
use crate::synthesizer::{AnswerSynthesizer, OrchestrationResult};
use crate::tools::ToolExecutor;

/// 单轮问答编排器（由 OrchestratorBuilder 构建）
pub struct Orchestrator {
    pub(crate) catalog: SourceCatalog,
    pub(crate) classifier: IntentClassifier,
    pub(crate) selector: SourceSelector,
    pub(crate) resolver: EntityResolver,
    pub(crate) executor: ToolExecutor,
    pub(crate) synthesizer: AnswerSynthesizer,
}

/// 与取消令牌竞速；令牌先触发则返回 Cancelled
async fn guarded<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Result<T, OrchestratorError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OrchestratorError::Cancelled),
        out = fut => Ok(out),
    }
}

impl Orchestrator {
    pub fn catalog(&self) -> &SourceCatalog {
        &self.catalog
    }

    /// 处理一轮对话
    pub async fn handle_turn(
        &self,
        message: &str,
        history: &[Message],
    ) -> Result<OrchestrationResult, OrchestratorError> {
        self.handle_turn_with_cancel(message, history, CancellationToken::new())
            .await
    }

    /// 可取消的单轮处理；取消后不输出部分答案
    pub async fn handle_turn_with_cancel(
        &self,
        message: &str,
        history: &[Message],
        cancel: CancellationToken,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let report = self.run(message, history, cancel).await?;
        report
            .result
            .ok_or_else(|| OrchestratorError::Llm(crate::llm::LlmError::EmptyResponse))
    }

    /// 处理一轮并返回完整轨迹
    pub async fn handle_turn_report(
        &self,
        message: &str,
        history: &[Message],
    ) -> Result<TurnReport, OrchestratorError> {
        self.run(message, history, CancellationToken::new()).await
    }

    /// 流式处理：只输出答案 token；澄清问题作为单个 chunk
    pub async fn handle_turn_stream(
        &self,
        message: &str,
        history: &[Message],
    ) -> Result<TokenStream, OrchestratorError> {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("turn", turn_id = %turn_id, streaming = true);
        async {
            let turn = ConversationTurn::new(message, history);
            let cancel = CancellationToken::new();
            let mut report = TurnReport::new(turn_id.clone());
            self.gather(&turn, &cancel, &mut report).await?;
            let small_talk = report.intent == Some(Intent::SmallTalk);
            let stream = self
                .synthesizer
                .synthesize_stream(&turn, &report.outcomes, report.entity_uncertain, small_talk)
                .await?;
            report.advance(TurnPhase::Synthesized);
            Ok(stream)
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        message: &str,
        history: &[Message],
        cancel: CancellationToken,
    ) -> Result<TurnReport, OrchestratorError> {
        let turn_id = uuid::Uuid::new_v4().to_string();
        let span = tracing::info_span!("turn", turn_id = %turn_id);
        async {
            tracing::info!(history_len = history.len(), "Turn started");
            let turn = ConversationTurn::new(message, history);
            let mut report = TurnReport::new(turn_id.clone());

            self.gather(&turn, &cancel, &mut report).await?;

            let result = if report.intent == Some(Intent::SmallTalk) {
                guarded(&cancel, self.synthesizer.small_talk(&turn)).await??
            } else {
                guarded(
                    &cancel,
                    self.synthesizer
                        .synthesize(&turn, &report.outcomes, report.entity_uncertain),
                )
                .await??
            };
            report.advance(TurnPhase::Synthesized);

            tracing::info!(
                clarification = result.is_clarification(),
                phases = ?report.phases,
                "Turn finished"
            );
            report.result = Some(result);
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// 合成之前的所有阶段；结果写入 report
    async fn gather(
        &self,
        turn: &ConversationTurn<'_>,
        cancel: &CancellationToken,
        report: &mut TurnReport,
    ) -> Result<(), OrchestratorError> {
        let query = turn.message;

        let intent = guarded(cancel, self.classifier.classify(query)).await?;
        report.intent = Some(intent);
        report.advance(TurnPhase::Classified);
        tracing::info!(intent = ?intent, "Intent classified");

        if intent == Intent::SmallTalk {
            report.advance(TurnPhase::SmallTalk);
            return Ok(());
        }

        let selection = guarded(cancel, self.selector.select(query, &self.catalog)).await?;
        let selected: Vec<SourceDefinition> = selection
            .sources
            .iter()
            .filter_map(|id| self.catalog.get(id))
            .cloned()
            .collect();
        report.selection = Some(selection);
        report.advance(TurnPhase::SourcesSelected);

        let mut entity_id = None;
        if selected.iter().any(|s| s.requires_entity_id) {
            let resolution = guarded(cancel, self.resolver.resolve(query)).await?;
            report.entity_uncertain = resolution.uncertain;
            // 不确定时不向任何数据源传实体 id，需要实体的数据源被跳过
            if !resolution.uncertain {
                entity_id = resolution.entity_id().map(String::from);
            }
            report.resolution = Some(resolution);
            report.advance(TurnPhase::EntitiesResolved);
        } else {
            tracing::debug!("No selected source requires an entity, skipping resolution");
        }

        let outcomes = guarded(
            cancel,
            self.executor
                .execute_sources(query, &selected, entity_id.as_deref()),
        )
        .await?;
        let summary: Vec<String> = outcomes
            .values()
            .map(|o| format!("{}={}", o.source_id, o.label()))
            .collect();
        tracing::info!(outcomes = ?summary, "Tools executed");
        report.outcomes = outcomes;
        report.advance(TurnPhase::ToolsExecuted);
        Ok(())
    }
}
