//! 数据源选择器（目录优先推理）
//!
//! 把可用数据源的描述 / 关键词 / 子模块 / 能力标签拼成有界的上下文，让 LLM：
//! 复述查询对应的概念 -> 列举同义词 -> 选出数据源 id -> 以 JSON 返回 reasoning / selected_sources / confidence / alternative_terms。
//! 置信度低于阈值时按固定次数重试；调用或解析失败时走确定性关键词回退。
//! 最后统一执行「强制包含基线」与「最多 max_sources 个」两条约束。

mod fallback;

use std::sync::Arc;
use std::time::Duration;

use schemars::{schema_for, JsonSchema};
use serde::{Deserialize, Serialize};

use crate::catalog::SourceCatalog;
use crate::conversation::Message;
use crate::core::OrchestratorError;
use crate::llm::{complete_within, parse_json_reply, LlmClient};

pub use fallback::{rank_by_keywords, score_source, KeywordScore};

/// 选源结果来自哪条路径
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStrategy {
    Llm,
    KeywordFallback,
    /// 目录为空或没有任何可用数据源
    Empty,
}

/// 选源结果：有序 id 列表、[0,1] 置信度与仅供观测的推理文本
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceSelection {
    pub sources: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
    pub alternative_terms: Vec<String>,
    pub strategy: SelectionStrategy,
}

impl SourceSelection {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.iter().any(|s| s == id)
    }
}

/// LLM 需要返回的结构（schema 由 schemars 生成并写入提示词）
#[derive(Debug, Clone, Deserialize, JsonSchema)]
struct SelectorReply {
    /// The business concept the query maps to, in your own words
    #[serde(default)]
    concept: String,
    /// Short explanation of the mapping (for logs only)
    #[serde(default)]
    reasoning: String,
    /// Chosen source ids, most relevant first
    #[serde(alias = "selectedSources")]
    selected_sources: Vec<String>,
    /// Confidence between 0.0 and 1.0
    confidence: f64,
    /// Synonyms and related terms considered
    #[serde(default, alias = "alternativeTerms")]
    alternative_terms: Vec<String>,
}

fn reply_schema_json() -> String {
    serde_json::to_string_pretty(&schema_for!(SelectorReply)).unwrap_or_default()
}

/// 选源策略参数
#[derive(Debug, Clone)]
pub struct SelectorSettings {
    pub max_sources: usize,
    pub always_include_baseline: bool,
    pub confidence_threshold: f64,
    pub retries: u32,
    pub catalog_context_chars: usize,
    pub timeout: Duration,
}

impl Default for SelectorSettings {
    fn default() -> Self {
        Self {
            max_sources: 3,
            always_include_baseline: true,
            confidence_threshold: 0.7,
            retries: 2,
            catalog_context_chars: 6000,
            timeout: Duration::from_secs(20),
        }
    }
}

/// 数据源选择器
pub struct SourceSelector {
    llm: Arc<dyn LlmClient>,
    settings: SelectorSettings,
}

impl SourceSelector {
    pub fn new(llm: Arc<dyn LlmClient>, settings: SelectorSettings) -> Self {
        Self { llm, settings }
    }

    /// 为查询选择数据源；永不失败
    pub async fn select(&self, query: &str, catalog: &SourceCatalog) -> SourceSelection {
        if catalog.is_empty() {
            return SourceSelection {
                sources: vec![catalog.baseline_id().to_string()],
                confidence: 0.0,
                reasoning: "empty catalog".to_string(),
                alternative_terms: Vec::new(),
                strategy: SelectionStrategy::Empty,
            };
        }
        if catalog.available().next().is_none() {
            tracing::warn!("No source in the catalog is available");
            return SourceSelection {
                sources: Vec::new(),
                confidence: 0.0,
                reasoning: "no available sources".to_string(),
                alternative_terms: Vec::new(),
                strategy: SelectionStrategy::Empty,
            };
        }

        let selection = match self.select_with_llm(query, catalog).await {
            Ok(selection) => selection,
            Err(e) => {
                tracing::warn!(kind = e.kind(), "{}, using keyword fallback", e);
                self.select_with_keywords(query, catalog)
            }
        };
        let selection = self.enforce_limits(selection, catalog);

        tracing::info!(
            sources = ?selection.sources,
            confidence = selection.confidence,
            strategy = ?selection.strategy,
            "Sources selected"
        );
        tracing::debug!(reasoning = %selection.reasoning, terms = ?selection.alternative_terms);
        selection
    }

    fn build_prompt(&self, catalog: &SourceCatalog) -> String {
        format!(
            "You are a data source selector for a business assistant. \
             Given the user's query and the catalog below, decide which sources can answer it.\n\n\
             Steps:\n\
             1. Restate which business concept the query is about.\n\
             2. List synonyms and related terms for that concept (any language).\n\
             3. Choose the matching source ids (at most {max}).\n\
             4. Reply with a single JSON object matching the schema below. No other text.\n\n\
             Prefer meaning over literal keyword overlap: \"payment status\" belongs to an invoicing \
             source even if the word \"invoice\" does not appear. Only use ids from the catalog.\n\n\
             Catalog:\n{catalog}\n\
             Reply schema:\n{schema}",
            max = self.settings.max_sources,
            catalog = catalog.prompt_context(self.settings.catalog_context_chars),
            schema = reply_schema_json(),
        )
    }

    async fn select_with_llm(
        &self,
        query: &str,
        catalog: &SourceCatalog,
    ) -> Result<SourceSelection, OrchestratorError> {
        let messages = vec![
            Message::system(self.build_prompt(catalog)),
            Message::user(format!("User query: {query}")),
        ];

        let mut best: Option<SourceSelection> = None;
        for attempt in 0..=self.settings.retries {
            let result = complete_within(self.llm.as_ref(), &messages, 0.0, self.settings.timeout)
                .await
                .map_err(|e| OrchestratorError::SelectionFailure(e.to_string()))
                .and_then(|raw| decode_reply(&raw, catalog));

            let selection = match (result, best.take()) {
                (Ok(selection), previous) => match previous {
                    Some(prev) if prev.confidence >= selection.confidence => prev,
                    _ => selection,
                },
                // 已有低置信度结果时保留它，不再重试
                (Err(e), Some(prev)) => {
                    tracing::warn!(kind = e.kind(), "{} on retry, keeping earlier selection", e);
                    return Ok(prev);
                }
                (Err(e), None) => return Err(e),
            };

            if selection.confidence >= self.settings.confidence_threshold {
                return Ok(selection);
            }
            tracing::info!(
                attempt,
                confidence = selection.confidence,
                "Low selection confidence"
            );
            best = Some(selection);
        }
        best.ok_or_else(|| OrchestratorError::SelectionFailure("no attempt made".to_string()))
    }

    fn select_with_keywords(&self, query: &str, catalog: &SourceCatalog) -> SourceSelection {
        let (ranked, confidence) = rank_by_keywords(query, catalog);
        let mut sources: Vec<String> = ranked.iter().map(|s| s.source_id.clone()).collect();
        let baseline = catalog.baseline_id().to_string();
        let baseline_available = catalog.baseline().is_some_and(|b| b.is_available());
        if sources.is_empty() && baseline_available {
            sources.push(baseline.clone());
        }
        let reasoning = ranked
            .iter()
            .map(|s| format!("{}={}", s.source_id, s.score))
            .collect::<Vec<_>>()
            .join(", ");

        let mut selection = SourceSelection {
            sources,
            confidence,
            reasoning: format!("keyword scores: [{reasoning}]"),
            alternative_terms: Vec::new(),
            strategy: SelectionStrategy::KeywordFallback,
        };
        // 回退路径无论策略开关如何都至少包含基线
        if baseline_available && !selection.contains(&baseline) {
            let max = self.settings.max_sources.max(1);
            selection.sources.truncate(max - 1);
            selection.sources.push(baseline);
        }
        selection
    }

    /// 去重、强制基线、截断到 max_sources
    fn enforce_limits(&self, mut selection: SourceSelection, catalog: &SourceCatalog) -> SourceSelection {
        let max = self.settings.max_sources.max(1);
        let mut seen = std::collections::HashSet::new();
        selection.sources.retain(|id| seen.insert(id.clone()));

        let baseline = catalog.baseline_id();
        let baseline_available = catalog.baseline().is_some_and(|b| b.is_available());
        if self.settings.always_include_baseline && baseline_available {
            match selection.sources.iter().position(|id| id == baseline) {
                Some(pos) if pos < max => {}
                Some(pos) => {
                    selection.sources.remove(pos);
                    selection.sources.insert(max - 1, baseline.to_string());
                }
                None => {
                    let at = selection.sources.len().min(max - 1);
                    selection.sources.insert(at, baseline.to_string());
                }
            }
        }
        selection.sources.truncate(max);
        selection.confidence = selection.confidence.clamp(0.0, 1.0);
        selection
    }
}

/// 严格解码：形状不符、置信度越界、没有任何合法可用 id 时都视为失败
fn decode_reply(raw: &str, catalog: &SourceCatalog) -> Result<SourceSelection, OrchestratorError> {
    let reply: SelectorReply =
        parse_json_reply(raw).map_err(OrchestratorError::SelectionFailure)?;

    if !reply.confidence.is_finite() || !(0.0..=1.0).contains(&reply.confidence) {
        return Err(OrchestratorError::SelectionFailure(format!(
            "confidence out of range: {}",
            reply.confidence
        )));
    }

    let mut sources = Vec::new();
    for id in &reply.selected_sources {
        let id = id.trim();
        match catalog.get(id) {
            Some(source) if source.is_available() => sources.push(id.to_string()),
            Some(_) => tracing::debug!(source = id, "LLM selected an unavailable source, dropped"),
            None => tracing::debug!(source = id, "LLM selected an unknown source, dropped"),
        }
    }
    if sources.is_empty() {
        return Err(OrchestratorError::SelectionFailure(
            "no valid source ids in reply".to_string(),
        ));
    }

    let reasoning = if reply.concept.is_empty() {
        reply.reasoning
    } else {
        format!("{}: {}", reply.concept, reply.reasoning)
    };
    Ok(SourceSelection {
        sources,
        confidence: reply.confidence,
        reasoning,
        alternative_terms: reply.alternative_terms,
        strategy: SelectionStrategy::Llm,
    })
}
