//! 名称抽取
//!
//! LLM 返回查询中字面出现的人名 / 组织名 JSON 数组（不做代词消解，不编造）。
//! 结果再做一次过滤：只保留确实出现在查询中的名称，去重并保持原顺序。
//! LLM 失败或回复无法解析时，用正则提取连续的大写开头多词片段与全大写缩写。

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::conversation::Message;
use crate::core::OrchestratorError;
use crate::llm::{complete_within, parse_json_reply, LlmClient};

pub(crate) const EXTRACTOR_PROMPT: &str = r#"You extract proper names from a user query for a CRM lookup.
Return ONLY a JSON array of strings with the person names and organization names that literally appear in the query.
Rules:
- Copy names exactly as written in the query.
- Do not resolve pronouns and do not invent or complete names.
- Ignore products, topics, document titles and generic nouns.
- If there are no names, return []."#;

#[derive(Deserialize)]
#[serde(untagged)]
enum NamesReply {
    List(Vec<String>),
    Wrapped { names: Vec<String> },
}

impl NamesReply {
    fn into_names(self) -> Vec<String> {
        match self {
            NamesReply::List(names) | NamesReply::Wrapped { names } => names,
        }
    }
}

/// 名称抽取器
pub struct NameExtractor {
    llm: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl NameExtractor {
    pub fn new(llm: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { llm, timeout }
    }

    /// 抽取名称；失败时回退到正则启发式（可能为空）
    pub async fn extract(&self, query: &str) -> Vec<String> {
        let names = match self.extract_with_llm(query).await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(kind = e.kind(), "{}, using heuristic extraction", e);
                heuristic_names(query)
            }
        };
        let names = keep_literal_names(query, names);
        tracing::info!(names = ?names, "Names extracted");
        names
    }

    async fn extract_with_llm(&self, query: &str) -> Result<Vec<String>, OrchestratorError> {
        let messages = vec![
            Message::system(EXTRACTOR_PROMPT),
            Message::user(format!("Query: {query}")),
        ];
        let raw = complete_within(self.llm.as_ref(), &messages, 0.0, self.timeout)
            .await
            .map_err(|e| OrchestratorError::ExtractionFailure(e.to_string()))?;
        parse_json_reply::<NamesReply>(&raw)
            .map(NamesReply::into_names)
            .map_err(OrchestratorError::ExtractionFailure)
    }
}

/// 只保留字面出现在查询中的名称，按小写去重
fn keep_literal_names(query: &str, names: Vec<String>) -> Vec<String> {
    let query_lower = query.to_lowercase();
    let mut seen = std::collections::HashSet::new();
    names
        .into_iter()
        .map(|n| n.trim().trim_matches(|c: char| c == '"' || c == '\'').to_string())
        .filter(|n| !n.is_empty())
        .filter(|n| {
            let present = query_lower.contains(&n.to_lowercase());
            if !present {
                tracing::debug!(name = %n, "Dropping name not present in query");
            }
            present
        })
        .filter(|n| seen.insert(n.to_lowercase()))
        .collect()
}

fn name_span_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| {
        // 连续两个及以上大写开头的单词，或独立的全大写缩写（≥2 个字母）
        Regex::new(r"\p{Lu}[\p{L}\p{N}&'.-]*(?:\s+\p{Lu}[\p{L}\p{N}&'.-]*)+|\b\p{Lu}{2,}\b").ok()
    })
    .as_ref()
}

/// 正则启发式：提取大写开头的多词片段与全大写缩写
pub fn heuristic_names(query: &str) -> Vec<String> {
    let Some(re) = name_span_regex() else {
        return Vec::new();
    };
    re.find_iter(query)
        .map(|m| m.as_str().trim_end_matches(['.', '-', '\'']).to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
