//! 确定性关键词回退
//!
//! LLM 不可用或回复无法解析时使用：按数据源关键词（权重 2）、子模块关键词（权重 1）、
//! id 中的单词（权重 1）在查询中的命中次数打分，置信度 = best / (best + 2)。
//! 命中按子串匹配（德语复合词如 "Zahlungsstatus" 也能命中 "zahlung"）。

use crate::catalog::{SourceCatalog, SourceDefinition};

const SOURCE_KEYWORD_WEIGHT: u32 = 2;
const SUBMODULE_KEYWORD_WEIGHT: u32 = 1;
const ID_WORD_WEIGHT: u32 = 1;
/// 过短的关键词子串匹配噪声太大
const MIN_KEYWORD_CHARS: usize = 3;

/// 回退打分结果
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordScore {
    pub source_id: String,
    pub score: u32,
}

fn hits(query: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    keyword.chars().count() >= MIN_KEYWORD_CHARS && query.contains(&keyword)
}

/// 单个数据源的加权命中数
pub fn score_source(query: &str, source: &SourceDefinition) -> u32 {
    let query = query.to_lowercase();
    let keyword_hits = source.keywords.iter().filter(|k| hits(&query, k)).count() as u32;
    let submodule_hits = source
        .submodules
        .iter()
        .flat_map(|s| s.keywords.iter())
        .filter(|k| hits(&query, k))
        .count() as u32;
    let id_hits = source
        .id
        .split(['-', '_'])
        .filter(|w| hits(&query, w))
        .count() as u32;

    keyword_hits * SOURCE_KEYWORD_WEIGHT
        + submodule_hits * SUBMODULE_KEYWORD_WEIGHT
        + id_hits * ID_WORD_WEIGHT
}

/// 对全部可用数据源打分，返回命中者（分数降序，其次优先级、id）与归一化置信度
pub fn rank_by_keywords(query: &str, catalog: &SourceCatalog) -> (Vec<KeywordScore>, f64) {
    let mut scored: Vec<(i32, KeywordScore)> = catalog
        .available()
        .map(|source| {
            (
                source.priority,
                KeywordScore {
                    source_id: source.id.clone(),
                    score: score_source(query, source),
                },
            )
        })
        .filter(|(_, s)| s.score > 0)
        .collect();

    scored.sort_by(|(pa, a), (pb, b)| {
        b.score
            .cmp(&a.score)
            .then(pa.cmp(pb))
            .then_with(|| a.source_id.cmp(&b.source_id))
    });

    let best = scored.first().map(|(_, s)| s.score).unwrap_or(0);
    let confidence = if best == 0 {
        0.0
    } else {
        (f64::from(best) / f64::from(best + 2)).clamp(0.0, 1.0)
    };
    (scored.into_iter().map(|(_, s)| s).collect(), confidence)
}
