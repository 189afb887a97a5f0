//! 实体匹配打分
//!
//! 对实体的每个识别字段取最高档：
//! - 完全相等（忽略大小写与标点）：100
//! - 短语包含（按单词边界，名称在字段中或字段在名称中）：50
//! - 单词命中（名称中任一 ≥3 字符的单词是某字段的子串）：25
//!
//! 总分 = 匹配分 + 类型加分；排序键 (总分 desc, 类型加分 desc, source_id asc, display_name asc)，结果与输入顺序无关。

use std::cmp::Reverse;
use std::collections::HashMap;

use super::{EntityCandidate, GraphEntity};

pub const EXACT_MATCH: u32 = 100;
pub const PHRASE_MATCH: u32 = 50;
pub const WORD_MATCH: u32 = 25;

const MIN_WORD_CHARS: usize = 3;

fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn contains_sequence(haystack: &[String], needle: &[String]) -> bool {
    !needle.is_empty()
        && needle.len() <= haystack.len()
        && haystack.windows(needle.len()).any(|w| w == needle)
}

/// 名称与实体的文本匹配分（不含类型加分）
pub fn match_score(name: &str, entity: &GraphEntity) -> u32 {
    let name_words = words(name);
    if name_words.is_empty() {
        return 0;
    }

    let mut best = 0;
    for field in entity.identifying_fields() {
        let field_words = words(&field);
        if field_words == name_words {
            return EXACT_MATCH;
        }
        if contains_sequence(&field_words, &name_words) || contains_sequence(&name_words, &field_words)
        {
            best = best.max(PHRASE_MATCH);
            continue;
        }
        let field_lower = field.to_lowercase();
        if name_words
            .iter()
            .any(|w| w.chars().count() >= MIN_WORD_CHARS && field_lower.contains(w.as_str()))
        {
            best = best.max(WORD_MATCH);
        }
    }
    best
}

/// 为一个名称打分并返回前 `limit` 个候选（同一 source_id 只保留一次）
pub fn rank_candidates(name: &str, entities: &[GraphEntity], limit: usize) -> Vec<EntityCandidate> {
    let mut by_id: HashMap<&str, EntityCandidate> = HashMap::new();
    for entity in entities {
        let score = match_score(name, entity);
        if score == 0 {
            continue;
        }
        let candidate = EntityCandidate {
            source_id: entity.source_id.clone(),
            display_name: entity.display_name(),
            entity_type: entity.kind.clone(),
            match_score: score,
            type_bonus: entity.kind.type_bonus(),
        };
        by_id
            .entry(entity.source_id.as_str())
            .and_modify(|existing| {
                if candidate.total() > existing.total() {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    }

    let mut ranked: Vec<EntityCandidate> = by_id.into_values().collect();
    ranked.sort_by(|a, b| {
        (Reverse(a.total()), Reverse(a.type_bonus), &a.source_id, &a.display_name).cmp(&(
            Reverse(b.total()),
            Reverse(b.type_bonus),
            &b.source_id,
            &b.display_name,
        ))
    });
    ranked.truncate(limit);
    ranked
}
