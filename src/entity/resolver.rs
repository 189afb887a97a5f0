//! 实体消歧流程：抽取名称 -> 图检索 -> 打分 -> 置信度门限

use std::sync::Arc;

use serde::Serialize;

use super::{rank_candidates, EntityCandidate, GraphStore, NameExtractor};

/// 一个抽取名称及其前 N 个候选
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NameCandidates {
    pub name: String,
    pub candidates: Vec<EntityCandidate>,
    /// 至少两个不同实体并列最高总分
    pub tied: bool,
}

impl NameCandidates {
    pub fn best(&self) -> Option<&EntityCandidate> {
        self.candidates.first()
    }

    /// 通过门限且没有并列的最佳候选
    fn decisive(&self, threshold: u32) -> Option<&EntityCandidate> {
        self.best().filter(|c| !self.tied && c.total() >= threshold)
    }
}

/// 本轮的消歧结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntityResolution {
    pub names: Vec<String>,
    pub candidates: Vec<NameCandidates>,
    /// 通过门限的绑定（按查询中名称出现顺序取第一个）
    pub binding: Option<EntityCandidate>,
    /// 任一名称的最佳总分低于门限，或最高分并列
    pub uncertain: bool,
}

impl EntityResolution {
    pub fn entity_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|c| c.source_id.as_str())
    }
}

/// 实体消歧器
pub struct EntityResolver {
    extractor: NameExtractor,
    graph: Arc<dyn GraphStore>,
    threshold: u32,
    per_name: usize,
}

impl EntityResolver {
    pub fn new(
        extractor: NameExtractor,
        graph: Arc<dyn GraphStore>,
        threshold: u32,
        per_name: usize,
    ) -> Self {
        Self {
            extractor,
            graph,
            threshold,
            per_name: per_name.max(1),
        }
    }

    /// 抽取并消歧查询中的名称；没有名称时不访问图存储
    pub async fn resolve(&self, query: &str) -> EntityResolution {
        let names = self.extractor.extract(query).await;
        if names.is_empty() {
            tracing::debug!("No names in query, skipping graph search");
            return EntityResolution::default();
        }

        let entities = match self.graph.search(&names).await {
            Ok(entities) => entities,
            Err(e) => {
                // 图存储不可用：不绑定、不追问，需要实体的数据源会被跳过
                tracing::warn!("Graph search failed: {}", e);
                return EntityResolution {
                    names,
                    ..Default::default()
                };
            }
        };

        let candidates: Vec<NameCandidates> = names
            .iter()
            .map(|name| {
                // 多取一个用于并列检测
                let mut ranked = rank_candidates(name, &entities, self.per_name + 1);
                let tied = ranked.len() > 1 && ranked[0].total() == ranked[1].total();
                ranked.truncate(self.per_name);
                NameCandidates {
                    name: name.clone(),
                    candidates: ranked,
                    tied,
                }
            })
            .collect();

        for nc in &candidates {
            if nc.candidates.is_empty() {
                tracing::info!(name = %nc.name, "No entity candidates");
            }
            if nc.tied {
                tracing::info!(name = %nc.name, "Top entity candidates are tied");
            }
            for (rank, c) in nc.candidates.iter().enumerate() {
                tracing::info!(
                    name = %nc.name,
                    rank = rank + 1,
                    source_id = %c.source_id,
                    display_name = %c.display_name,
                    entity_type = c.entity_type.label(),
                    match_score = c.match_score,
                    type_bonus = c.type_bonus,
                    total = c.total(),
                    "Entity candidate"
                );
            }
        }

        let uncertain = candidates
            .iter()
            .any(|nc| nc.decisive(self.threshold).is_none());
        let binding = candidates
            .iter()
            .find_map(|nc| nc.decisive(self.threshold))
            .cloned();

        match &binding {
            Some(c) => tracing::info!(source_id = %c.source_id, uncertain, "Entity bound"),
            None => tracing::info!(uncertain, "No entity bound"),
        }

        EntityResolution {
            names,
            candidates,
            binding,
            uncertain,
        }
    }
}
