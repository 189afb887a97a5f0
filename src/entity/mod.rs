//! 实体消歧：把查询中的人名 / 公司名映射到图存储中的具体实体
//!
//! 1. 名称抽取（LLM，失败时正则启发式）
//! 2. 图检索 + 三档打分（完全相等 100 / 短语包含 50 / 单词命中 25）+ 实体类型加分
//! 3. 置信度门限：最佳总分低于阈值时标记 uncertain，由合成阶段改为追问

mod extractor;
mod graph;
mod resolver;
mod scoring;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use extractor::{heuristic_names, NameExtractor};
pub use graph::{GraphStore, InMemoryGraph};
pub use resolver::{EntityResolution, EntityResolver, NameCandidates};
pub use scoring::{match_score, rank_candidates, EXACT_MATCH, PHRASE_MATCH, WORD_MATCH};

/// 实体类型加分上限（Contact / Account）
pub const MAX_TYPE_BONUS: u32 = 8;

/// 图存储错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Graph store unavailable: {0}")]
    Unavailable(String),

    #[error("Graph query failed: {0}")]
    Query(String),
}

/// 图中实体的类型；任意实体都可能挂接活动，因此在消歧边界统一成一个标签联合体。
/// 序列化为图中的自由文本标签，反序列化经 `from_label` 归一
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    Contact,
    Account,
    Deal,
    Invoice,
    Event,
    Task,
    Other(String),
}

impl EntityKind {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "contact" | "person" | "kontakt" => EntityKind::Contact,
            "account" | "organization" | "company" | "firma" => EntityKind::Account,
            "deal" | "opportunity" => EntityKind::Deal,
            "invoice" | "rechnung" => EntityKind::Invoice,
            "event" | "meeting" | "calendarevent" => EntityKind::Event,
            "task" | "todo" => EntityKind::Task,
            _ => EntityKind::Other(label.trim().to_string()),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            EntityKind::Contact => "Contact",
            EntityKind::Account => "Account",
            EntityKind::Deal => "Deal",
            EntityKind::Invoice => "Invoice",
            EntityKind::Event => "Event",
            EntityKind::Task => "Task",
            EntityKind::Other(label) => label,
        }
    }

    /// 同等文本匹配下，更核心的实体类型优先。
    /// 加分只在同一档内排序：短语档 + 最大加分仍低于默认门限，不能把候选抬过门限
    pub fn type_bonus(&self) -> u32 {
        match self {
            EntityKind::Contact | EntityKind::Account => MAX_TYPE_BONUS,
            EntityKind::Deal | EntityKind::Invoice => 4,
            EntityKind::Other(_) => 2,
            EntityKind::Event | EntityKind::Task => 0,
        }
    }
}

impl From<String> for EntityKind {
    fn from(label: String) -> Self {
        EntityKind::from_label(&label)
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.label().to_string()
    }
}

/// 图存储返回的原始实体（带全部可用于识别的字段）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEntity {
    /// 外部系统 id（如 CRM 记录 id）
    pub source_id: String,
    #[serde(alias = "entity_type", alias = "type")]
    pub kind: EntityKind,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

impl GraphEntity {
    pub fn new(source_id: impl Into<String>, kind: EntityKind, name: impl Into<String>) -> Self {
        Self {
            source_id: source_id.into(),
            kind,
            name: Some(name.into()),
            organization: None,
            first_name: None,
            last_name: None,
        }
    }

    pub fn person(
        source_id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            kind: EntityKind::Contact,
            name: None,
            organization: None,
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
        }
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    fn full_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(" "))
    }

    /// 参与匹配的字段：规范名、组织名、名 + 姓
    pub fn identifying_fields(&self) -> Vec<String> {
        [self.name.clone(), self.organization.clone(), self.full_name()]
            .into_iter()
            .flatten()
            .filter(|f| !f.trim().is_empty())
            .collect()
    }

    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| self.full_name())
            .or_else(|| self.organization.clone())
            .unwrap_or_else(|| self.source_id.clone())
    }
}

/// 某个抽取名称的一个候选绑定（仅在本轮内存在）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityCandidate {
    pub source_id: String,
    pub display_name: String,
    pub entity_type: EntityKind,
    pub match_score: u32,
    pub type_bonus: u32,
}

impl EntityCandidate {
    pub fn total(&self) -> u32 {
        self.match_score + self.type_bonus
    }
}
