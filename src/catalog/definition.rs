//! 数据源定义（sources.toml 中的一个 `[[source]]`）

use serde::{Deserialize, Serialize};

/// 数据源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceKind {
    /// 文档 / 知识库语义检索
    SemanticSearch,
    /// CRM 实时数据
    Crm,
    /// 结构化 SQL 数据源
    Sql,
}

impl SourceKind {
    pub fn label(&self) -> &'static str {
        match self {
            SourceKind::SemanticSearch => "semantic-search",
            SourceKind::Crm => "crm",
            SourceKind::Sql => "sql",
        }
    }
}

/// 细分关键词组（如 CRM 下的 invoices / deals）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submodule {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// 一个可查询的数据源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDefinition {
    pub id: String,
    pub kind: SourceKind,
    /// 提供给 LLM 的自由文本描述
    pub description: String,
    /// 执行时调用的工具名（必须已注册）
    pub tool_name: String,
    /// 越小越优先
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub requires_entity_id: bool,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub submodules: Vec<Submodule>,
    /// 能力标签（如 "live-data"、"documents"）
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// 远程工具端点；设置时自动注册 HTTP 工具
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 全部环境变量存在且非空时数据源才可用（如 CRM 凭据）
    #[serde(default)]
    pub requires_env: Vec<String>,
}

fn default_enabled() -> bool {
    true
}

impl SourceDefinition {
    pub fn new(
        id: impl Into<String>,
        kind: SourceKind,
        tool_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            description: description.into(),
            tool_name: tool_name.into(),
            priority: 0,
            requires_entity_id: false,
            keywords: Vec::new(),
            submodules: Vec::new(),
            capabilities: Vec::new(),
            endpoint: None,
            enabled: true,
            requires_env: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn requiring_entity(mut self) -> Self {
        self.requires_entity_id = true;
        self
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_submodule(mut self, name: &str, keywords: &[&str]) -> Self {
        self.submodules.push(Submodule {
            name: name.to_string(),
            description: String::new(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        });
        self
    }

    pub fn with_capabilities(mut self, tags: &[&str]) -> Self {
        self.capabilities = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_requires_env(mut self, vars: &[&str]) -> Self {
        self.requires_env = vars.iter().map(|v| v.to_string()).collect();
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// 可用性：启用且所需环境变量均已设置
    pub fn is_available(&self) -> bool {
        self.enabled
            && self
                .requires_env
                .iter()
                .all(|var| std::env::var(var).is_ok_and(|v| !v.trim().is_empty()))
    }

    /// 供 LLM 阅读的多行摘要
    pub fn summary(&self) -> String {
        let mut out = format!(
            "- id: {} ({}, priority {}{})\n  description: {}\n",
            self.id,
            self.kind.label(),
            self.priority,
            if self.requires_entity_id {
                ", needs a concrete entity"
            } else {
                ""
            },
            self.description.trim()
        );
        if !self.keywords.is_empty() {
            out.push_str(&format!("  keywords: {}\n", self.keywords.join(", ")));
        }
        for sub in &self.submodules {
            out.push_str(&format!("  submodule {}: {}", sub.name, sub.keywords.join(", ")));
            if !sub.description.is_empty() {
                out.push_str(&format!(" ({})", sub.description));
            }
            out.push('\n');
        }
        if !self.capabilities.is_empty() {
            out.push_str(&format!("  capabilities: {}\n", self.capabilities.join(", ")));
        }
        out
    }
}
