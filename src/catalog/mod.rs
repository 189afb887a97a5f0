//! 数据源目录
//!
//! 进程启动时加载一次、校验后只读（`Arc<[SourceDefinition]>`，并发读无需加锁）。
//! 校验：id 非空且唯一、tool_name 必须对应已注册工具、非空目录必须包含基线数据源。
//!
//! ```text
//! config/sources.toml
//! [[source]]
//! id = "knowledge-base"
//! kind = "semantic-search"
//! tool_name = "knowledge_search"
//! ...
//! ```

mod definition;
mod loader;

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;

pub use definition::{SourceDefinition, SourceKind, Submodule};
pub use loader::{load_catalog, parse_catalog};

/// 目录加载与校验错误（只在启动时出现，不会在查询时出现）
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Source with empty id")]
    EmptyId,

    #[error("Duplicate source id: {0}")]
    DuplicateSource(String),

    #[error("Source {source_id} references unknown tool {tool}")]
    UnknownTool { source_id: String, tool: String },

    #[error("Tool {tool} is declared with conflicting endpoints")]
    ConflictingEndpoint { tool: String },

    #[error("Baseline source {0} is missing from the catalog")]
    MissingBaseline(String),
}

/// 校验后的只读目录
#[derive(Debug, Clone)]
pub struct SourceCatalog {
    sources: Arc<[SourceDefinition]>,
    baseline: String,
}

impl SourceCatalog {
    /// 校验并构建目录；`known_tools` 为已注册工具名
    pub fn new(
        mut sources: Vec<SourceDefinition>,
        baseline: impl Into<String>,
        known_tools: &HashSet<String>,
    ) -> Result<Self, CatalogError> {
        let baseline = baseline.into();
        let mut seen = HashSet::new();
        for source in &sources {
            if source.id.trim().is_empty() {
                return Err(CatalogError::EmptyId);
            }
            if !seen.insert(source.id.as_str()) {
                return Err(CatalogError::DuplicateSource(source.id.clone()));
            }
            if !known_tools.contains(&source.tool_name) {
                return Err(CatalogError::UnknownTool {
                    source_id: source.id.clone(),
                    tool: source.tool_name.clone(),
                });
            }
        }
        if !sources.is_empty() && !seen.contains(baseline.as_str()) {
            return Err(CatalogError::MissingBaseline(baseline));
        }

        // 稳定排序：同优先级保持声明顺序
        sources.sort_by_key(|s| s.priority);
        Ok(Self {
            sources: sources.into(),
            baseline,
        })
    }

    pub fn empty(baseline: impl Into<String>) -> Self {
        Self {
            sources: Arc::from(Vec::new()),
            baseline: baseline.into(),
        }
    }

    /// 按优先级排序的全部数据源
    pub fn sources(&self) -> &[SourceDefinition] {
        &self.sources
    }

    pub fn available(&self) -> impl Iterator<Item = &SourceDefinition> {
        self.sources.iter().filter(|s| s.is_available())
    }

    pub fn get(&self, id: &str) -> Option<&SourceDefinition> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn baseline_id(&self) -> &str {
        &self.baseline
    }

    pub fn baseline(&self) -> Option<&SourceDefinition> {
        self.get(&self.baseline)
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// 生成给选源 LLM 的目录上下文，仅含可用数据源，总长度不超过 `max_chars`；
    /// 第一条即使超长也会截断后保留，保证 LLM 至少看到一个数据源
    pub fn prompt_context(&self, max_chars: usize) -> String {
        let mut out = String::new();
        let available: Vec<&SourceDefinition> = self.available().collect();
        for (i, source) in available.iter().enumerate() {
            let entry = source.summary();
            if i == 0 && entry.len() > max_chars {
                let cut: String = entry.chars().take(max_chars).collect();
                out.push_str(cut.trim_end());
                out.push_str(" ...\n");
                continue;
            }
            if out.len() + entry.len() > max_chars {
                out.push_str(&format!(
                    "... ({} more sources omitted)\n",
                    available.len() - i
                ));
                break;
            }
            out.push_str(&entry);
        }
        out
    }
}
