//! 图存储抽象
//!
//! 检索是「宽松预筛」：返回与任一名称可能相关的实体，精确打分由 scoring 完成。

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use super::{GraphEntity, GraphError};

/// 实体图存储（CRM 联系人、公司、交易、发票、日程、任务等）
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// 一次检索所有名称的候选实体
    async fn search(&self, names: &[String]) -> Result<Vec<GraphEntity>, GraphError>;
}

/// 内存图存储（测试与本地运行）
#[derive(Debug, Default)]
pub struct InMemoryGraph {
    entities: Vec<GraphEntity>,
    fail_with: Option<GraphError>,
    calls: AtomicUsize,
}

impl InMemoryGraph {
    pub fn new(entities: Vec<GraphEntity>) -> Self {
        Self {
            entities,
            ..Default::default()
        }
    }

    /// 每次检索都返回该错误
    pub fn failing(error: GraphError) -> Self {
        Self {
            fail_with: Some(error),
            ..Default::default()
        }
    }

    /// 已执行的检索次数
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn may_match(entity: &GraphEntity, words: &[String]) -> bool {
        entity
            .identifying_fields()
            .iter()
            .map(|f| f.to_lowercase())
            .any(|field| words.iter().any(|w| field.contains(w.as_str())))
    }
}

#[async_trait]
impl GraphStore for InMemoryGraph {
    async fn search(&self, names: &[String]) -> Result<Vec<GraphEntity>, GraphError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.fail_with {
            return Err(err.clone());
        }

        let words: Vec<String> = names
            .iter()
            .flat_map(|n| n.split(|c: char| !c.is_alphanumeric()))
            .filter(|w| w.chars().count() >= 3)
            .map(str::to_lowercase)
            .collect();

        Ok(self
            .entities
            .iter()
            .filter(|e| Self::may_match(e, &words))
            .cloned()
            .collect())
    }
}
