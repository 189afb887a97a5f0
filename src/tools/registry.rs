//! 工具注册表
//!
//! 每个数据源的 tool_name 对应一个实现 Tool trait 的检索函数（知识库检索、CRM 查询、SQL 执行等），
//! 由 ToolRegistry 按名注册与查找；ToolExecutor 在调用时加超时并统一转 ToolOutcome。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// 工具 trait：名称、描述、异步执行（args 为 JSON，见 [`ToolArgs`]）
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    async fn execute(&self, args: Value) -> Result<String, String>;
}

/// 传给工具的参数：自由文本查询 + 可选实体 id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolArgs {
    pub source_id: String,
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl ToolArgs {
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "source_id": self.source_id,
            "query": self.query,
            "entity_id": self.entity_id,
        })
    }
}

/// 工具注册表：按名称存储 Arc<dyn Tool>；同名重复注册时后者覆盖前者
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Tool registered twice, keeping the latest");
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<String, String> {
        let tool = self.tools.get(name).ok_or_else(|| format!("Unknown tool: {name}"))?;
        tool.execute(args).await
    }

    pub fn tool_names(&self) -> HashSet<String> {
        self.tools.keys().cloned().collect()
    }
}
