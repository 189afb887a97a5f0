//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HONEYCOMB__*` 覆盖（双下划线表示嵌套，如 `HONEYCOMB__LLM__PROVIDER=openai`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub tools: ToolsSection,
}

/// [app] 段：名称、日志格式、数据源目录与领域简报路径
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: Option<String>,
    /// 以 JSON 行输出日志
    pub log_json: bool,
    pub catalog_path: PathBuf,
    /// 领域简报文本文件；未设置时简报为空
    pub briefing_path: Option<PathBuf>,
    /// 实体图快照（JSON 数组），加载进内存图存储；未设置时图为空
    pub graph_path: Option<PathBuf>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: None,
            log_json: false,
            catalog_path: PathBuf::from("config/sources.toml"),
            briefing_path: None,
            graph_path: None,
        }
    }
}

/// [llm] 段：后端选择与各类调用的超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：openai / deepseek / mock
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "deepseek".to_string(),
            model: None,
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

/// [llm.timeouts] 段（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    pub classification: u64,
    pub selection: u64,
    pub extraction: u64,
    pub synthesis: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            classification: 10,
            selection: 20,
            extraction: 15,
            synthesis: 60,
        }
    }
}

/// 各阶段 LLM 调用的超时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub classification: Duration,
    pub selection: Duration,
    pub extraction: Duration,
    pub synthesis: Duration,
    pub tool_call: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        AppConfig::default().stage_timeouts()
    }
}

/// [orchestrator] 段：选源、消歧与合成的策略参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    pub max_sources: usize,
    pub always_include_baseline: bool,
    /// 基线（知识库）数据源 id
    pub baseline_source: String,
    pub selection_confidence_threshold: f64,
    pub selection_retries: u32,
    pub entity_confidence_threshold: u32,
    pub candidates_per_name: usize,
    /// 合成时保留的历史轮数
    pub history_turns: usize,
    pub history_chars_per_message: usize,
    /// 提供给选源 LLM 的目录上下文字符上限
    pub catalog_context_chars: usize,
    pub briefing_ttl_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_sources: 3,
            always_include_baseline: true,
            baseline_source: "knowledge-base".to_string(),
            selection_confidence_threshold: 0.7,
            selection_retries: 2,
            entity_confidence_threshold: 60,
            candidates_per_name: 3,
            history_turns: 6,
            history_chars_per_message: 500,
            catalog_context_chars: 6000,
            briefing_ttl_secs: 300,
        }
    }
}

/// [tools] 段：单次工具调用超时与结果大小上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub tool_timeout_secs: u64,
    pub max_result_chars: usize,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 30,
            max_result_chars: 8000,
        }
    }
}

impl AppConfig {
    pub fn stage_timeouts(&self) -> StageTimeouts {
        let t = &self.llm.timeouts;
        StageTimeouts {
            classification: Duration::from_secs(t.classification),
            selection: Duration::from_secs(t.selection),
            extraction: Duration::from_secs(t.extraction),
            synthesis: Duration::from_secs(t.synthesis),
            tool_call: Duration::from_secs(self.tools.tool_timeout_secs),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HONEYCOMB__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HONEYCOMB__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    if let Some(name) = default_names
        .into_iter()
        .find(|name| std::path::Path::new(&format!("{name}.toml")).exists())
    {
        builder = builder.add_source(config::File::with_name(name).required(false));
    }

    if let Some(path) = config_path.filter(|p| p.exists()) {
        builder = builder.add_source(config::File::from(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HONEYCOMB")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
