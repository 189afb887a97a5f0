//! 编排器构建器：统一的初始化逻辑
//!
//! 进程启动时执行一次：选择 LLM 后端、注册工具（目录中声明了 endpoint 的数据源自动注册 HttpTool）、
//! 校验目录、装配各阶段组件。目录校验失败会让启动失败，而不是在查询时才暴露。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::briefing::{DomainBriefing, FileBriefing};
use crate::catalog::{load_catalog, CatalogError, SourceCatalog, SourceDefinition};
use crate::config::AppConfig;
use crate::core::Orchestrator;
use crate::entity::{EntityResolver, GraphEntity, GraphStore, InMemoryGraph, NameExtractor};
use crate::intent::IntentClassifier;
use crate::llm::{create_deepseek_client, LlmClient, MockLlmClient, OpenAiClient};
use crate::selector::{SelectorSettings, SourceSelector};
use crate::synthesizer::{AnswerSynthesizer, SynthesizerSettings};
use crate::tools::{HttpTool, Tool, ToolExecutor, ToolRegistry};

/// 根据配置与环境变量选择 LLM 后端（DeepSeek / OpenAI 兼容 / Mock）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_key = |var: &str| std::env::var(var).is_ok_and(|v| !v.trim().is_empty());

    match provider.as_str() {
        "mock" => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
        "deepseek" if has_key("DEEPSEEK_API_KEY") || has_key("OPENAI_API_KEY") => {
            let client = create_deepseek_client(cfg.llm.model.as_deref());
            tracing::info!("Using DeepSeek LLM ({})", client.model());
            Arc::new(client)
        }
        "openai" if has_key("OPENAI_API_KEY") => {
            let model = cfg.llm.model.as_deref().unwrap_or("gpt-4o-mini");
            tracing::info!("Using OpenAI LLM ({})", model);
            Arc::new(OpenAiClient::new(cfg.llm.base_url.as_deref(), model, None))
        }
        _ => {
            tracing::warn!(provider = %provider, "No API key set or provider unknown, using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 编排器构建器
pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    sources: Vec<SourceDefinition>,
    registry: ToolRegistry,
    graph: Option<Arc<dyn GraphStore>>,
    briefing: Option<Arc<DomainBriefing>>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            sources: Vec::new(),
            registry: ToolRegistry::new(),
            graph: None,
            briefing: None,
        }
    }

    /// 按配置装配：加载目录、选择 LLM、加载简报与图快照
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let sources = load_catalog(&config.app.catalog_path)
            .with_context(|| format!("loading catalog {}", config.app.catalog_path.display()))?;
        let llm = create_llm_from_config(&config);

        let ttl = Duration::from_secs(config.orchestrator.briefing_ttl_secs);
        let briefing = match &config.app.briefing_path {
            Some(path) => DomainBriefing::new(Arc::new(FileBriefing::new(path)), ttl),
            None => DomainBriefing::none(),
        };

        let entities: Vec<GraphEntity> = match &config.app.graph_path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading graph snapshot {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing graph snapshot {}", path.display()))?
            }
            None => {
                tracing::warn!("No graph snapshot configured, entity resolution will find nothing");
                Vec::new()
            }
        };
        tracing::info!("Graph store holds {} entities", entities.len());

        Ok(Self::new(config)
            .with_llm(llm)
            .with_sources(sources)
            .with_briefing(Arc::new(briefing))
            .with_graph(Arc::new(InMemoryGraph::new(entities))))
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_sources(mut self, sources: Vec<SourceDefinition>) -> Self {
        self.sources.extend(sources);
        self
    }

    pub fn with_source(mut self, source: SourceDefinition) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.registry.register(tool);
        self
    }

    pub fn with_tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.registry.register_arc(tool);
        self
    }

    pub fn with_graph(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_briefing(mut self, briefing: Arc<DomainBriefing>) -> Self {
        self.briefing = Some(briefing);
        self
    }

    /// 为声明了 endpoint 的数据源注册 HttpTool；同名工具已显式注册时保留显式注册的
    fn register_endpoint_tools(&mut self) -> Result<(), CatalogError> {
        let mut endpoints: HashMap<&str, &str> = HashMap::new();
        for source in &self.sources {
            let Some(endpoint) = source.endpoint.as_deref() else {
                continue;
            };
            match endpoints.get(source.tool_name.as_str()) {
                Some(existing) if *existing != endpoint => {
                    return Err(CatalogError::ConflictingEndpoint {
                        tool: source.tool_name.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    endpoints.insert(source.tool_name.as_str(), endpoint);
                }
            }
        }

        let timeout = Duration::from_secs(self.config.tools.tool_timeout_secs);
        for (tool, endpoint) in endpoints {
            if self.registry.contains(tool) {
                tracing::info!(tool, "Tool registered explicitly, ignoring catalog endpoint");
                continue;
            }
            tracing::info!(tool, endpoint, "Registering HTTP tool");
            self.registry.register(HttpTool::new(tool, endpoint, timeout));
        }
        Ok(())
    }

    /// 校验目录并装配编排器
    pub fn build(mut self) -> Result<Orchestrator, CatalogError> {
        self.register_endpoint_tools()?;

        let orch = &self.config.orchestrator;
        let catalog = SourceCatalog::new(
            std::mem::take(&mut self.sources),
            orch.baseline_source.clone(),
            &self.registry.tool_names(),
        )?;
        tracing::info!(
            sources = catalog.len(),
            available = catalog.available().count(),
            "Catalog ready"
        );

        let llm = self.llm.unwrap_or_else(|| create_llm_from_config(&self.config));
        let timeouts = self.config.stage_timeouts();
        let graph = self
            .graph
            .unwrap_or_else(|| Arc::new(InMemoryGraph::new(Vec::new())));
        let briefing = self.briefing.unwrap_or_default();

        let selector = SourceSelector::new(
            llm.clone(),
            SelectorSettings {
                max_sources: orch.max_sources,
                always_include_baseline: orch.always_include_baseline,
                confidence_threshold: orch.selection_confidence_threshold,
                retries: orch.selection_retries,
                catalog_context_chars: orch.catalog_context_chars,
                timeout: timeouts.selection,
            },
        );
        let resolver = EntityResolver::new(
            NameExtractor::new(llm.clone(), timeouts.extraction),
            graph,
            orch.entity_confidence_threshold,
            orch.candidates_per_name,
        );
        let synthesizer = AnswerSynthesizer::new(
            llm.clone(),
            briefing,
            SynthesizerSettings {
                history_turns: orch.history_turns,
                history_chars_per_message: orch.history_chars_per_message,
                timeout: timeouts.synthesis,
            },
        );
        let executor = ToolExecutor::new(self.registry, timeouts.tool_call)
            .with_max_result_chars(self.config.tools.max_result_chars);

        Ok(Orchestrator {
            catalog,
            classifier: IntentClassifier::new(llm, timeouts.classification),
            selector,
            resolver,
            executor,
            synthesizer,
        })
    }
}
