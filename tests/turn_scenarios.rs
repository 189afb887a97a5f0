//! 单轮编排端到端场景

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use honeycomb::catalog::{SourceDefinition, SourceKind};
use honeycomb::config::AppConfig;
use honeycomb::conversation::Message;
use honeycomb::entity::{EntityKind, GraphEntity, InMemoryGraph};
use honeycomb::llm::{LlmClient, LlmError, MockLlmClient, MockReply, TokenStream};
use honeycomb::tools::{StaticTool, Tool, ToolStatus, SKIP_ENTITY_UNRESOLVED};
use honeycomb::{
    OrchestrationResult, Orchestrator, OrchestratorBuilder, OrchestratorError, TurnPhase,
};
use tokio_util::sync::CancellationToken;

const CLASSIFY: &str = "intent classifier";
const SELECT: &str = "data source selector";
const EXTRACT: &str = "You extract proper names";
const ANSWER: &str = "information sections";
const CLARIFY: &str = "clarifying question";
const SMALL_TALK: &str = "Reply briefly";

/// 包装 Mock，记录每次调用的消息
struct RecordingLlm {
    inner: MockLlmClient,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl RecordingLlm {
    fn new(inner: MockLlmClient) -> Self {
        Self {
            inner,
            seen: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self, marker: &str) -> usize {
        self.inner.calls(marker)
    }

    /// 含 marker 的最后一次调用的全部消息文本
    fn last_prompt(&self, marker: &str) -> String {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|msgs| msgs.iter().any(|m| m.content.contains(marker)))
            .map(|msgs| {
                msgs.iter()
                    .map(|m| m.content.clone())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for RecordingLlm {
    async fn complete(&self, messages: &[Message], temperature: f32) -> Result<String, LlmError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.inner.complete(messages, temperature).await
    }

    async fn complete_stream(
        &self,
        messages: &[Message],
        temperature: f32,
    ) -> Result<TokenStream, LlmError> {
        self.seen.lock().unwrap().push(messages.to_vec());
        self.inner.complete_stream(messages, temperature).await
    }
}

struct Fixture {
    orchestrator: Orchestrator,
    llm: Arc<RecordingLlm>,
    graph: Arc<InMemoryGraph>,
    kb: Arc<StaticTool>,
    crm: Arc<StaticTool>,
}

fn knowledge_base() -> SourceDefinition {
    SourceDefinition::new(
        "knowledge-base",
        SourceKind::SemanticSearch,
        "knowledge_search",
        "Internal documents: pricing policy, handbooks, processes",
    )
    .with_keywords(["richtlinie", "preis", "handbuch"])
}

fn invoicing_crm() -> SourceDefinition {
    SourceDefinition::new(
        "invoicing-crm",
        SourceKind::Crm,
        "crm_invoices",
        "Live invoices and payment status per customer",
    )
    .with_priority(1)
    .requiring_entity()
    .with_keywords(["rechnung", "zahlung"])
    .with_submodule("dunning", &["mahnung", "status"])
}

fn fixture(
    llm: MockLlmClient,
    sources: Vec<SourceDefinition>,
    entities: Vec<GraphEntity>,
    extra_tools: Vec<Arc<dyn Tool>>,
    cfg: AppConfig,
) -> Fixture {
    let llm = Arc::new(RecordingLlm::new(llm));
    let graph = Arc::new(InMemoryGraph::new(entities));
    let kb = Arc::new(StaticTool::new(
        "knowledge_search",
        "Preispolitik: Listenpreise gelten, Rabatte ab 10 Lizenzen.",
    ));
    let crm = Arc::new(StaticTool::new(
        "crm_invoices",
        "Rechnung 4711 an ACME: bezahlt am 2024-03-01.",
    ));

    let mut builder = OrchestratorBuilder::new(cfg)
        .with_llm(llm.clone())
        .with_graph(graph.clone())
        .with_sources(sources)
        .with_tool_arc(kb.clone())
        .with_tool_arc(crm.clone());
    for tool in extra_tools {
        builder = builder.with_tool_arc(tool);
    }

    Fixture {
        orchestrator: builder.build().unwrap(),
        llm,
        graph,
        kb,
        crm,
    }
}

fn selection(ids: &[&str], confidence: f64) -> String {
    serde_json::json!({
        "concept": "test",
        "reasoning": "test",
        "selected_sources": ids,
        "confidence": confidence,
        "alternative_terms": []
    })
    .to_string()
}

#[tokio::test]
async fn small_talk_skips_retrieval() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "small_talk")
        .reply(SMALL_TALK, "Hallo! Wie kann ich helfen?");
    let f = fixture(llm, vec![knowledge_base()], vec![], vec![], AppConfig::default());

    let report = f.orchestrator.handle_turn_report("Hallo", &[]).await.unwrap();

    assert_eq!(
        report.phases,
        vec![
            TurnPhase::Start,
            TurnPhase::Classified,
            TurnPhase::SmallTalk,
            TurnPhase::Synthesized
        ]
    );
    assert!(report.outcomes.is_empty());
    assert_eq!(f.llm.calls(SELECT), 0);
    assert!(f.kb.received().is_empty());
    assert_eq!(
        report.result,
        Some(OrchestrationResult::Answer {
            text: "Hallo! Wie kann ich helfen?".into(),
            sources_used: vec![]
        })
    );
}

#[tokio::test]
async fn knowledge_question_needs_no_entity() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["knowledge-base"], 0.9))
        .reply(ANSWER, "Es gelten Listenpreise, Rabatte ab 10 Lizenzen.");
    let f = fixture(llm, vec![knowledge_base()], vec![], vec![], AppConfig::default());

    let report = f
        .orchestrator
        .handle_turn_report("Was ist unsere Preispolitik?", &[])
        .await
        .unwrap();

    assert_eq!(report.selection.as_ref().unwrap().sources, vec!["knowledge-base"]);
    assert!(!report.visited(TurnPhase::EntitiesResolved));
    assert!(report.resolution.is_none());
    assert_eq!(f.llm.calls(EXTRACT), 0);
    assert_eq!(f.graph.calls(), 0);
    assert_eq!(f.kb.received().len(), 1);
    assert!(f.llm.last_prompt(ANSWER).contains("Rabatte ab 10 Lizenzen"));
    assert_eq!(
        report.result,
        Some(OrchestrationResult::Answer {
            text: "Es gelten Listenpreise, Rabatte ab 10 Lizenzen.".into(),
            sources_used: vec!["knowledge-base".into()]
        })
    );
}

#[tokio::test]
async fn customer_invoice_status_binds_account() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["invoicing-crm"], 0.85))
        .reply(EXTRACT, r#"["ACME"]"#)
        .reply(ANSWER, "Die Rechnung 4711 von ACME ist bezahlt.");
    let entities = vec![
        GraphEntity::new("acc-1", EntityKind::Account, "ACME"),
        GraphEntity::new("evt-7", EntityKind::Event, "ACME Quartalsgespräch"),
    ];
    let f = fixture(
        llm,
        vec![knowledge_base(), invoicing_crm()],
        entities,
        vec![],
        AppConfig::default(),
    );

    let report = f
        .orchestrator
        .handle_turn_report("Zahlungsstatus von Kunde ACME", &[])
        .await
        .unwrap();

    let sources = &report.selection.as_ref().unwrap().sources;
    assert!(sources.contains(&"invoicing-crm".to_string()));
    assert!(sources.contains(&"knowledge-base".to_string()));

    let resolution = report.resolution.as_ref().unwrap();
    assert_eq!(resolution.names, vec!["ACME"]);
    let best = resolution.binding.as_ref().unwrap();
    assert_eq!(best.source_id, "acc-1");
    assert_eq!(best.match_score, 100);
    assert!(!report.entity_uncertain);
    assert_eq!(f.graph.calls(), 1);

    let crm_calls = f.crm.received();
    assert_eq!(crm_calls.len(), 1);
    assert_eq!(crm_calls[0]["entity_id"], "acc-1");
    assert_eq!(f.kb.received()[0]["entity_id"], serde_json::Value::Null);

    assert!(f.llm.last_prompt(ANSWER).contains("bezahlt am 2024-03-01"));
    match report.result.unwrap() {
        OrchestrationResult::Answer { text, sources_used } => {
            assert!(text.contains("bezahlt"));
            assert_eq!(sources_used, vec!["invoicing-crm", "knowledge-base"]);
        }
        other => panic!("expected answer, got {other:?}"),
    }
}

#[tokio::test]
async fn ambiguous_first_name_asks_for_clarification() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["invoicing-crm"], 0.8))
        .reply(EXTRACT, r#"["Wolfgang"]"#)
        .reply(ANSWER, "Wolfgang hat alles bezahlt.")
        .reply(CLARIFY, "Meinen Sie eine Person oder eine Firma? Bitte nennen Sie den vollständigen Namen.");
    let entities = vec![
        GraphEntity::new("e1", EntityKind::Event, "Wolfgangsee Ausflug"),
        GraphEntity::new("a1", EntityKind::Account, "Wolfgangs Bau"),
        GraphEntity::new("a2", EntityKind::Account, "Hotel Wolfgangshof"),
        GraphEntity::new("t1", EntityKind::Task, "Wolfgangstraße prüfen"),
        GraphEntity::new("d1", EntityKind::Deal, "Wolfganger Dach"),
    ];
    let f = fixture(
        llm,
        vec![knowledge_base(), invoicing_crm()],
        entities,
        vec![],
        AppConfig::default(),
    );

    let report = f
        .orchestrator
        .handle_turn_report("Status von Wolfgang", &[])
        .await
        .unwrap();

    assert!(report.entity_uncertain);
    let resolution = report.resolution.as_ref().unwrap();
    assert_eq!(resolution.candidates[0].candidates.len(), 3);
    assert_eq!(resolution.candidates[0].candidates[0].match_score, 25);
    assert!(resolution.binding.is_none());

    assert!(f.crm.received().is_empty());
    assert_eq!(
        report.outcomes["invoicing-crm"].status,
        ToolStatus::Skipped {
            reason: SKIP_ENTITY_UNRESOLVED.into()
        }
    );
    assert_eq!(f.llm.calls(ANSWER), 0);
    match report.result.unwrap() {
        OrchestrationResult::Clarification { text } => assert!(text.contains("vollständigen Namen")),
        other => panic!("expected clarification, got {other:?}"),
    }
}

#[tokio::test]
async fn first_name_shared_by_contacts_asks_for_clarification() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["invoicing-crm"], 0.8))
        .reply(EXTRACT, r#"["Wolfgang"]"#)
        .reply(ANSWER, "Wolfgang hat alles bezahlt.")
        .reply(CLARIFY, "Welchen Wolfgang meinen Sie? Bitte nennen Sie den vollständigen Namen.");
    let entities = ["Müller", "Schmidt", "Kurz", "Bauer", "Wagner"]
        .iter()
        .enumerate()
        .map(|(i, last)| GraphEntity::person(format!("c{i}"), "Wolfgang", *last))
        .collect();
    let f = fixture(
        llm,
        vec![knowledge_base(), invoicing_crm()],
        entities,
        vec![],
        AppConfig::default(),
    );

    let report = f
        .orchestrator
        .handle_turn_report("Status von Wolfgang", &[])
        .await
        .unwrap();

    assert!(report.entity_uncertain);
    assert!(report.resolution.as_ref().unwrap().binding.is_none());
    assert!(f.crm.received().is_empty());
    assert_eq!(f.llm.calls(ANSWER), 0);
    assert!(report.result.unwrap().is_clarification());
}

#[tokio::test]
async fn sql_timeout_leaves_knowledge_answer() {
    let sql_source = SourceDefinition::new(
        "sql-warehouse",
        SourceKind::Sql,
        "sql_query",
        "Aggregated revenue figures",
    )
    .with_keywords(["umsatz"]);
    let sql_tool: Arc<dyn Tool> =
        Arc::new(StaticTool::new("sql_query", "never").with_delay(Duration::from_secs(30)));
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["sql-warehouse", "knowledge-base"], 0.9))
        .reply(ANSWER, "Laut Handbuch gelten Listenpreise.");
    let mut cfg = AppConfig::default();
    cfg.tools.tool_timeout_secs = 1;
    let f = fixture(llm, vec![knowledge_base(), sql_source], vec![], vec![sql_tool], cfg);

    let report = f
        .orchestrator
        .handle_turn_report("Umsatz und Preispolitik?", &[])
        .await
        .unwrap();

    assert!(matches!(
        report.outcomes["sql-warehouse"].status,
        ToolStatus::Error { .. }
    ));
    assert!(report.outcomes["knowledge-base"].is_ok());
    let prompt = f.llm.last_prompt(ANSWER);
    assert!(prompt.contains("### knowledge-base"));
    assert!(!prompt.contains("### sql-warehouse"));
    assert_eq!(
        report.result,
        Some(OrchestrationResult::Answer {
            text: "Laut Handbuch gelten Listenpreise.".into(),
            sources_used: vec!["knowledge-base".into()]
        })
    );
}

#[tokio::test]
async fn two_of_three_failures_do_not_fail_the_turn() {
    let failing: Vec<Arc<dyn Tool>> = vec![
        Arc::new(StaticTool::failing("sql_query", "connection refused")),
        Arc::new(StaticTool::failing("erp_lookup", "HTTP 503")),
    ];
    let sources = vec![
        knowledge_base(),
        SourceDefinition::new("sql-warehouse", SourceKind::Sql, "sql_query", "Revenue"),
        SourceDefinition::new("erp", SourceKind::Crm, "erp_lookup", "Orders"),
    ];
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["sql-warehouse", "erp", "knowledge-base"], 0.9))
        .reply(ANSWER, "Listenpreise gelten.");
    let f = fixture(llm, sources, vec![], failing, AppConfig::default());

    let result = f
        .orchestrator
        .handle_turn("Wie sind Preise und Umsätze?", &[])
        .await
        .unwrap();

    assert_eq!(
        result,
        OrchestrationResult::Answer {
            text: "Listenpreise gelten.".into(),
            sources_used: vec!["knowledge-base".into()]
        }
    );
}

#[tokio::test]
async fn all_sources_failing_is_framed_as_no_information() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["knowledge-base"], 0.9))
        .reply(ANSWER, "Dazu liegen keine Informationen vor.");
    let failing_kb: Arc<dyn Tool> = Arc::new(StaticTool::failing("kb_down", "index offline"));
    let kb = SourceDefinition::new("knowledge-base", SourceKind::SemanticSearch, "kb_down", "Docs");
    let f = fixture(llm, vec![kb], vec![], vec![failing_kb], AppConfig::default());

    let result = f.orchestrator.handle_turn("Was ist X?", &[]).await.unwrap();

    assert!(f.llm.last_prompt(ANSWER).contains("No information is available"));
    assert!(!result.is_clarification());
}

#[tokio::test]
async fn no_names_means_no_graph_call_even_for_entity_sources() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["invoicing-crm"], 0.9))
        .reply(EXTRACT, "[]")
        .reply(ANSWER, "Offene Rechnungen lassen sich nur pro Kunde abfragen.");
    let f = fixture(
        llm,
        vec![knowledge_base(), invoicing_crm()],
        vec![GraphEntity::new("acc-1", EntityKind::Account, "ACME")],
        vec![],
        AppConfig::default(),
    );

    let report = f
        .orchestrator
        .handle_turn_report("wie viele offene rechnungen gibt es?", &[])
        .await
        .unwrap();

    assert_eq!(f.graph.calls(), 0);
    assert!(report.resolution.as_ref().unwrap().names.is_empty());
    assert!(!report.entity_uncertain);
    assert!(matches!(
        report.outcomes["invoicing-crm"].status,
        ToolStatus::Skipped { .. }
    ));
    assert!(!report.result.unwrap().is_clarification());
}

#[tokio::test]
async fn unavailable_sources_are_never_selected() {
    let disabled = SourceDefinition::new("legacy-crm", SourceKind::Crm, "crm_invoices", "Old CRM")
        .with_keywords(["rechnung"])
        .disabled();
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["legacy-crm", "knowledge-base"], 0.95))
        .reply(ANSWER, "ok");
    let f = fixture(
        llm,
        vec![knowledge_base(), disabled],
        vec![],
        vec![],
        AppConfig::default(),
    );

    let report = f
        .orchestrator
        .handle_turn_report("Rechnung Richtlinie", &[])
        .await
        .unwrap();

    assert_eq!(report.selection.unwrap().sources, vec!["knowledge-base"]);
    assert!(f.crm.received().is_empty());
}

#[tokio::test]
async fn selector_outage_falls_back_to_keywords_with_baseline() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .on(SELECT, MockReply::Fail("503".into()))
        .reply(EXTRACT, r#"["ACME"]"#)
        .reply(ANSWER, "ok");
    let f = fixture(
        llm,
        vec![knowledge_base(), invoicing_crm()],
        vec![GraphEntity::new("acc-1", EntityKind::Account, "ACME")],
        vec![],
        AppConfig::default(),
    );

    let report = f
        .orchestrator
        .handle_turn_report("Zahlungsstatus von Kunde ACME", &[])
        .await
        .unwrap();

    let selection = report.selection.unwrap();
    assert_eq!(selection.sources, vec!["invoicing-crm", "knowledge-base"]);
    assert_eq!(f.crm.received()[0]["entity_id"], "acc-1");
}

#[tokio::test]
async fn classifier_outage_defaults_to_question() {
    let llm = MockLlmClient::new()
        .on(CLASSIFY, MockReply::Fail("timeout".into()))
        .reply(SELECT, selection(&["knowledge-base"], 0.9))
        .reply(ANSWER, "Listenpreise.");
    let f = fixture(llm, vec![knowledge_base()], vec![], vec![], AppConfig::default());

    let report = f.orchestrator.handle_turn_report("Hallo?", &[]).await.unwrap();

    assert!(report.visited(TurnPhase::SourcesSelected));
    assert_eq!(f.kb.received().len(), 1);
}

#[tokio::test]
async fn same_input_yields_same_result() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["invoicing-crm"], 0.9))
        .reply(EXTRACT, r#"["ACME"]"#)
        .reply(ANSWER, "Bezahlt.");
    let f = fixture(
        llm,
        vec![knowledge_base(), invoicing_crm()],
        vec![
            GraphEntity::new("evt-1", EntityKind::Event, "ACME"),
            GraphEntity::new("acc-1", EntityKind::Account, "ACME"),
        ],
        vec![],
        AppConfig::default(),
    );
    let history = vec![Message::user("Hallo"), Message::assistant("Hallo!")];

    let first = f
        .orchestrator
        .handle_turn_report("Zahlungsstatus von Kunde ACME", &history)
        .await
        .unwrap();
    let second = f
        .orchestrator
        .handle_turn_report("Zahlungsstatus von Kunde ACME", &history)
        .await
        .unwrap();

    assert_eq!(first.result, second.result);
    assert_eq!(first.resolution, second.resolution);
    assert_eq!(first.resolution.unwrap().entity_id(), Some("acc-1"));
}

#[tokio::test]
async fn history_reaches_the_answer_prompt() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["knowledge-base"], 0.9))
        .reply(ANSWER, "ok");
    let f = fixture(llm, vec![knowledge_base()], vec![], vec![], AppConfig::default());
    let history = vec![
        Message::user("Wir reden über das Projekt Nordlicht."),
        Message::assistant("Gern."),
    ];

    f.orchestrator.handle_turn("Und die Preise?", &history).await.unwrap();

    assert!(f.llm.last_prompt(ANSWER).contains("Projekt Nordlicht"));
}

#[tokio::test]
async fn cancelled_turn_returns_no_answer() {
    let slow: Arc<dyn Tool> =
        Arc::new(StaticTool::new("slow_search", "late").with_delay(Duration::from_secs(30)));
    let slow_kb = SourceDefinition::new("knowledge-base", SourceKind::SemanticSearch, "slow_search", "Docs");
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["knowledge-base"], 0.9))
        .reply(ANSWER, "too late");
    let f = fixture(llm, vec![slow_kb], vec![], vec![slow], AppConfig::default());

    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let result = f
        .orchestrator
        .handle_turn_with_cancel("Was ist unsere Preispolitik?", &[], token)
        .await;

    assert_eq!(result, Err(OrchestratorError::Cancelled));
    assert_eq!(f.llm.calls(ANSWER), 0);
}

#[tokio::test]
async fn streamed_answer_matches_full_answer() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["knowledge-base"], 0.9))
        .reply(ANSWER, "Es gelten die Listenpreise.");
    let f = fixture(llm, vec![knowledge_base()], vec![], vec![], AppConfig::default());

    let mut stream = f
        .orchestrator
        .handle_turn_stream("Was ist unsere Preispolitik?", &[])
        .await
        .unwrap();
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.next().await {
        chunks.push(chunk.unwrap());
    }

    assert!(chunks.len() > 1);
    assert_eq!(chunks.concat(), "Es gelten die Listenpreise.");
}

#[tokio::test]
async fn streamed_clarification_is_one_chunk() {
    let llm = MockLlmClient::new()
        .reply(CLASSIFY, "question")
        .reply(SELECT, selection(&["invoicing-crm"], 0.9))
        .reply(EXTRACT, r#"["Wolfgang"]"#)
        .reply(CLARIFY, "Welchen Wolfgang meinen Sie?");
    let f = fixture(
        llm,
        vec![knowledge_base(), invoicing_crm()],
        vec![GraphEntity::new("e1", EntityKind::Event, "Wolfgangsee")],
        vec![],
        AppConfig::default(),
    );

    let stream = f
        .orchestrator
        .handle_turn_stream("Status von Wolfgang", &[])
        .await
        .unwrap();
    let chunks: Vec<String> = stream.map(|c| c.unwrap()).collect().await;

    assert_eq!(chunks, vec!["Welchen Wolfgang meinen Sie?"]);
}
