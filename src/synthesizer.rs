//! 答案合成
//!
//! 每个成功的 ToolOutcome 拼成一个带数据源标签的上下文段（错误 / 跳过的只记日志），
//! 附上截断后的近期历史与可选的领域简报，然后：
//! - 实体不确定：让 LLM 提一个澄清问题，结果一定是 Clarification；
//! - 否则：整合所有上下文段生成自然语言答案；一个成功段都没有时明确告知「没有可用信息」。
//!
//! 提示词禁止 LLM 提及内部机制（目录、打分、提示词）。

use std::sync::Arc;
use std::time::Duration;

use futures_util::stream;
use serde::Serialize;

use crate::briefing::DomainBriefing;
use crate::conversation::{ConversationTurn, Message};
use crate::core::OrchestratorError;
use crate::llm::{complete_within, LlmClient, LlmError, TokenStream};
use crate::tools::{ToolOutcomes, ToolStatus};

const ANSWER_PROMPT: &str = "You are a business assistant. Answer the user's question using only the information sections provided below.
- Integrate all relevant sections into one natural answer in the user's language.
- Attribute a fact to its source only where that reads naturally.
- Never mention internal mechanics such as data catalogs, scores, tools or prompts.
- If the sections do not contain the answer, say so plainly instead of guessing.";

const CLARIFY_PROMPT: &str = "You are a business assistant. The user's question refers to a person or organization that could not be identified unambiguously.
Do not answer the question and do not guess. Ask one short clarifying question in the user's language, e.g. whether they mean a person or an organization, and ask for the full name.
Never mention internal mechanics such as data catalogs, scores, tools or prompts.";

const SMALL_TALK_PROMPT: &str = "You are a friendly business assistant. Reply briefly and naturally to the user's message. Offer help with business questions if it fits.";

const NO_INFORMATION: &str = "No information is available from any source for this question.";

/// LLM 不可用时的固定澄清问题
pub const FALLBACK_CLARIFICATION: &str =
    "Did you mean a person or an organization? Please give the full name.";

const ANSWER_TEMPERATURE: f32 = 0.3;
const CLARIFY_TEMPERATURE: f32 = 0.2;
const SMALL_TALK_TEMPERATURE: f32 = 0.7;

/// 一轮编排的最终产出
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationResult {
    Answer {
        text: String,
        /// 提供了上下文的数据源（按 id 排序）
        sources_used: Vec<String>,
    },
    Clarification {
        text: String,
    },
}

impl OrchestrationResult {
    pub fn text(&self) -> &str {
        match self {
            OrchestrationResult::Answer { text, .. } | OrchestrationResult::Clarification { text } => {
                text
            }
        }
    }

    pub fn is_clarification(&self) -> bool {
        matches!(self, OrchestrationResult::Clarification { .. })
    }
}

/// 合成参数
#[derive(Debug, Clone)]
pub struct SynthesizerSettings {
    pub history_turns: usize,
    pub history_chars_per_message: usize,
    pub timeout: Duration,
}

impl Default for SynthesizerSettings {
    fn default() -> Self {
        Self {
            history_turns: 6,
            history_chars_per_message: 500,
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Answer,
    Clarify,
    SmallTalk,
}

impl Mode {
    fn temperature(self) -> f32 {
        match self {
            Mode::Answer => ANSWER_TEMPERATURE,
            Mode::Clarify => CLARIFY_TEMPERATURE,
            Mode::SmallTalk => SMALL_TALK_TEMPERATURE,
        }
    }
}

/// 答案合成器
pub struct AnswerSynthesizer {
    llm: Arc<dyn LlmClient>,
    briefing: Arc<DomainBriefing>,
    settings: SynthesizerSettings,
}

impl AnswerSynthesizer {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        briefing: Arc<DomainBriefing>,
        settings: SynthesizerSettings,
    ) -> Self {
        Self {
            llm,
            briefing,
            settings,
        }
    }

    /// 合成答案或澄清问题；结果与 outcomes 的调用顺序无关
    pub async fn synthesize(
        &self,
        turn: &ConversationTurn<'_>,
        outcomes: &ToolOutcomes,
        uncertain: bool,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        if uncertain {
            return Ok(self.clarify(turn).await);
        }
        let messages = self.build_messages(Mode::Answer, turn, outcomes).await;
        let text = complete_within(
            self.llm.as_ref(),
            &messages,
            Mode::Answer.temperature(),
            self.settings.timeout,
        )
        .await?;
        Ok(OrchestrationResult::Answer {
            text,
            sources_used: sources_used(outcomes),
        })
    }

    /// 闲聊：不带任何数据源上下文
    pub async fn small_talk(
        &self,
        turn: &ConversationTurn<'_>,
    ) -> Result<OrchestrationResult, OrchestratorError> {
        let messages = self
            .build_messages(Mode::SmallTalk, turn, &ToolOutcomes::new())
            .await;
        let text = complete_within(
            self.llm.as_ref(),
            &messages,
            Mode::SmallTalk.temperature(),
            self.settings.timeout,
        )
        .await?;
        Ok(OrchestrationResult::Answer {
            text,
            sources_used: Vec::new(),
        })
    }

    /// 流式合成：答案逐 token 输出；澄清问题作为单个 chunk 输出
    pub async fn synthesize_stream(
        &self,
        turn: &ConversationTurn<'_>,
        outcomes: &ToolOutcomes,
        uncertain: bool,
        small_talk: bool,
    ) -> Result<TokenStream, OrchestratorError> {
        if uncertain && !small_talk {
            let text = self.clarify(turn).await.text().to_string();
            return Ok(Box::pin(stream::iter(vec![Ok::<_, LlmError>(text)])));
        }
        let mode = if small_talk { Mode::SmallTalk } else { Mode::Answer };
        let messages = self.build_messages(mode, turn, outcomes).await;
        let stream = tokio::time::timeout(
            self.settings.timeout,
            self.llm.complete_stream(&messages, mode.temperature()),
        )
        .await
        .map_err(|_| LlmError::Timeout(self.settings.timeout))??;
        Ok(stream)
    }

    async fn clarify(&self, turn: &ConversationTurn<'_>) -> OrchestrationResult {
        let messages = self
            .build_messages(Mode::Clarify, turn, &ToolOutcomes::new())
            .await;
        let text = match complete_within(
            self.llm.as_ref(),
            &messages,
            Mode::Clarify.temperature(),
            self.settings.timeout,
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Clarification generation failed ({}), using fixed question", e);
                FALLBACK_CLARIFICATION.to_string()
            }
        };
        OrchestrationResult::Clarification { text }
    }

    async fn build_messages(
        &self,
        mode: Mode,
        turn: &ConversationTurn<'_>,
        outcomes: &ToolOutcomes,
    ) -> Vec<Message> {
        let mut system = match mode {
            Mode::Answer => ANSWER_PROMPT,
            Mode::Clarify => CLARIFY_PROMPT,
            Mode::SmallTalk => SMALL_TALK_PROMPT,
        }
        .to_string();

        let briefing = self.briefing.get().await;
        if !briefing.is_empty() {
            system.push_str("\n\n## Business context\n");
            system.push_str(&briefing);
        }

        if mode == Mode::Answer {
            system.push_str("\n\n## Information\n");
            system.push_str(&context_sections(outcomes));
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(turn.recent_history(
            self.settings.history_turns,
            self.settings.history_chars_per_message,
        ));
        messages.push(Message::user(turn.message));
        messages
    }
}

fn sources_used(outcomes: &ToolOutcomes) -> Vec<String> {
    outcomes
        .values()
        .filter(|o| o.is_ok())
        .map(|o| o.source_id.clone())
        .collect()
}

/// 每个成功结果一个带标签的段；失败 / 跳过只记日志
fn context_sections(outcomes: &ToolOutcomes) -> String {
    let mut sections = Vec::new();
    for (source_id, outcome) in outcomes {
        match &outcome.status {
            ToolStatus::Ok { payload } => {
                sections.push(format!("### {source_id}\n{}", payload.trim()));
            }
            ToolStatus::Error { message } => {
                tracing::info!(source_id = %source_id, "Excluding failed source: {}", message);
            }
            ToolStatus::Skipped { reason } => {
                tracing::info!(source_id = %source_id, "Excluding skipped source: {}", reason);
            }
        }
    }
    if sections.is_empty() {
        tracing::warn!(kind = "AllToolsFailed", "No source produced data for this turn");
        return NO_INFORMATION.to_string();
    }
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MockLlmClient, MockReply};
    use crate::tools::ToolOutcome;

    fn outcome(id: &str, status: ToolStatus) -> (String, ToolOutcome) {
        (
            id.to_string(),
            ToolOutcome {
                source_id: id.to_string(),
                tool_name: "t".to_string(),
                status,
            },
        )
    }

    fn synthesizer(llm: MockLlmClient) -> AnswerSynthesizer {
        AnswerSynthesizer::new(
            Arc::new(llm),
            Arc::new(DomainBriefing::none()),
            SynthesizerSettings::default(),
        )
    }

    #[test]
    fn only_successful_outcomes_become_sections() {
        let outcomes: ToolOutcomes = [
            outcome("knowledge-base", ToolStatus::Ok { payload: "Preise steigen 2025.".into() }),
            outcome("crm", ToolStatus::Error { message: "HTTP 500".into() }),
            outcome("sql", ToolStatus::Skipped { reason: "x".into() }),
        ]
        .into_iter()
        .collect();
        let text = context_sections(&outcomes);
        assert!(text.contains("### knowledge-base\nPreise steigen 2025."));
        assert!(!text.contains("crm"));
        assert_eq!(sources_used(&outcomes), vec!["knowledge-base"]);
    }

    #[test]
    fn no_data_is_framed_explicitly() {
        let outcomes: ToolOutcomes =
            [outcome("crm", ToolStatus::Error { message: "down".into() })].into_iter().collect();
        assert_eq!(context_sections(&outcomes), NO_INFORMATION);
    }

    #[tokio::test]
    async fn uncertain_always_clarifies() {
        let llm = MockLlmClient::new()
            .reply("information sections", "Answer")
            .reply("clarifying question", "Meinen Sie eine Person oder eine Firma?");
        let turn = ConversationTurn::new("Status von Wolfgang", &[]);
        let result = synthesizer(llm)
            .synthesize(&turn, &ToolOutcomes::new(), true)
            .await
            .unwrap();
        assert_eq!(
            result,
            OrchestrationResult::Clarification {
                text: "Meinen Sie eine Person oder eine Firma?".into()
            }
        );
    }

    #[tokio::test]
    async fn clarification_survives_llm_failure() {
        let llm = MockLlmClient::new().on("clarifying question", MockReply::Fail("down".into()));
        let turn = ConversationTurn::new("Status von Wolfgang", &[]);
        let result = synthesizer(llm)
            .synthesize(&turn, &ToolOutcomes::new(), true)
            .await
            .unwrap();
        assert_eq!(result.text(), FALLBACK_CLARIFICATION);
    }

    #[tokio::test]
    async fn answer_llm_failure_surfaces() {
        let llm = MockLlmClient::new().on("information sections", MockReply::Fail("down".into()));
        let turn = ConversationTurn::new("Was ist unsere Preispolitik?", &[]);
        let err = synthesizer(llm)
            .synthesize(&turn, &ToolOutcomes::new(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Llm(_)));
    }

    #[tokio::test]
    async fn prompt_carries_history_and_briefing() {
        let briefing = DomainBriefing::new(
            Arc::new("Wir verkaufen Fenster.".to_string()),
            Duration::from_secs(60),
        );
        let synth = AnswerSynthesizer::new(
            Arc::new(MockLlmClient::new()),
            Arc::new(briefing),
            SynthesizerSettings {
                history_turns: 1,
                history_chars_per_message: 5,
                ..Default::default()
            },
        );
        let history = vec![
            Message::user("alt"),
            Message::assistant("alt"),
            Message::user("Hallo Welt"),
            Message::assistant("Guten Tag"),
        ];
        let turn = ConversationTurn::new("Und?", &history);
        let messages = synth.build_messages(Mode::Answer, &turn, &ToolOutcomes::new()).await;
        assert!(messages[0].content.contains("Wir verkaufen Fenster."));
        assert!(messages[0].content.contains(NO_INFORMATION));
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "Hallo…");
        assert_eq!(messages[3].content, "Und?");
    }
}
