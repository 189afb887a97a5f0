//! 单轮状态机与轮次报告
//!
//! START -> CLASSIFIED -> {SMALL_TALK, SOURCES_SELECTED} -> [ENTITIES_RESOLVED] -> TOOLS_EXECUTED -> SYNTHESIZED
//! 没有选中需要实体的数据源时跳过 ENTITIES_RESOLVED；闲聊直接 SMALL_TALK -> SYNTHESIZED。

use serde::Serialize;

use crate::entity::EntityResolution;
use crate::intent::Intent;
use crate::selector::SourceSelection;
use crate::synthesizer::OrchestrationResult;
use crate::tools::ToolOutcomes;

/// 单轮阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    Start,
    Classified,
    SmallTalk,
    SourcesSelected,
    EntitiesResolved,
    ToolsExecuted,
    Synthesized,
}

impl TurnPhase {
    /// 合法的下一阶段
    pub fn can_advance_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (Start, Classified)
                | (Classified, SmallTalk)
                | (Classified, SourcesSelected)
                | (SourcesSelected, EntitiesResolved)
                | (SourcesSelected, ToolsExecuted)
                | (EntitiesResolved, ToolsExecuted)
                | (ToolsExecuted, Synthesized)
                | (SmallTalk, Synthesized)
        )
    }
}

/// 一轮的完整轨迹（调试与测试用）
#[derive(Debug, Clone, Serialize)]
pub struct TurnReport {
    pub turn_id: String,
    pub phases: Vec<TurnPhase>,
    pub intent: Option<Intent>,
    pub selection: Option<SourceSelection>,
    pub resolution: Option<EntityResolution>,
    pub outcomes: ToolOutcomes,
    pub entity_uncertain: bool,
    pub result: Option<OrchestrationResult>,
}

impl TurnReport {
    pub fn new(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            phases: vec![TurnPhase::Start],
            intent: None,
            selection: None,
            resolution: None,
            outcomes: ToolOutcomes::new(),
            entity_uncertain: false,
            result: None,
        }
    }

    pub fn phase(&self) -> TurnPhase {
        self.phases.last().copied().unwrap_or(TurnPhase::Start)
    }

    /// 推进阶段；非法转移只记录错误日志（属于编排器自身缺陷）
    pub fn advance(&mut self, next: TurnPhase) {
        let current = self.phase();
        if !current.can_advance_to(next) {
            tracing::error!(from = ?current, to = ?next, "Invalid turn phase transition");
        }
        tracing::debug!(phase = ?next, "Turn phase");
        self.phases.push(next);
    }

    pub fn visited(&self, phase: TurnPhase) -> bool {
        self.phases.contains(&phase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_stage_is_optional() {
        assert!(TurnPhase::SourcesSelected.can_advance_to(TurnPhase::ToolsExecuted));
        assert!(TurnPhase::SourcesSelected.can_advance_to(TurnPhase::EntitiesResolved));
        assert!(!TurnPhase::SmallTalk.can_advance_to(TurnPhase::ToolsExecuted));
        assert!(!TurnPhase::Synthesized.can_advance_to(TurnPhase::Start));
    }

    #[test]
    fn report_tracks_path() {
        let mut report = TurnReport::new("t-1");
        report.advance(TurnPhase::Classified);
        report.advance(TurnPhase::SmallTalk);
        report.advance(TurnPhase::Synthesized);
        assert_eq!(report.phase(), TurnPhase::Synthesized);
        assert!(!report.visited(TurnPhase::SourcesSelected));
    }
}
