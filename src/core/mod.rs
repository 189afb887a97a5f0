//! 核心编排层：错误类型、单轮状态机、编排器与构建器

pub mod builder;
pub mod error;
pub mod orchestrator;
pub mod state;

pub use builder::{create_llm_from_config, OrchestratorBuilder};
pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;
pub use state::{TurnPhase, TurnReport};
