//! 工具层：数据源检索函数的注册、并发执行与结果汇总

pub mod executor;
pub mod http;
pub mod registry;
pub mod static_tool;

pub use executor::{ToolExecutor, ToolOutcome, ToolOutcomes, ToolStatus, SKIP_ENTITY_UNRESOLVED};
pub use http::HttpTool;
pub use registry::{Tool, ToolArgs, ToolRegistry};
pub use static_tool::StaticTool;
