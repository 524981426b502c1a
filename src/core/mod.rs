//! 核心：错误、步骤历史、阶段状态机、事件与编排主循环

pub mod error;
pub mod events;
pub mod loop_;
pub mod phase;
pub mod plan;
pub mod step;

pub use error::AgentError;
pub use events::AgentEvent;
pub use loop_::{Agent, RunResult, Termination, DEFAULT_MAX_STEPS};
pub use phase::{Phase, PhaseConfig};
pub use plan::FinalizedPlan;
pub use step::{tool_result_seen, Step, ToolInvocation, ToolResult};
