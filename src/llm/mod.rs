//! 模型接入：轮次执行器抽象、OpenAI 兼容实现与测试用 Mock

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::MockTurnExecutor;
pub use openai::OpenAiTurnExecutor;
pub use traits::{ChatMessage, ChatRole, ToolSpec, TurnExecutor, TurnOutput};
