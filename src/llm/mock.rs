//! Mock 轮次执行器（用于测试，无需 API）
//!
//! 按脚本顺序返回预设轮次输出；脚本耗尽后返回纯文本轮，便于驱动预算耗尽场景。
//! 同时记录每轮收到的启用工具名，供阶段门控断言使用。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{ChatMessage, ToolSpec, TurnExecutor, TurnOutput};

/// Mock 执行器：脚本化轮次输出
#[derive(Debug, Default)]
pub struct MockTurnExecutor {
    script: Mutex<VecDeque<TurnOutput>>,
    /// 每轮收到的启用工具名（按轮次记录）
    pub seen_tool_sets: Mutex<Vec<Vec<String>>>,
}

impl MockTurnExecutor {
    pub fn new(turns: Vec<TurnOutput>) -> Self {
        Self {
            script: Mutex::new(turns.into()),
            seen_tool_sets: Mutex::new(Vec::new()),
        }
    }

    /// 第 n 轮（0 起）收到的工具名列表
    pub fn tools_offered_at(&self, turn: usize) -> Option<Vec<String>> {
        self.seen_tool_sets
            .lock()
            .expect("seen_tool_sets lock poisoned")
            .get(turn)
            .cloned()
    }
}

#[async_trait]
impl TurnExecutor for MockTurnExecutor {
    async fn execute_turn(
        &self,
        _system: &str,
        _messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<TurnOutput, String> {
        self.seen_tool_sets
            .lock()
            .expect("seen_tool_sets lock poisoned")
            .push(tools.iter().map(|t| t.name.clone()).collect());

        let next = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front();
        Ok(next.unwrap_or_else(|| TurnOutput {
            text: "(mock: script exhausted)".to_string(),
            tool_calls: vec![],
        }))
    }
}
