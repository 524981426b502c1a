//! 模型轮次执行器抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 TurnExecutor：给定 system 指令、对话历史与
//! 本轮启用的工具子集，返回一轮输出（自由文本 + 零或多个工具调用）。

use async_trait::async_trait;

use crate::core::step::ToolInvocation;

/// 消息角色（与 LLM API 一致；system 单独作为参数传入，不在历史中）
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

/// 单条对话消息；assistant 消息可携带工具调用，tool 消息回写调用结果
#[derive(Clone, Debug)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    /// assistant 消息发起的工具调用（回传给 API 以保持对话合法）
    pub tool_calls: Vec<ToolInvocation>,
    /// tool 消息对应的调用 id
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolInvocation>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Tool,
            content: content.into(),
            tool_calls: vec![],
            tool_call_id: Some(call_id.into()),
        }
    }
}

/// 暴露给模型的工具声明：名称、描述、入参 JSON Schema
#[derive(Clone, Debug)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// 一轮模型输出：自由文本 + 工具调用请求（结果由编排循环执行后回写）
#[derive(Clone, Debug, Default)]
pub struct TurnOutput {
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
}

/// 模型轮次执行器 trait
#[async_trait]
pub trait TurnExecutor: Send + Sync {
    /// 执行一轮：system + 历史 + 启用工具子集 -> 本轮输出
    async fn execute_turn(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<TurnOutput, String>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}
