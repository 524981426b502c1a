//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url），使用原生
//! tool calling：每轮只下发当前阶段启用的工具子集。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionMessageToolCall, ChatCompletionMessageToolCalls,
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestToolMessageArgs,
    ChatCompletionRequestUserMessageArgs, ChatCompletionTool, ChatCompletionTools,
    CreateChatCompletionRequestArgs, FunctionCall, FunctionObjectArgs,
};
use async_openai::Client;
use async_trait::async_trait;

use crate::core::step::ToolInvocation;
use crate::llm::{ChatMessage, ChatRole, ToolSpec, TurnExecutor, TurnOutput};

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容轮次执行器：持有 Client 与 model 名
pub struct OpenAiTurnExecutor {
    client: Client<OpenAIConfig>,
    model: String,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

impl OpenAiTurnExecutor {
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
            model: model.to_string(),
            usage: TokenUsage::new(),
        }
    }

    fn to_openai_messages(
        &self,
        system: &str,
        messages: &[ChatMessage],
    ) -> Result<Vec<ChatCompletionRequestMessage>, String> {
        let mut out = vec![ChatCompletionRequestMessage::System(
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system.to_string())
                .build()
                .map_err(|e| e.to_string())?,
        )];

        for m in messages {
            match m.role {
                ChatRole::User => out.push(ChatCompletionRequestMessage::User(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| e.to_string())?,
                )),
                ChatRole::Assistant => {
                    let mut args = ChatCompletionRequestAssistantMessageArgs::default();
                    args.content(m.content.clone());
                    if !m.tool_calls.is_empty() {
                        let calls: Vec<ChatCompletionMessageToolCalls> = m
                            .tool_calls
                            .iter()
                            .map(|c| {
                                ChatCompletionMessageToolCalls::Function(
                                    ChatCompletionMessageToolCall {
                                        id: c.call_id.clone(),
                                        function: FunctionCall {
                                            name: c.tool_name.clone(),
                                            arguments: c.args.to_string(),
                                        },
                                    },
                                )
                            })
                            .collect();
                        args.tool_calls(calls);
                    }
                    out.push(ChatCompletionRequestMessage::Assistant(
                        args.build().map_err(|e| e.to_string())?,
                    ));
                }
                ChatRole::Tool => out.push(ChatCompletionRequestMessage::Tool(
                    ChatCompletionRequestToolMessageArgs::default()
                        .content(m.content.clone())
                        .tool_call_id(m.tool_call_id.clone().unwrap_or_default())
                        .build()
                        .map_err(|e| e.to_string())?,
                )),
            }
        }
        Ok(out)
    }

    fn to_openai_tools(&self, tools: &[ToolSpec]) -> Result<Vec<ChatCompletionTools>, String> {
        tools
            .iter()
            .map(|t| {
                let function = FunctionObjectArgs::default()
                    .name(t.name.clone())
                    .description(t.description.clone())
                    .parameters(t.parameters.clone())
                    .build()
                    .map_err(|e| e.to_string())?;
                Ok(ChatCompletionTools::Function(ChatCompletionTool {
                    function,
                }))
            })
            .collect()
    }
}

#[async_trait]
impl TurnExecutor for OpenAiTurnExecutor {
    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }

    async fn execute_turn(
        &self,
        system: &str,
        messages: &[ChatMessage],
        tools: &[ToolSpec],
    ) -> Result<TurnOutput, String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(self.to_openai_messages(system, messages)?)
            .tools(self.to_openai_tools(tools)?)
            .build()
            .map_err(|e| e.to_string())?;

        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e| e.to_string())?;

        if let Some(usage) = &response.usage {
            self.usage
                .add(usage.prompt_tokens as u64, usage.completion_tokens as u64);
        }

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| "empty choices in completion response".to_string())?;

        let text = choice.message.content.clone().unwrap_or_default();
        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .filter_map(|tc| match tc {
                ChatCompletionMessageToolCalls::Function(call) => {
                    // 入参解析失败时包成原始字符串，交给工具入参校验去拒绝
                    let args = serde_json::from_str(&call.function.arguments)
                        .unwrap_or(serde_json::Value::String(call.function.arguments.clone()));
                    Some(ToolInvocation {
                        call_id: call.id,
                        tool_name: call.function.name,
                        args,
                    })
                }
                // 未声明 custom tool，忽略此类调用
                _ => None,
            })
            .collect();

        Ok(TurnOutput { text, tool_calls })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> OpenAiTurnExecutor {
        OpenAiTurnExecutor::new(None, "test-model", Some("sk-test"))
    }

    #[test]
    fn test_tool_specs_convert_to_function_tools() {
        let specs = vec![ToolSpec {
            name: "FinalizePlan".to_string(),
            description: "Lock in the plan".to_string(),
            parameters: serde_json::json!({ "type": "object" }),
        }];
        let tools = executor().to_openai_tools(&specs).unwrap();
        assert_eq!(tools.len(), 1);
        let v = serde_json::to_value(&tools).unwrap();
        assert_eq!(v[0]["type"], "function");
        assert_eq!(v[0]["function"]["name"], "FinalizePlan");
    }

    #[test]
    fn test_assistant_tool_calls_convert_to_function_calls() {
        let call = ToolInvocation {
            call_id: "c1".to_string(),
            tool_name: "SearchCatalog".to_string(),
            args: serde_json::json!({ "query": "companies" }),
        };
        let messages = vec![ChatMessage::assistant(String::new(), vec![call])];
        let out = executor().to_openai_messages("sys", &messages).unwrap();
        // out[0] 是 system 消息
        let v = serde_json::to_value(&out[1]).unwrap();
        assert_eq!(v["tool_calls"][0]["type"], "function");
        assert_eq!(v["tool_calls"][0]["id"], "c1");
        assert_eq!(v["tool_calls"][0]["function"]["name"], "SearchCatalog");
    }
}
