//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），
//! 由 ToolRegistry 按名注册与查找；阶段状态机只下发当前阶段的子集给模型。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::ToolSpec;

/// 工具 trait：名称、描述（供 LLM 理解）、入参 JSON Schema、异步执行（args 为 JSON）
///
/// 返回结构化 JSON 输出；入参非法返回 AgentError::ToolInput（执行前拒绝），
/// 协作者不可达返回 AgentError::Transport，其余业务性失败用 {"ok": false, ...} 软失败表达。
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（阶段门控与终止判定按此名匹配）
    fn name(&self) -> &str;

    /// 工具描述（供 LLM 理解功能）
    fn description(&self) -> &str;

    /// 入参 JSON Schema（供 LLM 生成正确的参数格式）
    /// 默认返回空对象，表示无参数或参数格式不限
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具
    async fn execute(&self, args: Value) -> Result<Value, AgentError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，支持 register / get / execute / specs_for
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        let name = tool.name().to_string();
        self.tools.insert(name, Arc::new(tool));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, AgentError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| AgentError::ToolInput(format!("Unknown tool: {}", name)))?;
        tool.execute(args).await
    }

    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// 为指定工具名子集构建 LLM 工具声明（按传入顺序；未注册的名字跳过）
    pub fn specs_for(&self, names: &[&str]) -> Vec<ToolSpec> {
        names
            .iter()
            .filter_map(|n| self.tools.get(*n))
            .map(|t| ToolSpec {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "Echo"
        }

        fn description(&self) -> &str {
            "Echo args back"
        }

        async fn execute(&self, args: Value) -> Result<Value, AgentError> {
            Ok(args)
        }
    }

    #[tokio::test]
    async fn test_register_and_execute() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);

        let out = registry
            .execute("Echo", serde_json::json!({"x": 1}))
            .await
            .unwrap();
        assert_eq!(out["x"], 1);

        let err = registry
            .execute("Nope", serde_json::json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolInput(_)));
    }

    #[test]
    fn test_specs_subset_preserves_order() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let specs = registry.specs_for(&["Missing", "Echo"]);
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name, "Echo");
    }
}
