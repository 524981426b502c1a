//! 运行步骤记录
//!
//! 一个 Step = 一轮模型输出：自由文本 + 零或多个工具调用 + 对应工具结果。
//! Step 序列 append-only（审计轨迹），阶段转移与终止判定的唯一信号就是
//! 历史中出现过哪些工具结果名。

use serde::{Deserialize, Serialize};

/// 模型发起的一次工具调用（入参为 JSON）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// 模型侧的调用 id（回写 tool 消息时需要）
    pub call_id: String,
    pub tool_name: String,
    pub args: serde_json::Value,
}

/// 一次工具调用的结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub tool_name: String,
    pub output: serde_json::Value,
}

/// 一轮模型输出的完整记录；创建后不再修改
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    /// 模型的自由文本（可为空）
    pub text: String,
    pub tool_calls: Vec<ToolInvocation>,
    pub tool_results: Vec<ToolResult>,
}

/// 判断历史中是否出现过指定名称的工具结果
pub fn tool_result_seen(steps: &[Step], tool_name: &str) -> bool {
    steps
        .iter()
        .any(|s| s.tool_results.iter().any(|r| r.tool_name == tool_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_with_result(name: &str) -> Step {
        Step {
            text: String::new(),
            tool_calls: vec![],
            tool_results: vec![ToolResult {
                call_id: "c1".to_string(),
                tool_name: name.to_string(),
                output: serde_json::json!({}),
            }],
        }
    }

    #[test]
    fn test_tool_result_seen() {
        let steps = vec![step_with_result("SearchCatalog"), step_with_result("FinalizePlan")];
        assert!(tool_result_seen(&steps, "FinalizePlan"));
        assert!(!tool_result_seen(&steps, "FinalizeBuild"));
    }
}
