//! 运行过程事件：用于 CLI / Web 前端流式展示阶段、思考、工具调用与最终报告

use serde::Serialize;

use crate::core::Phase;

/// 工具结果预览最大字符数
const RESULT_PREVIEW_CHARS: usize = 200;

/// 单轮过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 步数更新（当前第几步）
    StepUpdate { step: usize, max_steps: usize },
    /// 阶段变更
    PhaseChanged { phase: Phase },
    /// 正在调用模型
    Thinking,
    /// 模型自由文本（一轮完成后整段推送）
    MessageText { text: String },
    /// 调用工具
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览，避免过长）
    Observation { tool: String, preview: String },
    /// 终止：带最终报告载荷（FinalizeReport 成功路径）
    FinalReport { payload: serde_json::Value },
    /// 错误
    Error { text: String },
    /// 运行结束
    Done,
}

impl AgentEvent {
    /// 由工具输出构造 Observation（截断预览）
    pub fn observation(tool: &str, output: &serde_json::Value) -> Self {
        let s = output.to_string();
        let preview = if s.chars().count() > RESULT_PREVIEW_CHARS {
            format!(
                "{}...",
                s.chars().take(RESULT_PREVIEW_CHARS).collect::<String>()
            )
        } else {
            s
        };
        AgentEvent::Observation {
            tool: tool.to_string(),
            preview,
        }
    }
}
