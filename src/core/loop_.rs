//! 编排主循环
//!
//! 每步：取消检查 -> 对完整历史重算阶段 -> 装配阶段化 system 与工具子集 ->
//! 模型一轮 -> 执行其工具调用（不在当前阶段的调用一律拒绝，只回喂消息，
//! 不进入 tool_results，以免推动阶段机）->
//! 追加 Step -> 终止判定（FinalizeReport / FinalizeNoData / ClarifyIntent）。
//! 步数预算耗尽不是 Err：带着完整历史以 BudgetExceeded 终止返回。
//! 支持 cancel_token 取消与可选 event_tx 事件推送。

use std::sync::Arc;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::{
    AgentError, AgentEvent, Phase, PhaseConfig, Step, ToolResult,
};
use crate::llm::{ChatMessage, TurnExecutor};
use crate::semantic::EntityCatalog;
use crate::tools::{names, FinalizeReportPayload, ToolExecutor};

/// 默认步数预算
pub const DEFAULT_MAX_STEPS: usize = 100;

/// 运行终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// FinalizeReport 成功产出最终答案
    Report,
    /// FinalizeNoData：目录中没有可回答的数据
    NoData,
    /// ClarifyIntent：需要用户澄清
    Clarify,
    /// 步数预算耗尽
    BudgetExceeded,
}

/// 一次运行的完整结果
#[derive(Debug)]
pub struct RunResult {
    pub steps: Vec<Step>,
    pub phase: Phase,
    pub final_report: Option<FinalizeReportPayload>,
    pub termination: Termination,
}

/// 编排器：模型轮次执行器 + 工具执行器 + 实体目录
pub struct Agent {
    turn_executor: Arc<dyn TurnExecutor>,
    tools: ToolExecutor,
    catalog: Arc<dyn EntityCatalog>,
    max_steps: usize,
}

fn send_event(tx: &Option<&tokio::sync::mpsc::UnboundedSender<AgentEvent>>, ev: AgentEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

impl Agent {
    pub fn new(
        turn_executor: Arc<dyn TurnExecutor>,
        tools: ToolExecutor,
        catalog: Arc<dyn EntityCatalog>,
    ) -> Self {
        Self {
            turn_executor,
            tools,
            catalog,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// 跑一个问题到终止
    pub async fn run(
        &self,
        question: &str,
        cancel_token: CancellationToken,
        event_tx: Option<&tokio::sync::mpsc::UnboundedSender<AgentEvent>>,
    ) -> Result<RunResult, AgentError> {
        let run_id = Uuid::new_v4();
        tracing::info!(run_id = %run_id, question, "agent run started");

        // 实体目录摘要与已验证示例查询在运行开始时取一次，planning 轮原样嵌入
        let entity_summaries = match self.catalog.list_entities().await {
            Ok(list) => serde_json::to_value(list).unwrap_or_else(|_| json!([])),
            Err(e) => {
                tracing::warn!(error = %e, "entity catalog unavailable, planning without it");
                json!([])
            }
        };
        let verified_queries =
            serde_json::to_value(self.catalog.verified_queries().await).unwrap_or_else(|_| json!([]));

        let mut steps: Vec<Step> = Vec::new();
        let mut messages: Vec<ChatMessage> = vec![ChatMessage::user(question)];
        let mut last_phase: Option<Phase> = None;
        let mut final_report: Option<FinalizeReportPayload> = None;

        for step_index in 0..self.max_steps {
            send_event(
                &event_tx,
                AgentEvent::StepUpdate {
                    step: step_index,
                    max_steps: self.max_steps,
                },
            );

            if cancel_token.is_cancelled() {
                send_event(
                    &event_tx,
                    AgentEvent::Error {
                        text: "Cancelled by user".to_string(),
                    },
                );
                return Err(AgentError::Cancelled);
            }

            let phase = Phase::from_history(&steps);
            if last_phase != Some(phase) {
                tracing::info!(run_id = %run_id, %phase, "phase entered");
                send_event(&event_tx, AgentEvent::PhaseChanged { phase });
                last_phase = Some(phase);
            }
            let cfg = PhaseConfig::for_phase(phase, &entity_summaries, &verified_queries);
            let specs = self.tools.specs_for(cfg.active_tools);

            send_event(&event_tx, AgentEvent::Thinking);
            let output = match self
                .turn_executor
                .execute_turn(&cfg.system, &messages, &specs)
                .await
            {
                Ok(o) => o,
                Err(e) => {
                    send_event(&event_tx, AgentEvent::Error { text: e.clone() });
                    return Err(AgentError::Transport(e));
                }
            };

            if !output.text.is_empty() {
                send_event(
                    &event_tx,
                    AgentEvent::MessageText {
                        text: output.text.clone(),
                    },
                );
            }
            messages.push(ChatMessage::assistant(
                output.text.clone(),
                output.tool_calls.clone(),
            ));

            let mut tool_results: Vec<ToolResult> = Vec::new();
            // 本步中成功落地的终止工具（门控拒绝与软失败不算）
            let mut terminal: Option<Termination> = None;

            for call in &output.tool_calls {
                send_event(
                    &event_tx,
                    AgentEvent::ToolCall {
                        tool: call.tool_name.clone(),
                        args: call.args.clone(),
                    },
                );

                let gated = cfg.active_tools.contains(&call.tool_name.as_str());
                let (value, succeeded) = if !gated {
                    tracing::warn!(
                        run_id = %run_id,
                        tool = %call.tool_name,
                        %phase,
                        "tool call rejected: not active in current phase"
                    );
                    (
                        json!({
                            "ok": false,
                            "error": format!(
                                "tool {} is not available in the {} phase",
                                call.tool_name, phase
                            ),
                        }),
                        false,
                    )
                } else {
                    match self.tools.execute(&call.tool_name, call.args.clone()).await {
                        Ok(v) => (v, true),
                        Err(e @ AgentError::Transport(_)) => {
                            send_event(
                                &event_tx,
                                AgentEvent::Error {
                                    text: e.to_string(),
                                },
                            );
                            return Err(e);
                        }
                        Err(e) => (json!({ "ok": false, "error": e.to_string() }), false),
                    }
                };

                send_event(&event_tx, AgentEvent::observation(&call.tool_name, &value));
                messages.push(ChatMessage::tool(call.call_id.clone(), value.to_string()));

                // 只有成功落地的调用才进入历史：阶段机与终止判定都只看
                // tool_results，拒绝/失败只通过 messages 回喂给模型
                if succeeded {
                    match call.tool_name.as_str() {
                        names::FINALIZE_REPORT => {
                            final_report =
                                serde_json::from_value::<FinalizeReportPayload>(value.clone()).ok();
                            terminal = Some(Termination::Report);
                        }
                        names::FINALIZE_NO_DATA => terminal = Some(Termination::NoData),
                        names::CLARIFY_INTENT => terminal = Some(Termination::Clarify),
                        _ => {}
                    }
                    tool_results.push(ToolResult {
                        call_id: call.call_id.clone(),
                        tool_name: call.tool_name.clone(),
                        output: value,
                    });
                }
            }

            steps.push(Step {
                text: output.text,
                tool_calls: output.tool_calls,
                tool_results,
            });

            if let Some(termination) = terminal {
                if termination == Termination::Report {
                    if let Some(ref payload) = final_report {
                        send_event(
                            &event_tx,
                            AgentEvent::FinalReport {
                                payload: serde_json::to_value(payload)
                                    .unwrap_or_else(|_| json!({})),
                            },
                        );
                    }
                }
                send_event(&event_tx, AgentEvent::Done);
                let phase = Phase::from_history(&steps);
                tracing::info!(run_id = %run_id, ?termination, steps = steps.len(), "agent run finished");
                return Ok(RunResult {
                    steps,
                    phase,
                    final_report,
                    termination,
                });
            }
        }

        // 预算耗尽：不是系统故障，带完整历史返回
        let err = AgentError::BudgetExceeded(self.max_steps);
        tracing::warn!(run_id = %run_id, error = %err, "agent run stopped");
        send_event(
            &event_tx,
            AgentEvent::Error {
                text: err.to_string(),
            },
        );
        send_event(&event_tx, AgentEvent::Done);
        let phase = Phase::from_history(&steps);
        Ok(RunResult {
            steps,
            phase,
            final_report: None,
            termination: Termination::BudgetExceeded,
        })
    }
}
