//! 阶段状态机
//!
//! 四阶段（planning / building / execution / reporting），单调前进、不回退。
//! 判定方式是「对完整 Step 历史重新求值」而非边沿触发：对同一历史重复求值
//! 永远得到同一阶段，因此每轮进门前重算即可，无需增量状态。
//! 每个阶段同时决定：该轮的 system 指令与可用工具子集。

use serde::{Deserialize, Serialize};

use crate::core::step::{tool_result_seen, Step};
use crate::prompts;
use crate::tools::names;

/// Agent 工作流阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Planning,
    Building,
    Execution,
    Reporting,
}

impl Phase {
    /// 由完整历史计算当前阶段（纯函数，幂等）
    ///
    /// planning -> building：出现过 FinalizePlan 结果
    /// building -> execution：出现过 FinalizeBuild 结果
    /// execution -> reporting：出现过 ExecuteSQLWithRepair 结果
    pub fn from_history(steps: &[Step]) -> Phase {
        let mut phase = Phase::Planning;
        if tool_result_seen(steps, names::FINALIZE_PLAN) {
            phase = Phase::Building;
        }
        if tool_result_seen(steps, names::FINALIZE_BUILD) {
            phase = Phase::Execution;
        }
        if tool_result_seen(steps, names::EXECUTE_SQL_WITH_REPAIR) {
            phase = Phase::Reporting;
        }
        phase
    }

    /// 该阶段允许模型调用的工具名；其它工具的调用一律被拒绝
    pub fn active_tools(&self) -> &'static [&'static str] {
        match self {
            Phase::Planning => &[
                names::READ_ENTITY_YAML_RAW,
                names::LOAD_ENTITIES_BULK,
                names::SCAN_ENTITY_PROPERTIES,
                names::ASSESS_ENTITY_COVERAGE,
                names::CLARIFY_INTENT,
                names::SEARCH_CATALOG,
                names::SEARCH_SCHEMA,
                names::FINALIZE_PLAN,
                names::FINALIZE_NO_DATA,
            ],
            Phase::Building => &[
                names::JOIN_PATH_FINDER,
                names::BUILD_SQL,
                names::VALIDATE_SQL,
                names::FINALIZE_BUILD,
            ],
            Phase::Execution => &[
                names::ESTIMATE_COST,
                names::EXECUTE_SQL_WITH_REPAIR,
            ],
            Phase::Reporting => &[
                names::SANITY_CHECK,
                names::FORMAT_RESULTS,
                names::EXPLAIN_RESULTS,
                names::FINALIZE_REPORT,
            ],
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Planning => "planning",
            Phase::Building => "building",
            Phase::Execution => "execution",
            Phase::Reporting => "reporting",
        };
        write!(f, "{}", s)
    }
}

/// 一轮模型调用的阶段化配置：system 指令 + 可用工具子集
#[derive(Debug, Clone)]
pub struct PhaseConfig {
    pub phase: Phase,
    pub system: String,
    pub active_tools: &'static [&'static str],
}

impl PhaseConfig {
    /// 按阶段装配配置。planning 阶段额外嵌入实体目录摘要与已验证示例查询
    /// （few-shot），两者来自外部协作者、原样透传。
    pub fn for_phase(
        phase: Phase,
        entity_summaries: &serde_json::Value,
        verified_queries: &serde_json::Value,
    ) -> Self {
        let system = match phase {
            Phase::Planning => format!(
                "{}\n<PossibleEntities>{}</PossibleEntities>\n<VerifiedQueries>{}</VerifiedQueries>",
                prompts::PLANNING_SYSTEM_PROMPT,
                entity_summaries,
                verified_queries
            ),
            Phase::Building => prompts::BUILDING_SYSTEM_PROMPT.to_string(),
            Phase::Execution => prompts::EXECUTION_SYSTEM_PROMPT.to_string(),
            Phase::Reporting => prompts::REPORTING_SYSTEM_PROMPT.to_string(),
        };
        Self {
            phase,
            system,
            active_tools: phase.active_tools(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::step::ToolResult;

    fn step_with_result(name: &str) -> Step {
        Step {
            text: String::new(),
            tool_calls: vec![],
            tool_results: vec![ToolResult {
                call_id: "c".to_string(),
                tool_name: name.to_string(),
                output: serde_json::json!({}),
            }],
        }
    }

    #[test]
    fn test_initial_phase_is_planning() {
        assert_eq!(Phase::from_history(&[]), Phase::Planning);
    }

    #[test]
    fn test_transitions_follow_finalize_results() {
        let mut steps = vec![step_with_result("SearchCatalog")];
        assert_eq!(Phase::from_history(&steps), Phase::Planning);

        steps.push(step_with_result("FinalizePlan"));
        assert_eq!(Phase::from_history(&steps), Phase::Building);

        steps.push(step_with_result("FinalizeBuild"));
        assert_eq!(Phase::from_history(&steps), Phase::Execution);

        steps.push(step_with_result("ExecuteSQLWithRepair"));
        assert_eq!(Phase::from_history(&steps), Phase::Reporting);
    }

    #[test]
    fn test_phase_is_pure_function_of_history() {
        let steps = vec![
            step_with_result("FinalizePlan"),
            step_with_result("FinalizeBuild"),
        ];
        let p1 = Phase::from_history(&steps);
        let p2 = Phase::from_history(&steps);
        assert_eq!(p1, p2);
        assert_eq!(p1, Phase::Execution);
    }

    #[test]
    fn test_phase_never_regresses_as_history_grows() {
        let mut steps = vec![
            step_with_result("FinalizePlan"),
            step_with_result("FinalizeBuild"),
            step_with_result("ExecuteSQLWithRepair"),
        ];
        assert_eq!(Phase::from_history(&steps), Phase::Reporting);

        // 后续无论出现什么结果，阶段都不回退
        steps.push(step_with_result("FinalizePlan"));
        steps.push(step_with_result("SearchCatalog"));
        assert_eq!(Phase::from_history(&steps), Phase::Reporting);
    }

    #[test]
    fn test_out_of_order_history_still_monotonic() {
        // 即使 FinalizeBuild 先于 FinalizePlan 出现，求值结果也一致（只看存在性）
        let steps = vec![
            step_with_result("FinalizeBuild"),
            step_with_result("FinalizePlan"),
        ];
        assert_eq!(Phase::from_history(&steps), Phase::Execution);
    }

    #[test]
    fn test_active_tools_partition() {
        assert!(Phase::Planning.active_tools().contains(&"FinalizePlan"));
        assert!(!Phase::Planning.active_tools().contains(&"ExecuteSQLWithRepair"));
        assert!(!Phase::Execution.active_tools().contains(&"FinalizeReport"));
        assert!(Phase::Reporting.active_tools().contains(&"FinalizeReport"));
        // execution 阶段只下发带修复的执行与成本预估；裸 ExecuteSQL 不下发
        assert_eq!(
            Phase::Execution.active_tools(),
            &["EstimateCost", "ExecuteSQLWithRepair"]
        );
    }

    #[test]
    fn test_planning_config_embeds_catalog() {
        let entities = serde_json::json!([{"name": "companies"}]);
        let verified = serde_json::json!([{"question": "q", "sql": "SELECT 1"}]);
        let cfg = PhaseConfig::for_phase(Phase::Planning, &entities, &verified);
        assert!(cfg.system.contains("<PossibleEntities>"));
        assert!(cfg.system.contains("companies"));
        assert!(cfg.system.contains("<VerifiedQueries>"));

        let cfg = PhaseConfig::for_phase(Phase::Building, &entities, &verified);
        assert!(!cfg.system.contains("<PossibleEntities>"));
    }
}
