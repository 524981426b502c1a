//! 编排循环集成测试：脚本化模型 + 内存数据库/目录，覆盖
//! 四阶段快乐路径、阶段门控拒绝与步数预算耗尽。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use nectar::core::{Agent, ToolInvocation, Termination, DEFAULT_MAX_STEPS};
use nectar::db::{
    ColumnInfo, DatabaseExecutor, DbError, PlanEstimate, QueryResult, TableSchema,
};
use nectar::execute::{ColumnRepairEngine, ResultCache};
use nectar::llm::{MockTurnExecutor, TurnOutput};
use nectar::semantic::{EntityCatalog, EntitySummary, VerifiedQuery};
use nectar::tools::{build_registry, ToolExecutor};

struct OneRowDb;

#[async_trait]
impl DatabaseExecutor for OneRowDb {
    async fn execute(&self, _sql: &str) -> Result<QueryResult, DbError> {
        Ok(QueryResult {
            rows: vec![json!({ "industry": "software", "n": 12 })],
            columns: vec![
                ColumnInfo {
                    name: "industry".to_string(),
                    type_name: "TEXT".to_string(),
                },
                ColumnInfo {
                    name: "n".to_string(),
                    type_name: "INT8".to_string(),
                },
            ],
            row_count: 1,
            execution_time_ms: 4,
        })
    }

    async fn explain(&self, _sql: &str) -> Result<PlanEstimate, DbError> {
        Ok(PlanEstimate {
            estimated_rows: Some(1),
            total_cost: Some(1.0),
        })
    }

    async fn schema(&self) -> Result<Vec<TableSchema>, DbError> {
        Ok(vec![])
    }
}

struct CompaniesCatalog;

#[async_trait]
impl EntityCatalog for CompaniesCatalog {
    async fn list_entities(&self) -> Result<Vec<EntitySummary>, String> {
        Ok(vec![EntitySummary {
            name: "companies".to_string(),
            description: "Registered companies".to_string(),
        }])
    }

    async fn load_entity(&self, name: &str) -> Result<serde_json::Value, String> {
        if name == "companies" {
            Ok(json!({
                "description": "Registered companies",
                "properties": [{"name": "industry", "type": "text"}]
            }))
        } else {
            Err(format!("entity not found: {}", name))
        }
    }

    async fn read_raw(&self, name: &str) -> Result<String, String> {
        self.load_entity(name).await.map(|v| v.to_string())
    }

    async fn verified_queries(&self) -> Vec<VerifiedQuery> {
        vec![VerifiedQuery {
            question: "How many companies are there?".to_string(),
            sql: "SELECT count(*) FROM companies".to_string(),
        }]
    }
}

fn call(id: &str, tool: &str, args: serde_json::Value) -> ToolInvocation {
    ToolInvocation {
        call_id: id.to_string(),
        tool_name: tool.to_string(),
        args,
    }
}

fn turn(text: &str, tool_calls: Vec<ToolInvocation>) -> TurnOutput {
    TurnOutput {
        text: text.to_string(),
        tool_calls,
    }
}

fn agent_with_script(script: Vec<TurnOutput>) -> (Agent, Arc<MockTurnExecutor>) {
    let db: Arc<dyn DatabaseExecutor> = Arc::new(OneRowDb);
    let catalog = Arc::new(CompaniesCatalog);
    let registry = build_registry(
        db,
        catalog.clone(),
        Arc::new(ResultCache::new()),
        Arc::new(ColumnRepairEngine::new()),
    );
    let executor = ToolExecutor::new(registry, 5);
    let mock = Arc::new(MockTurnExecutor::new(script));
    let agent = Agent::new(mock.clone(), executor, catalog);
    (agent, mock)
}

#[tokio::test]
async fn test_happy_path_through_all_four_phases() {
    let sql = "SELECT industry, count(*) AS n FROM companies GROUP BY industry";
    let (agent, mock) = agent_with_script(vec![
        turn(
            "Planning done.",
            vec![call("c1", "FinalizePlan", json!({ "plan": { "entities": ["companies"] } }))],
        ),
        turn(
            "SQL built.",
            vec![call("c2", "FinalizeBuild", json!({ "sql": sql }))],
        ),
        turn(
            "",
            vec![call(
                "c3",
                "ExecuteSQLWithRepair",
                json!({ "sql": sql, "plan": { "entities": ["companies"] } }),
            )],
        ),
        turn(
            "",
            vec![call(
                "c4",
                "FinalizeReport",
                json!({
                    "sql": sql,
                    "narrative": "Software is the largest industry with 12 companies.",
                    "confidence": 0.9,
                    "preview": [{ "industry": "software", "n": 12 }]
                }),
            )],
        ),
    ]);

    let result = agent
        .run("Which industry has the most companies?", CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(result.termination, Termination::Report);
    assert_eq!(result.steps.len(), 4);

    let report = result.final_report.expect("final report payload");
    assert_eq!(report.sql, sql);
    assert_eq!(report.confidence, 0.9);
    assert_eq!(report.preview.len(), 1);

    // 每轮只下发当前阶段的工具子集
    let planning_tools = mock.tools_offered_at(0).unwrap();
    assert!(planning_tools.contains(&"FinalizePlan".to_string()));
    assert!(planning_tools.contains(&"SearchCatalog".to_string()));
    assert!(!planning_tools.contains(&"ExecuteSQLWithRepair".to_string()));

    let building_tools = mock.tools_offered_at(1).unwrap();
    assert!(building_tools.contains(&"FinalizeBuild".to_string()));
    assert!(!building_tools.contains(&"FinalizePlan".to_string()));

    let execution_tools = mock.tools_offered_at(2).unwrap();
    assert!(execution_tools.contains(&"ExecuteSQLWithRepair".to_string()));
    assert!(execution_tools.contains(&"EstimateCost".to_string()));

    let reporting_tools = mock.tools_offered_at(3).unwrap();
    assert!(reporting_tools.contains(&"FinalizeReport".to_string()));
    assert!(!reporting_tools.contains(&"ExecuteSQLWithRepair".to_string()));

    // 执行结果进入了对话：第三步的工具结果带行数据
    let exec_output = &result.steps[2].tool_results[0].output;
    assert_eq!(exec_output["row_count"], 1);
    assert_eq!(exec_output["repaired"], false);
}

#[tokio::test]
async fn test_phase_gated_tool_call_is_rejected_but_run_continues() {
    let (agent, mock) = agent_with_script(vec![
        // planning 阶段越权调用 execution 工具
        turn(
            "",
            vec![call("c1", "ExecuteSQLWithRepair", json!({ "sql": "SELECT 1" }))],
        ),
        turn(
            "",
            vec![call("c2", "FinalizeNoData", json!({ "reason": "nothing to do" }))],
        ),
    ]);

    let result = agent
        .run("anything", CancellationToken::new(), None)
        .await
        .unwrap();

    // 被拒绝的调用不进入历史，不推动阶段机
    assert!(result.steps[0].tool_results.is_empty());
    assert_eq!(result.steps[0].tool_calls.len(), 1);

    // 下一轮仍然是 planning 阶段的工具子集，而不是被越权调用顶进 reporting
    let second_turn_tools = mock.tools_offered_at(1).unwrap();
    assert!(second_turn_tools.contains(&"FinalizePlan".to_string()));
    assert!(second_turn_tools.contains(&"FinalizeNoData".to_string()));
    assert!(!second_turn_tools.contains(&"FinalizeReport".to_string()));
    assert!(!second_turn_tools.contains(&"SanityCheck".to_string()));

    // 越权调用不终止运行
    assert_eq!(result.termination, Termination::NoData);
    assert_eq!(result.steps.len(), 2);
}

#[tokio::test]
async fn test_budget_exhaustion_returns_history_not_error() {
    // 脚本为空：每轮都是纯文本，永不触发终止工具
    let (agent, _mock) = agent_with_script(vec![]);
    let agent = agent.with_max_steps(3);

    let result = agent
        .run("never finishes", CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(result.termination, Termination::BudgetExceeded);
    assert!(result.final_report.is_none());
    assert_eq!(result.steps.len(), 3);
    assert_eq!(DEFAULT_MAX_STEPS, 100);
}

#[tokio::test]
async fn test_clarify_intent_terminates_run() {
    let (agent, _mock) = agent_with_script(vec![turn(
        "",
        vec![call(
            "c1",
            "ClarifyIntent",
            json!({ "question": "Which fiscal year do you mean?" }),
        )],
    )]);

    let result = agent
        .run("revenue last year", CancellationToken::new(), None)
        .await
        .unwrap();

    assert_eq!(result.termination, Termination::Clarify);
    assert_eq!(
        result.steps[0].tool_results[0].output["question"],
        "Which fiscal year do you mean?"
    );
}

#[tokio::test]
async fn test_cancellation_before_first_turn() {
    let (agent, _mock) = agent_with_script(vec![]);
    let token = CancellationToken::new();
    token.cancel();

    let err = agent.run("anything", token, None).await.unwrap_err();
    assert!(err.to_string().contains("Cancelled"));
}
