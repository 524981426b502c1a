//! execution 阶段工具
//!
//! 成本估计（EXPLAIN 退化占位，绝不失败）、直连执行与带修复的执行入口。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{AgentError, FinalizedPlan};
use crate::db::{DatabaseExecutor, DbError};
use crate::execute::{estimate_cost, ExecutionController};
use crate::tools::{names, string_arg, Tool};

/// 估计查询成本（EXPLAIN 提取；不可用时退化为占位估计）
pub struct EstimateCostTool {
    pub db: Arc<dyn DatabaseExecutor>,
}

#[async_trait]
impl Tool for EstimateCostTool {
    fn name(&self) -> &str {
        names::ESTIMATE_COST
    }

    fn description(&self) -> &str {
        "Estimate the cost of a SQL statement before running it. Never fails."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string" }
            },
            "required": ["sql"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let sql = string_arg(&args, "sql")?;
        let estimate = estimate_cost(self.db.as_ref(), &sql).await;
        serde_json::to_value(estimate)
            .map_err(|e| AgentError::Execution(format!("serialize estimate: {}", e)))
    }
}

/// 直连执行（无修复协议）；查询被拒绝即为执行错误
pub struct ExecuteSQLTool {
    pub db: Arc<dyn DatabaseExecutor>,
}

#[async_trait]
impl Tool for ExecuteSQLTool {
    fn name(&self) -> &str {
        names::EXECUTE_SQL
    }

    fn description(&self) -> &str {
        "Execute a read-only SQL statement directly, without the repair protocol."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string" }
            },
            "required": ["sql"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let sql = string_arg(&args, "sql")?;
        match self.db.execute(&sql).await {
            Ok(result) => serde_json::to_value(result)
                .map_err(|e| AgentError::Execution(format!("serialize result: {}", e))),
            Err(DbError::Query(msg)) => Err(AgentError::Execution(msg)),
            Err(DbError::Connection(msg)) => Err(AgentError::Transport(msg)),
        }
    }
}

/// 带修复的执行入口；其出现触发 execution -> reporting
pub struct ExecuteSQLWithRepairTool {
    pub controller: Arc<ExecutionController>,
}

#[async_trait]
impl Tool for ExecuteSQLWithRepairTool {
    fn name(&self) -> &str {
        names::EXECUTE_SQL_WITH_REPAIR
    }

    fn description(&self) -> &str {
        "Execute the finalized SQL with cached results and up to two automatic repair rounds."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string" },
                "plan": { "description": "The finalized plan payload from FinalizePlan" }
            },
            "required": ["sql"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let sql = string_arg(&args, "sql")?;
        let plan = FinalizedPlan(args.get("plan").cloned().unwrap_or(Value::Null));
        let outcome = self.controller.execute_with_repair(&sql, &plan).await?;
        serde_json::to_value(outcome)
            .map_err(|e| AgentError::Execution(format!("serialize outcome: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{ColumnInfo, PlanEstimate, QueryResult, TableSchema};

    struct OneRowDb;

    #[async_trait]
    impl DatabaseExecutor for OneRowDb {
        async fn execute(&self, sql: &str) -> Result<QueryResult, DbError> {
            if sql.contains("bad") {
                return Err(DbError::Query("syntax error".to_string()));
            }
            Ok(QueryResult {
                rows: vec![json!({ "n": 1 })],
                columns: vec![ColumnInfo {
                    name: "n".to_string(),
                    type_name: "INT4".to_string(),
                }],
                row_count: 1,
                execution_time_ms: 2,
            })
        }

        async fn explain(&self, _sql: &str) -> Result<PlanEstimate, DbError> {
            Ok(PlanEstimate {
                estimated_rows: Some(1),
                total_cost: Some(0.5),
            })
        }

        async fn schema(&self) -> Result<Vec<TableSchema>, DbError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_execute_sql_returns_rows() {
        let tool = ExecuteSQLTool {
            db: Arc::new(OneRowDb),
        };
        let out = tool.execute(json!({ "sql": "SELECT 1" })).await.unwrap();
        assert_eq!(out["row_count"], 1);
        assert_eq!(out["rows"][0]["n"], 1);
    }

    #[tokio::test]
    async fn test_execute_sql_query_rejection_is_execution_error() {
        let tool = ExecuteSQLTool {
            db: Arc::new(OneRowDb),
        };
        let err = tool.execute(json!({ "sql": "bad" })).await.unwrap_err();
        assert!(matches!(err, AgentError::Execution(_)));
    }

    #[tokio::test]
    async fn test_estimate_cost_tool_reports_explain_estimate() {
        let tool = EstimateCostTool {
            db: Arc::new(OneRowDb),
        };
        let out = tool.execute(json!({ "sql": "SELECT 1" })).await.unwrap();
        assert_eq!(out["estimated_rows"], 1);
        assert_eq!(out["cost"], "0.50");
    }
}
