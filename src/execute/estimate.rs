//! 查询成本估计
//!
//! 执行前的廉价合理性信号：走数据库 EXPLAIN (FORMAT JSON) 提取估计行数与总成本；
//! 计划估计失败时退化为占位值，绝不向上抛错（不能因估不出成本中止运行）。

use serde::Serialize;

use crate::db::DatabaseExecutor;

/// 成本估计结果
#[derive(Debug, Clone, Serialize)]
pub struct CostEstimate {
    pub score: u32,
    pub estimated_rows: Option<u64>,
    pub cost: String,
    pub notes: Vec<String>,
}

/// EXPLAIN 可用时的评分
const SCORE_EXPLAIN: u32 = 25;
/// 占位评分（无计划信息）
const SCORE_PLACEHOLDER: u32 = 50;

/// 估计查询成本；任何失败都退化为占位值
pub async fn estimate_cost(db: &dyn DatabaseExecutor, sql: &str) -> CostEstimate {
    match db.explain(sql).await {
        Ok(plan) => CostEstimate {
            score: SCORE_EXPLAIN,
            estimated_rows: plan.estimated_rows,
            cost: plan
                .total_cost
                .map(|c| format!("{:.2}", c))
                .unwrap_or_else(|| "unknown".to_string()),
            notes: vec!["PostgreSQL EXPLAIN estimate".to_string()],
        },
        Err(e) => {
            tracing::warn!(error = %e, "cost estimation failed, using placeholder");
            CostEstimate {
                score: SCORE_PLACEHOLDER,
                estimated_rows: None,
                cost: "unknown".to_string(),
                notes: vec![format!("EXPLAIN unavailable, placeholder estimate: {}", e)],
            }
        }
    }
}
