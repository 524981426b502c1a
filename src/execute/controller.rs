//! 带修复的执行控制器
//!
//! 把「模型写 SQL、数据库可能拒绝」变成有界、确定的重试协议：
//! 缓存命中直接短路；未命中则执行，失败进入至多两轮的修复循环
//! （修复 -> 执行 -> 修复 -> 执行，显式有界循环，决不递归）。
//! 任一次成功都以「原始请求的 SQL」为键写缓存，使相同的原始请求下次直接命中。

use std::sync::Arc;

use serde::Serialize;

use crate::core::{AgentError, FinalizedPlan};
use crate::db::{DatabaseExecutor, DbError, QueryResult};
use crate::execute::{RepairEngine, ResultCache};
use crate::semantic::EntityCatalog;

/// 修复轮数上限（硬顶：原始执行 + 至多两次修复执行）
pub const MAX_REPAIR_ROUNDS: usize = 2;

/// 控制器输出：成功结果（附执行元信息）或结构化失败
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ExecutionOutcome {
    Success {
        #[serde(flatten)]
        result: QueryResult,
        attempted_sql: String,
        repaired: bool,
        repair_reason: Option<String>,
        from_cache: bool,
    },
    Failure {
        ok: bool,
        error: String,
        attempted_sql: String,
        repaired: bool,
        repair_reason: Option<String>,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    pub fn from_cache(&self) -> bool {
        matches!(
            self,
            ExecutionOutcome::Success {
                from_cache: true,
                ..
            }
        )
    }
}

/// 带修复的执行控制器：数据库、缓存、修复引擎与实体目录的聚合
pub struct ExecutionController {
    db: Arc<dyn DatabaseExecutor>,
    cache: Arc<ResultCache>,
    repair: Arc<dyn RepairEngine>,
    catalog: Arc<dyn EntityCatalog>,
}

impl ExecutionController {
    pub fn new(
        db: Arc<dyn DatabaseExecutor>,
        cache: Arc<ResultCache>,
        repair: Arc<dyn RepairEngine>,
        catalog: Arc<dyn EntityCatalog>,
    ) -> Self {
        Self {
            db,
            cache,
            repair,
            catalog,
        }
    }

    /// 执行一次；查询被拒绝返回 Ok(Err(message)) 进入修复协议，
    /// 连接类故障作为 Transport 错误直接穿出
    async fn try_exec(&self, sql: &str) -> Result<Result<QueryResult, String>, AgentError> {
        match self.db.execute(sql).await {
            Ok(res) => Ok(Ok(res)),
            Err(DbError::Query(msg)) => Ok(Err(msg)),
            Err(DbError::Connection(msg)) => Err(AgentError::Transport(msg)),
        }
    }

    /// 执行 + 有界修复。结果（含修复后的结果）一律以原始 `sql` 为缓存键。
    pub async fn execute_with_repair(
        &self,
        sql: &str,
        plan: &FinalizedPlan,
    ) -> Result<ExecutionOutcome, AgentError> {
        // 缓存短路：纯捷径，不影响修复协议
        if let Some(entry) = self.cache.get(sql) {
            tracing::info!("cache hit for query");
            let row_count = entry.rows.len();
            return Ok(ExecutionOutcome::Success {
                result: QueryResult {
                    rows: entry.rows,
                    columns: entry.columns,
                    row_count,
                    execution_time_ms: 0,
                },
                attempted_sql: sql.to_string(),
                repaired: false,
                repair_reason: None,
                from_cache: true,
            });
        }

        let mut current_err = match self.try_exec(sql).await? {
            Ok(result) => {
                self.cache
                    .put(sql, result.rows.clone(), result.columns.clone());
                return Ok(ExecutionOutcome::Success {
                    result,
                    attempted_sql: sql.to_string(),
                    repaired: false,
                    repair_reason: None,
                    from_cache: false,
                });
            }
            Err(msg) => msg,
        };
        tracing::warn!(error = %current_err, "query failed, entering repair protocol");

        let mut current_sql = sql.to_string();
        let mut repaired = false;
        let mut last_reason: Option<String> = None;

        // 修复协议：显式有界循环，至多两轮
        for round in 1..=MAX_REPAIR_ROUNDS {
            let proposal = self
                .repair
                .propose(&current_sql, plan, self.catalog.as_ref(), &current_err)
                .await;
            let Some(attempt) = proposal else {
                tracing::warn!(round, "repair engine declined");
                return Ok(ExecutionOutcome::Failure {
                    ok: false,
                    error: current_err,
                    attempted_sql: current_sql,
                    repaired,
                    repair_reason: last_reason,
                });
            };

            tracing::info!(round, reason = %attempt.reason, "repair proposed");
            repaired = true;
            last_reason = Some(attempt.reason);
            current_sql = attempt.fixed_sql;

            match self.try_exec(&current_sql).await? {
                Ok(result) => {
                    // 以原始请求的 SQL 为键缓存修复后的结果
                    self.cache
                        .put(sql, result.rows.clone(), result.columns.clone());
                    return Ok(ExecutionOutcome::Success {
                        result,
                        attempted_sql: current_sql,
                        repaired: true,
                        repair_reason: last_reason,
                        from_cache: false,
                    });
                }
                Err(msg) => current_err = msg,
            }
        }

        let exhausted = AgentError::RepairExhausted(current_err.clone());
        tracing::warn!(error = %exhausted, "repair rounds exhausted");
        Ok(ExecutionOutcome::Failure {
            ok: false,
            error: current_err,
            attempted_sql: current_sql,
            repaired: true,
            repair_reason: last_reason,
        })
    }
}
