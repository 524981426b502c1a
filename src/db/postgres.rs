//! PostgreSQL 执行器（sqlx）
//!
//! 每次执行从池中 acquire 一个连接，作用域结束自动归还（所有退出路径一致）。
//! 行值按列类型解码为 JSON；EXPLAIN (FORMAT JSON) 提取 Plan Rows / Total Cost。

use std::time::Instant;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row, TypeInfo};

use crate::db::{
    ColumnInfo, DatabaseExecutor, DbError, ForeignKey, PlanEstimate, QueryResult, SchemaColumn,
    TableSchema,
};

/// PostgreSQL 执行器：持有连接池
pub struct PostgresExecutor {
    pool: PgPool,
}

impl PostgresExecutor {
    /// 按连接串建池
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, DbError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;
        tracing::info!(max_connections, "postgres pool created");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// 单个单元格按列类型解码为 JSON 值；未知类型回退为字符串，再失败为 null
fn decode_cell(row: &PgRow, idx: usize, type_name: &str) -> serde_json::Value {
    use serde_json::Value;

    fn num_f64(v: f64) -> serde_json::Value {
        serde_json::Number::from_f64(v)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }

    match type_name {
        "BOOL" => row
            .try_get::<Option<bool>, _>(idx)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "INT2" => row
            .try_get::<Option<i16>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(v as i64))
            .unwrap_or(Value::Null),
        "INT4" => row
            .try_get::<Option<i32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| Value::from(v as i64))
            .unwrap_or(Value::Null),
        "INT8" => row
            .try_get::<Option<i64>, _>(idx)
            .ok()
            .flatten()
            .map(Value::from)
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(idx)
            .ok()
            .flatten()
            .map(|v| num_f64(v as f64))
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(idx)
            .ok()
            .flatten()
            .map(num_f64)
            .unwrap_or(Value::Null),
        "NUMERIC" => row
            .try_get::<Option<rust_decimal::Decimal>, _>(idx)
            .ok()
            .flatten()
            .map(|d| {
                let s = d.to_string();
                s.parse::<f64>().map(num_f64).unwrap_or(Value::String(s))
            })
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row
            .try_get::<Option<serde_json::Value>, _>(idx)
            .ok()
            .flatten()
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(idx)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(idx)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_rfc3339()))
            .unwrap_or(Value::Null),
        _ => row
            .try_get::<Option<String>, _>(idx)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
    }
}

fn row_to_json(row: &PgRow) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    for (idx, col) in row.columns().iter().enumerate() {
        obj.insert(
            col.name().to_string(),
            decode_cell(row, idx, col.type_info().name()),
        );
    }
    serde_json::Value::Object(obj)
}

/// 从 EXPLAIN (FORMAT JSON) 的计划 JSON 提取估计值
pub(crate) fn extract_plan_estimate(plan_json: &serde_json::Value) -> PlanEstimate {
    let root = plan_json
        .as_array()
        .and_then(|a| a.first())
        .unwrap_or(plan_json);
    let plan = root.get("Plan").unwrap_or(root);
    PlanEstimate {
        estimated_rows: plan.get("Plan Rows").and_then(|v| v.as_u64()),
        total_cost: plan.get("Total Cost").and_then(|v| v.as_f64()),
    }
}

#[async_trait]
impl DatabaseExecutor for PostgresExecutor {
    async fn execute(&self, sql: &str) -> Result<QueryResult, DbError> {
        let start = Instant::now();
        let preview: String = sql.chars().take(100).collect();
        tracing::info!(sql = %preview, "executing query");

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let rows = sqlx::query(sql)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| match e {
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                    DbError::Connection(e.to_string())
                }
                other => DbError::Query(other.to_string()),
            })?;
        let execution_time_ms = start.elapsed().as_millis() as u64;

        let columns: Vec<ColumnInfo> = rows
            .first()
            .map(|r| {
                r.columns()
                    .iter()
                    .map(|c| ColumnInfo {
                        name: c.name().to_string(),
                        type_name: c.type_info().name().to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default();
        let json_rows: Vec<serde_json::Value> = rows.iter().map(row_to_json).collect();
        let row_count = json_rows.len();

        tracing::info!(row_count, execution_time_ms, "query completed");
        Ok(QueryResult {
            rows: json_rows,
            columns,
            row_count,
            execution_time_ms,
        })
    }

    async fn explain(&self, sql: &str) -> Result<PlanEstimate, DbError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let row = sqlx::query(&format!("EXPLAIN (FORMAT JSON) {}", sql))
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| DbError::Query(e.to_string()))?;
        let plan: serde_json::Value = row
            .try_get(0)
            .map_err(|e| DbError::Query(e.to_string()))?;
        Ok(extract_plan_estimate(&plan))
    }

    async fn schema(&self) -> Result<Vec<TableSchema>, DbError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))?;

        let tables = sqlx::query(
            "SELECT table_schema, table_name
             FROM information_schema.tables
             WHERE table_schema NOT IN ('pg_catalog', 'information_schema')
             ORDER BY table_schema, table_name",
        )
        .fetch_all(&mut *conn)
        .await
        .map_err(|e| DbError::Query(e.to_string()))?;

        let mut out = Vec::with_capacity(tables.len());
        for t in &tables {
            let table_schema: String = t.try_get("table_schema").map_err(|e| DbError::Query(e.to_string()))?;
            let table_name: String = t.try_get("table_name").map_err(|e| DbError::Query(e.to_string()))?;

            let columns = sqlx::query(
                "SELECT column_name, data_type, is_nullable
                 FROM information_schema.columns
                 WHERE table_schema = $1 AND table_name = $2
                 ORDER BY ordinal_position",
            )
            .bind(&table_schema)
            .bind(&table_name)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| DbError::Query(e.to_string()))?
            .iter()
            .map(|c| {
                Ok(SchemaColumn {
                    name: c.try_get("column_name").map_err(|e: sqlx::Error| DbError::Query(e.to_string()))?,
                    data_type: c.try_get("data_type").map_err(|e: sqlx::Error| DbError::Query(e.to_string()))?,
                    is_nullable: c
                        .try_get::<String, _>("is_nullable")
                        .map(|v| v == "YES")
                        .map_err(|e: sqlx::Error| DbError::Query(e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

            let foreign_keys = sqlx::query(
                "SELECT kcu.column_name AS \"column\",
                        ccu.table_schema AS references_schema,
                        ccu.table_name AS references_table,
                        ccu.column_name AS references_column
                 FROM information_schema.table_constraints tc
                 JOIN information_schema.key_column_usage kcu
                   ON tc.constraint_name = kcu.constraint_name
                  AND tc.table_schema = kcu.table_schema
                 JOIN information_schema.constraint_column_usage ccu
                   ON ccu.constraint_name = tc.constraint_name
                  AND ccu.table_schema = tc.table_schema
                 WHERE tc.constraint_type = 'FOREIGN KEY'
                   AND tc.table_schema = $1
                   AND tc.table_name = $2",
            )
            .bind(&table_schema)
            .bind(&table_name)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| DbError::Query(e.to_string()))?
            .iter()
            .map(|fk| {
                let ref_schema: String = fk
                    .try_get("references_schema")
                    .map_err(|e: sqlx::Error| DbError::Query(e.to_string()))?;
                let ref_table: String = fk
                    .try_get("references_table")
                    .map_err(|e: sqlx::Error| DbError::Query(e.to_string()))?;
                // 跨 schema 引用时带上 schema 前缀
                let references_table = if ref_schema == table_schema {
                    ref_table
                } else {
                    format!("{}.{}", ref_schema, ref_table)
                };
                Ok(ForeignKey {
                    column: fk
                        .try_get("column")
                        .map_err(|e: sqlx::Error| DbError::Query(e.to_string()))?,
                    references_table,
                    references_column: fk
                        .try_get("references_column")
                        .map_err(|e: sqlx::Error| DbError::Query(e.to_string()))?,
                })
            })
            .collect::<Result<Vec<_>, DbError>>()?;

            out.push(TableSchema {
                schema: table_schema,
                table: table_name,
                columns,
                foreign_keys,
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_plan_estimate_from_explain_json() {
        let plan = serde_json::json!([
            {
                "Plan": {
                    "Node Type": "Seq Scan",
                    "Plan Rows": 1234,
                    "Total Cost": 35.50
                }
            }
        ]);
        let est = extract_plan_estimate(&plan);
        assert_eq!(est.estimated_rows, Some(1234));
        assert_eq!(est.total_cost, Some(35.50));
    }

    #[test]
    fn test_extract_plan_estimate_missing_fields() {
        let est = extract_plan_estimate(&serde_json::json!({}));
        assert_eq!(est.estimated_rows, None);
        assert_eq!(est.total_cost, None);
    }
}
