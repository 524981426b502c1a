//! 数据库执行器抽象
//!
//! 核心只依赖此 trait：execute 返回行/列/计数/耗时，失败时携带可供修复引擎解析的
//! 错误信息；explain / schema 分别支撑成本估计与 schema 检索。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 数据库层错误：查询被拒绝（可修复类）与连接/池故障（Transport 类）分开
#[derive(Error, Debug)]
pub enum DbError {
    /// 数据库拒绝该查询（语法、缺列、歧义列、权限）；message 供修复引擎解析
    #[error("{0}")]
    Query(String),

    /// 连接或池不可用；不进入修复协议，作为 Transport 错误上抛
    #[error("Connection error: {0}")]
    Connection(String),
}

/// 结果列信息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// 一次查询的完整结果；产出后不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub rows: Vec<serde_json::Value>,
    pub columns: Vec<ColumnInfo>,
    pub row_count: usize,
    pub execution_time_ms: u64,
}

/// EXPLAIN 提取出的计划估计
#[derive(Debug, Clone, Default, Serialize)]
pub struct PlanEstimate {
    pub estimated_rows: Option<u64>,
    pub total_cost: Option<f64>,
}

/// information_schema 中的一列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaColumn {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
}

/// 外键：本表列 -> 引用表.列
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    pub references_column: String,
}

/// 一张表的结构（含外键，供 SearchSchema 与 JoinPathFinder 使用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub schema: String,
    pub table: String,
    pub columns: Vec<SchemaColumn>,
    pub foreign_keys: Vec<ForeignKey>,
}

/// 关系数据库执行器 trait：每次执行独立获取并释放连接，不跨轮持有资源
#[async_trait]
pub trait DatabaseExecutor: Send + Sync {
    /// 执行只读 SQL，返回行与列
    async fn execute(&self, sql: &str) -> Result<QueryResult, DbError>;

    /// EXPLAIN (FORMAT JSON)，返回计划估计；供成本估计器使用
    async fn explain(&self, sql: &str) -> Result<PlanEstimate, DbError>;

    /// 读取用户表结构（表、列、外键）
    async fn schema(&self) -> Result<Vec<TableSchema>, DbError>;

    /// 连通性检查（SELECT 1）
    async fn test_connection(&self) -> bool {
        self.execute("SELECT 1 AS test").await.is_ok()
    }
}
