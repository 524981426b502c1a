//! 数据库层：执行器抽象与 PostgreSQL 实现

pub mod postgres;
pub mod traits;

pub use postgres::PostgresExecutor;
pub use traits::{
    ColumnInfo, DatabaseExecutor, DbError, ForeignKey, PlanEstimate, QueryResult, SchemaColumn,
    TableSchema,
};
