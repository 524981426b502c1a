//! building 阶段工具
//!
//! 外键图上的连接路径搜索（BFS）、SQL 规整、静态校验与 FinalizeBuild 阶段终结。

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::db::{DatabaseExecutor, TableSchema};
use crate::tools::{names, string_arg, Tool};

/// 在外键图上用 BFS 找出两张表之间的最短连接路径
pub struct JoinPathFinderTool {
    pub db: Arc<dyn DatabaseExecutor>,
}

/// 外键图中的一条边：无向（两侧都可以作为连接起点）
#[derive(Debug, Clone)]
struct JoinEdge {
    from_table: String,
    from_column: String,
    to_table: String,
    to_column: String,
}

fn fk_graph(tables: &[TableSchema]) -> HashMap<String, Vec<JoinEdge>> {
    let mut graph: HashMap<String, Vec<JoinEdge>> = HashMap::new();
    for t in tables {
        for fk in &t.foreign_keys {
            let edge = JoinEdge {
                from_table: t.table.clone(),
                from_column: fk.column.clone(),
                to_table: fk.references_table.clone(),
                to_column: fk.references_column.clone(),
            };
            let back = JoinEdge {
                from_table: edge.to_table.clone(),
                from_column: edge.to_column.clone(),
                to_table: edge.from_table.clone(),
                to_column: edge.from_column.clone(),
            };
            graph.entry(edge.from_table.clone()).or_default().push(edge);
            graph.entry(back.from_table.clone()).or_default().push(back);
        }
    }
    graph
}

fn shortest_join_path(
    graph: &HashMap<String, Vec<JoinEdge>>,
    from: &str,
    to: &str,
) -> Option<Vec<JoinEdge>> {
    if from == to {
        return Some(Vec::new());
    }
    let mut visited: HashSet<String> = HashSet::new();
    visited.insert(from.to_string());
    let mut queue: VecDeque<(String, Vec<JoinEdge>)> = VecDeque::new();
    queue.push_back((from.to_string(), Vec::new()));

    while let Some((table, path)) = queue.pop_front() {
        let Some(edges) = graph.get(&table) else {
            continue;
        };
        for edge in edges {
            if !visited.insert(edge.to_table.clone()) {
                continue;
            }
            let mut next = path.clone();
            next.push(edge.clone());
            if edge.to_table == to {
                return Some(next);
            }
            queue.push_back((edge.to_table.clone(), next));
        }
    }
    None
}

#[async_trait]
impl Tool for JoinPathFinderTool {
    fn name(&self) -> &str {
        names::JOIN_PATH_FINDER
    }

    fn description(&self) -> &str {
        "Find the shortest JOIN path between two tables over the foreign-key graph."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "from": { "type": "string", "description": "Starting table" },
                "to": { "type": "string", "description": "Target table" }
            },
            "required": ["from", "to"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let from = string_arg(&args, "from")?;
        let to = string_arg(&args, "to")?;
        let tables = match self.db.schema().await {
            Ok(t) => t,
            Err(e) => return Ok(json!({ "ok": false, "error": e.to_string() })),
        };
        let graph = fk_graph(&tables);
        match shortest_join_path(&graph, &from, &to) {
            Some(path) => {
                let joins: Vec<Value> = path
                    .iter()
                    .map(|e| {
                        json!({
                            "from": format!("{}.{}", e.from_table, e.from_column),
                            "to": format!("{}.{}", e.to_table, e.to_column),
                            "condition": format!(
                                "{}.{} = {}.{}",
                                e.from_table, e.from_column, e.to_table, e.to_column
                            ),
                        })
                    })
                    .collect();
                Ok(json!({ "found": true, "hops": joins.len(), "joins": joins }))
            }
            None => Ok(json!({
                "found": false,
                "error": format!("no foreign-key path between {} and {}", from, to),
            })),
        }
    }
}

/// 规整 SQL：去首尾空白、去掉尾部分号；拒绝多语句
pub struct BuildSQLTool;

pub(crate) fn normalize_sql(sql: &str) -> Result<String, String> {
    let trimmed = sql.trim().trim_end_matches(';').trim_end();
    if trimmed.is_empty() {
        return Err("SQL must not be empty".to_string());
    }
    if trimmed.contains(';') {
        return Err("only a single SQL statement is allowed".to_string());
    }
    Ok(trimmed.to_string())
}

#[async_trait]
impl Tool for BuildSQLTool {
    fn name(&self) -> &str {
        names::BUILD_SQL
    }

    fn description(&self) -> &str {
        "Normalize a drafted SQL statement (trim, strip trailing semicolon, single statement only)."
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
        match normalize_sql(&sql) {
            Ok(normalized) => Ok(json!({ "sql": normalized })),
            Err(e) => Err(AgentError::ToolInput(e)),
        }
    }
}

/// 静态校验 + EXPLAIN 干跑
pub struct ValidateSQLTool {
    pub db: Arc<dyn DatabaseExecutor>,
}

pub(crate) fn is_read_only(sql: &str) -> bool {
    let upper = sql.trim_start().to_uppercase();
    upper.starts_with("SELECT") || upper.starts_with("WITH")
}

fn static_issues(sql: &str) -> Vec<String> {
    let mut issues = Vec::new();
    if sql.trim().is_empty() {
        issues.push("SQL is empty".to_string());
        return issues;
    }
    if sql.trim().trim_end_matches(';').contains(';') {
        issues.push("multiple statements are not allowed".to_string());
    }
    if !is_read_only(sql) {
        issues.push("only read-only SELECT/WITH statements are allowed".to_string());
    }
    let mut depth: i64 = 0;
    let mut in_string = false;
    for ch in sql.chars() {
        match ch {
            '\'' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth -= 1,
            _ => {}
        }
        if depth < 0 {
            break;
        }
    }
    if depth != 0 {
        issues.push("unbalanced parentheses".to_string());
    }
    if in_string {
        issues.push("unterminated string literal".to_string());
    }
    issues
}

#[async_trait]
impl Tool for ValidateSQLTool {
    fn name(&self) -> &str {
        names::VALIDATE_SQL
    }

    fn description(&self) -> &str {
        "Validate a SQL statement: static checks plus an EXPLAIN dry run against the database."
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
        let mut issues = static_issues(&sql);
        if issues.is_empty() {
            if let Err(e) = self.db.explain(&sql).await {
                issues.push(format!("EXPLAIN rejected the statement: {}", e));
            }
        }
        Ok(json!({ "valid": issues.is_empty(), "issues": issues }))
    }
}

/// 最终化构建结果；其出现触发 building -> execution
pub struct FinalizeBuildTool;

#[async_trait]
impl Tool for FinalizeBuildTool {
    fn name(&self) -> &str {
        names::FINALIZE_BUILD
    }

    fn description(&self) -> &str {
        "Finalize the built SQL statement and advance to execution."
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
        if sql.trim().is_empty() {
            return Err(AgentError::ToolInput("sql must not be empty".to_string()));
        }
        Ok(json!({ "sql": sql }))
    }
}
