//! reporting 阶段工具
//!
//! 结果合理性检查、表格化呈现、解释校验，以及 FinalizeReport 最终答案载荷
//! （置信度必须落在 [0, 1]，否则执行前拒绝）。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::tools::{names, opt_string_arg, string_arg, Tool};

/// FinalizeReport 的载荷：SQL、叙述、置信度与结果预览
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeReportPayload {
    pub sql: String,
    pub narrative: String,
    pub confidence: f64,
    #[serde(default)]
    pub preview: Vec<Value>,
}

/// 结果合理性检查：空结果、异常大的行数、非只读语句
pub struct SanityCheckTool;

#[async_trait]
impl Tool for SanityCheckTool {
    fn name(&self) -> &str {
        names::SANITY_CHECK
    }

    fn description(&self) -> &str {
        "Sanity-check an execution result before reporting (empty result, oversized result, non-read-only SQL)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string" },
                "row_count": { "type": "integer" }
            },
            "required": ["sql", "row_count"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let sql = string_arg(&args, "sql")?;
        let row_count = args
            .get("row_count")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| AgentError::ToolInput("row_count must be a non-negative integer".to_string()))?;

        let mut warnings = Vec::new();
        if row_count == 0 {
            warnings.push("query returned zero rows; the answer may be 'no data'".to_string());
        }
        if row_count > 10_000 {
            warnings.push(format!(
                "query returned {} rows; consider aggregating before reporting",
                row_count
            ));
        }
        if !crate::tools::building::is_read_only(&sql) {
            warnings.push("statement is not a read-only SELECT/WITH".to_string());
        }
        Ok(json!({ "ok": warnings.is_empty(), "warnings": warnings }))
    }
}

/// 把行集渲染成 markdown 表格或 CSV
pub struct FormatResultsTool;

fn cell_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn column_names(rows: &[Value], explicit: Option<Vec<String>>) -> Vec<String> {
    if let Some(cols) = explicit {
        return cols;
    }
    rows.first()
        .and_then(|r| r.as_object())
        .map(|o| o.keys().cloned().collect())
        .unwrap_or_default()
}

fn to_markdown(rows: &[Value], columns: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("| {} |\n", columns.join(" | ")));
    out.push_str(&format!(
        "|{}|\n",
        columns.iter().map(|_| " --- ").collect::<Vec<_>>().join("|")
    ));
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| cell_text(row.get(c).unwrap_or(&Value::Null)))
            .collect();
        out.push_str(&format!("| {} |\n", cells.join(" | ")));
    }
    out
}

fn to_csv(rows: &[Value], columns: &[String]) -> String {
    fn escape(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
    let mut out = String::new();
    out.push_str(&columns.iter().map(|c| escape(c)).collect::<Vec<_>>().join(","));
    out.push('\n');
    for row in rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| escape(&cell_text(row.get(c).unwrap_or(&Value::Null))))
            .collect();
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

#[async_trait]
impl Tool for FormatResultsTool {
    fn name(&self) -> &str {
        names::FORMAT_RESULTS
    }

    fn description(&self) -> &str {
        "Render a row set as a markdown table (default) or CSV."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "rows": { "type": "array", "items": { "type": "object" } },
                "columns": { "type": "array", "items": { "type": "string" } },
                "format": { "type": "string", "enum": ["markdown", "csv"] }
            },
            "required": ["rows"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let rows = args
            .get("rows")
            .and_then(|v| v.as_array())
            .cloned()
            .ok_or_else(|| AgentError::ToolInput("rows must be an array".to_string()))?;
        let explicit = args.get("columns").and_then(|v| v.as_array()).map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect::<Vec<_>>()
        });
        let format = opt_string_arg(&args, "format").unwrap_or_else(|| "markdown".to_string());

        let columns = column_names(&rows, explicit);
        if columns.is_empty() {
            return Ok(json!({ "format": format, "text": "", "row_count": 0 }));
        }
        let text = match format.as_str() {
            "markdown" => to_markdown(&rows, &columns),
            "csv" => to_csv(&rows, &columns),
            other => {
                return Err(AgentError::ToolInput(format!(
                    "unsupported format: {}",
                    other
                )))
            }
        };
        Ok(json!({ "format": format, "text": text, "row_count": rows.len() }))
    }
}

/// 粗粒度 SQL 文本探测：解释性文字里不应混入裸 SQL
pub(crate) fn has_sql_text(text: &str) -> bool {
    let upper = text.to_uppercase();
    ["SELECT ", "INSERT ", "UPDATE ", "DELETE ", "CREATE ", "DROP ", "ALTER "]
        .iter()
        .any(|kw| upper.contains(kw))
        && upper.contains(" FROM ")
        || upper.trim_start().starts_with("SELECT")
}

/// 校验并回显对结果的解释文字
pub struct ExplainResultsTool;

#[async_trait]
impl Tool for ExplainResultsTool {
    fn name(&self) -> &str {
        names::EXPLAIN_RESULTS
    }

    fn description(&self) -> &str {
        "Record a prose explanation of what the results mean."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "explanation": { "type": "string" }
            },
            "required": ["explanation"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let explanation = string_arg(&args, "explanation")?;
        if explanation.trim().is_empty() {
            return Err(AgentError::ToolInput(
                "explanation must not be empty".to_string(),
            ));
        }
        if has_sql_text(&explanation) {
            return Err(AgentError::ToolInput(
                "explanation should be prose, not SQL".to_string(),
            ));
        }
        Ok(json!({ "explanation": explanation }))
    }
}

/// 最终报告；其出现终止运行
pub struct FinalizeReportTool;

#[async_trait]
impl Tool for FinalizeReportTool {
    fn name(&self) -> &str {
        names::FINALIZE_REPORT
    }

    fn description(&self) -> &str {
        "Emit the final answer: the SQL used, a narrative, a confidence in [0, 1], and a result preview. Terminates the run."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "sql": { "type": "string" },
                "narrative": { "type": "string" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 1 },
                "preview": { "type": "array" }
            },
            "required": ["sql", "narrative", "confidence"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let payload: FinalizeReportPayload = serde_json::from_value(args)
            .map_err(|e| AgentError::ToolInput(format!("invalid report payload: {}", e)))?;
        if payload.sql.trim().is_empty() {
            return Err(AgentError::ToolInput("sql must not be empty".to_string()));
        }
        if payload.narrative.trim().is_empty() {
            return Err(AgentError::ToolInput(
                "narrative must not be empty".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&payload.confidence) {
            return Err(AgentError::ToolInput(format!(
                "confidence must be within [0, 1], got {}",
                payload.confidence
            )));
        }
        serde_json::to_value(payload)
            .map_err(|e| AgentError::Execution(format!("serialize report: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sanity_check_warns_on_empty_result() {
        let out = SanityCheckTool
            .execute(json!({ "sql": "SELECT 1", "row_count": 0 }))
            .await
            .unwrap();
        assert_eq!(out["ok"], false);
        assert!(out["warnings"][0]
            .as_str()
            .unwrap()
            .contains("zero rows"));
    }

    #[tokio::test]
    async fn test_format_results_markdown() {
        let out = FormatResultsTool
            .execute(json!({
                "rows": [
                    { "name": "Acme", "revenue": 10 },
                    { "name": "Globex", "revenue": 20 }
                ],
                "columns": ["name", "revenue"]
            }))
            .await
            .unwrap();
        let text = out["text"].as_str().unwrap();
        assert!(text.starts_with("| name | revenue |"));
        assert!(text.contains("| Acme | 10 |"));
        assert_eq!(out["row_count"], 2);
    }

    #[tokio::test]
    async fn test_format_results_csv_escapes_commas() {
        let out = FormatResultsTool
            .execute(json!({
                "rows": [{ "name": "Acme, Inc.", "n": 1 }],
                "columns": ["name", "n"],
                "format": "csv"
            }))
            .await
            .unwrap();
        let text = out["text"].as_str().unwrap();
        assert!(text.contains("\"Acme, Inc.\",1"));
    }

    #[tokio::test]
    async fn test_explain_results_rejects_raw_sql() {
        let err = ExplainResultsTool
            .execute(json!({ "explanation": "SELECT industry FROM companies" }))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolInput(_)));

        let ok = ExplainResultsTool
            .execute(json!({ "explanation": "Software firms dominate the sample." }))
            .await
            .unwrap();
        assert_eq!(ok["explanation"], "Software firms dominate the sample.");
    }

    #[tokio::test]
    async fn test_finalize_report_rejects_out_of_range_confidence() {
        let err = FinalizeReportTool
            .execute(json!({
                "sql": "SELECT 1",
                "narrative": "one row",
                "confidence": 1.2
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::ToolInput(_)));
    }

    #[tokio::test]
    async fn test_finalize_report_defaults_empty_preview() {
        let out = FinalizeReportTool
            .execute(json!({
                "sql": "SELECT 1",
                "narrative": "one row",
                "confidence": 0.9
            }))
            .await
            .unwrap();
        assert_eq!(out["preview"], json!([]));
        let payload: FinalizeReportPayload = serde_json::from_value(out).unwrap();
        assert_eq!(payload.confidence, 0.9);
    }
}
