//! planning 阶段工具
//!
//! 实体发现与检视（目录读取、属性扫描、覆盖评估、目录/库内 schema 检索）、
//! 澄清意图逃生口，以及 FinalizePlan / FinalizeNoData 两个阶段终结工具。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::db::DatabaseExecutor;
use crate::semantic::EntityCatalog;
use crate::tools::{names, opt_string_arg, string_arg, string_list_arg, Tool};

/// 读取实体 YAML 原文
pub struct ReadEntityYamlRawTool {
    pub catalog: Arc<dyn EntityCatalog>,
}

#[async_trait]
impl Tool for ReadEntityYamlRawTool {
    fn name(&self) -> &str {
        names::READ_ENTITY_YAML_RAW
    }

    fn description(&self) -> &str {
        "Read the raw YAML definition of a semantic entity."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity": { "type": "string", "description": "Entity name" }
            },
            "required": ["entity"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let entity = string_arg(&args, "entity")?;
        match self.catalog.read_raw(&entity).await {
            Ok(yaml) => Ok(json!({ "entity": entity, "yaml": yaml })),
            Err(e) => Ok(json!({ "ok": false, "error": e })),
        }
    }
}

/// 批量加载实体定义
pub struct LoadEntitiesBulkTool {
    pub catalog: Arc<dyn EntityCatalog>,
}

#[async_trait]
impl Tool for LoadEntitiesBulkTool {
    fn name(&self) -> &str {
        names::LOAD_ENTITIES_BULK
    }

    fn description(&self) -> &str {
        "Load several semantic entity definitions at once."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entities": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Entity names to load"
                }
            },
            "required": ["entities"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let requested = string_list_arg(&args, "entities")?;
        let mut loaded = Vec::new();
        let mut missing = Vec::new();
        for name in requested {
            match self.catalog.load_entity(&name).await {
                Ok(def) => loaded.push(json!({ "name": name, "definition": def })),
                Err(_) => missing.push(name),
            }
        }
        Ok(json!({ "entities": loaded, "missing": missing }))
    }
}

/// 从实体定义中提取属性列表（properties 数组的 name/type，尽力而为）
pub(crate) fn extract_properties(def: &Value) -> Vec<Value> {
    let Some(props) = def.get("properties").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    props
        .iter()
        .filter_map(|p| {
            if let Some(name) = p.as_str() {
                return Some(json!({ "name": name }));
            }
            let name = p.get("name").and_then(|v| v.as_str())?;
            let mut item = serde_json::Map::new();
            item.insert("name".to_string(), json!(name));
            if let Some(t) = p.get("type").and_then(|v| v.as_str()) {
                item.insert("type".to_string(), json!(t));
            }
            if let Some(d) = p.get("description").and_then(|v| v.as_str()) {
                item.insert("description".to_string(), json!(d));
            }
            Some(Value::Object(item))
        })
        .collect()
}

/// 扫描单个实体的属性
pub struct ScanEntityPropertiesTool {
    pub catalog: Arc<dyn EntityCatalog>,
}

#[async_trait]
impl Tool for ScanEntityPropertiesTool {
    fn name(&self) -> &str {
        names::SCAN_ENTITY_PROPERTIES
    }

    fn description(&self) -> &str {
        "List the properties (columns) declared by a semantic entity."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity": { "type": "string" }
            },
            "required": ["entity"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let entity = string_arg(&args, "entity")?;
        match self.catalog.load_entity(&entity).await {
            Ok(def) => Ok(json!({
                "entity": entity,
                "properties": extract_properties(&def),
            })),
            Err(e) => Ok(json!({ "ok": false, "error": e })),
        }
    }
}

/// 评估候选实体对问题的覆盖：哪些存在、哪些未知
pub struct AssessEntityCoverageTool {
    pub catalog: Arc<dyn EntityCatalog>,
}

#[async_trait]
impl Tool for AssessEntityCoverageTool {
    fn name(&self) -> &str {
        names::ASSESS_ENTITY_COVERAGE
    }

    fn description(&self) -> &str {
        "Check which of the candidate entities exist in the catalog and report coverage."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string" },
                "entities": { "type": "array", "items": { "type": "string" } }
            },
            "required": ["entities"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let requested = string_list_arg(&args, "entities")?;
        if requested.is_empty() {
            return Err(AgentError::ToolInput(
                "entities must not be empty".to_string(),
            ));
        }
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for name in &requested {
            if self.catalog.load_entity(name).await.is_ok() {
                known.push(name.clone());
            } else {
                unknown.push(name.clone());
            }
        }
        let coverage = known.len() as f64 / requested.len() as f64;
        Ok(json!({
            "known": known,
            "unknown": unknown,
            "coverage": coverage,
        }))
    }
}

/// 关键词检索实体目录（名称、描述、属性名）
pub struct SearchCatalogTool {
    pub catalog: Arc<dyn EntityCatalog>,
}

#[async_trait]
impl Tool for SearchCatalogTool {
    fn name(&self) -> &str {
        names::SEARCH_CATALOG
    }

    fn description(&self) -> &str {
        "Search the semantic entity catalog by keyword (names, descriptions, properties)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": { "type": "string" }
            },
            "required": ["keyword"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let keyword = string_arg(&args, "keyword")?.to_lowercase();
        if keyword.is_empty() {
            return Err(AgentError::ToolInput("keyword must not be empty".to_string()));
        }
        let entities = match self.catalog.list_entities().await {
            Ok(e) => e,
            Err(e) => return Ok(json!({ "ok": false, "error": e })),
        };
        let mut matches = Vec::new();
        for summary in entities {
            let mut matched_properties: Vec<String> = Vec::new();
            if let Ok(def) = self.catalog.load_entity(&summary.name).await {
                matched_properties = extract_properties(&def)
                    .iter()
                    .filter_map(|p| p.get("name").and_then(|v| v.as_str()).map(String::from))
                    .filter(|n| n.to_lowercase().contains(&keyword))
                    .collect();
            }
            if summary.name.to_lowercase().contains(&keyword)
                || summary.description.to_lowercase().contains(&keyword)
                || !matched_properties.is_empty()
            {
                matches.push(json!({
                    "name": summary.name,
                    "description": summary.description,
                    "matched_properties": matched_properties,
                }));
            }
        }
        Ok(json!({ "matches": matches }))
    }
}

/// 关键词检索数据库 schema（表与列）
pub struct SearchSchemaTool {
    pub db: Arc<dyn DatabaseExecutor>,
}

#[async_trait]
impl Tool for SearchSchemaTool {
    fn name(&self) -> &str {
        names::SEARCH_SCHEMA
    }

    fn description(&self) -> &str {
        "Search the live database schema (tables and columns) by keyword."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "keyword": { "type": "string" }
            },
            "required": ["keyword"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let keyword = string_arg(&args, "keyword")?.to_lowercase();
        let tables = match self.db.schema().await {
            Ok(t) => t,
            Err(e) => return Ok(json!({ "ok": false, "error": e.to_string() })),
        };
        let mut matches = Vec::new();
        for t in tables {
            let matched_columns: Vec<&str> = t
                .columns
                .iter()
                .filter(|c| c.name.to_lowercase().contains(&keyword))
                .map(|c| c.name.as_str())
                .collect();
            if t.table.to_lowercase().contains(&keyword) || !matched_columns.is_empty() {
                matches.push(json!({
                    "table": t.table,
                    "schema": t.schema,
                    "matched_columns": matched_columns,
                }));
            }
        }
        Ok(json!({ "matches": matches }))
    }
}

/// 澄清意图逃生口：终止运行并向用户提问
pub struct ClarifyIntentTool;

#[async_trait]
impl Tool for ClarifyIntentTool {
    fn name(&self) -> &str {
        names::CLARIFY_INTENT
    }

    fn description(&self) -> &str {
        "Ask the user a clarifying question when the intent cannot be resolved. Terminates the run."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "question": { "type": "string", "description": "The clarifying question" }
            },
            "required": ["question"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let question = string_arg(&args, "question")?;
        if question.trim().is_empty() {
            return Err(AgentError::ToolInput("question must not be empty".to_string()));
        }
        Ok(json!({ "question": question }))
    }
}

/// 最终化计划：透传不透明 plan 载荷；其出现触发 planning -> building
pub struct FinalizePlanTool;

#[async_trait]
impl Tool for FinalizePlanTool {
    fn name(&self) -> &str {
        names::FINALIZE_PLAN
    }

    fn description(&self) -> &str {
        "Finalize the query plan. Pass the plan payload; it is threaded unchanged into later phases."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "plan": { "description": "Opaque finalized plan payload" }
            },
            "required": ["plan"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let plan = args
            .get("plan")
            .filter(|p| !p.is_null())
            .ok_or_else(|| AgentError::ToolInput("plan is required".to_string()))?;
        Ok(json!({ "plan": plan }))
    }
}

/// 宣告没有可回答的数据；终止运行
pub struct FinalizeNoDataTool;

#[async_trait]
impl Tool for FinalizeNoDataTool {
    fn name(&self) -> &str {
        names::FINALIZE_NO_DATA
    }

    fn description(&self) -> &str {
        "Declare that no answerable data exists for the question. Terminates the run."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "reason": { "type": "string" }
            },
            "required": ["reason"]
        })
    }

    async fn execute(&self, args: Value) -> Result<Value, AgentError> {
        let reason = opt_string_arg(&args, "reason").unwrap_or_default();
        Ok(json!({ "reason": reason }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semantic::{EntitySummary, VerifiedQuery};

    struct TwoEntityCatalog;

    #[async_trait]
    impl EntityCatalog for TwoEntityCatalog {
        async fn list_entities(&self) -> Result<Vec<EntitySummary>, String> {
            Ok(vec![
                EntitySummary {
                    name: "companies".to_string(),
                    description: "Registered companies".to_string(),
                },
                EntitySummary {
                    name: "employees".to_string(),
                    description: "Employee records".to_string(),
                },
            ])
        }

        async fn load_entity(&self, name: &str) -> Result<serde_json::Value, String> {
            match name {
                "companies" => Ok(json!({
                    "description": "Registered companies",
                    "properties": [
                        {"name": "company_id", "type": "integer"},
                        {"name": "industry", "type": "text"},
                    ]
                })),
                "employees" => Ok(json!({
                    "description": "Employee records",
                    "properties": [{"name": "employee_id", "type": "integer"}]
                })),
                _ => Err(format!("entity not found: {}", name)),
            }
        }

        async fn read_raw(&self, name: &str) -> Result<String, String> {
            if name == "companies" {
                Ok("description: Registered companies\n".to_string())
            } else {
                Err(format!("entity not found: {}", name))
            }
        }

        async fn verified_queries(&self) -> Vec<VerifiedQuery> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_scan_entity_properties() {
        let tool = ScanEntityPropertiesTool {
            catalog: Arc::new(TwoEntityCatalog),
        };
        let out = tool
            .execute(json!({ "entity": "companies" }))
            .await
            .unwrap();
        assert_eq!(out["properties"][1]["name"], "industry");
    }

    #[tokio::test]
    async fn test_assess_entity_coverage() {
        let tool = AssessEntityCoverageTool {
            catalog: Arc::new(TwoEntityCatalog),
        };
        let out = tool
            .execute(json!({ "entities": ["companies", "ghosts"] }))
            .await
            .unwrap();
        assert_eq!(out["known"], json!(["companies"]));
        assert_eq!(out["unknown"], json!(["ghosts"]));
        assert_eq!(out["coverage"], 0.5);
    }

    #[tokio::test]
    async fn test_search_catalog_matches_property_names() {
        let tool = SearchCatalogTool {
            catalog: Arc::new(TwoEntityCatalog),
        };
        let out = tool.execute(json!({ "keyword": "industry" })).await.unwrap();
        let matches = out["matches"].as_array().unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0]["name"], "companies");
        assert_eq!(matches[0]["matched_properties"], json!(["industry"]));
    }

    #[tokio::test]
    async fn test_finalize_plan_requires_payload() {
        let tool = FinalizePlanTool;
        let err = tool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, AgentError::ToolInput(_)));

        let out = tool
            .execute(json!({ "plan": { "entities": ["companies"] } }))
            .await
            .unwrap();
        assert_eq!(out["plan"]["entities"][0], "companies");
    }

    #[tokio::test]
    async fn test_missing_entity_is_soft_failure() {
        let tool = ReadEntityYamlRawTool {
            catalog: Arc::new(TwoEntityCatalog),
        };
        let out = tool.execute(json!({ "entity": "ghosts" })).await.unwrap();
        assert_eq!(out["ok"], false);
    }
}
