//! 工具系统：注册表、执行器与按阶段划分的工具集

pub mod building;
pub mod execution;
pub mod executor;
pub mod planning;
pub mod registry;
pub mod reporting;

use std::sync::Arc;

use serde_json::Value;

use crate::core::AgentError;
use crate::db::DatabaseExecutor;
use crate::execute::{ExecutionController, RepairEngine, ResultCache};
use crate::semantic::EntityCatalog;

pub use executor::ToolExecutor;
pub use registry::{Tool, ToolRegistry};
pub use reporting::FinalizeReportPayload;

/// 全量工具名：阶段状态机与终止判定按这些名字匹配
pub mod names {
    pub const READ_ENTITY_YAML_RAW: &str = "ReadEntityYamlRaw";
    pub const LOAD_ENTITIES_BULK: &str = "LoadEntitiesBulk";
    pub const SCAN_ENTITY_PROPERTIES: &str = "ScanEntityProperties";
    pub const ASSESS_ENTITY_COVERAGE: &str = "AssessEntityCoverage";
    pub const SEARCH_CATALOG: &str = "SearchCatalog";
    pub const SEARCH_SCHEMA: &str = "SearchSchema";
    pub const CLARIFY_INTENT: &str = "ClarifyIntent";
    pub const FINALIZE_PLAN: &str = "FinalizePlan";
    pub const FINALIZE_NO_DATA: &str = "FinalizeNoData";

    pub const JOIN_PATH_FINDER: &str = "JoinPathFinder";
    pub const BUILD_SQL: &str = "BuildSQL";
    pub const VALIDATE_SQL: &str = "ValidateSQL";
    pub const FINALIZE_BUILD: &str = "FinalizeBuild";

    pub const ESTIMATE_COST: &str = "EstimateCost";
    pub const EXECUTE_SQL: &str = "ExecuteSQL";
    pub const EXECUTE_SQL_WITH_REPAIR: &str = "ExecuteSQLWithRepair";

    pub const SANITY_CHECK: &str = "SanityCheck";
    pub const FORMAT_RESULTS: &str = "FormatResults";
    pub const EXPLAIN_RESULTS: &str = "ExplainResults";
    pub const FINALIZE_REPORT: &str = "FinalizeReport";
}

/// 取必填字符串参数；缺失或类型不对视为入参非法
pub(crate) fn string_arg(args: &Value, key: &str) -> Result<String, AgentError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| AgentError::ToolInput(format!("{} must be a string", key)))
}

/// 取可选字符串参数
pub(crate) fn opt_string_arg(args: &Value, key: &str) -> Option<String> {
    args.get(key).and_then(|v| v.as_str()).map(String::from)
}

/// 取必填字符串数组参数
pub(crate) fn string_list_arg(args: &Value, key: &str) -> Result<Vec<String>, AgentError> {
    let arr = args
        .get(key)
        .and_then(|v| v.as_array())
        .ok_or_else(|| AgentError::ToolInput(format!("{} must be an array of strings", key)))?;
    arr.iter()
        .map(|v| {
            v.as_str()
                .map(String::from)
                .ok_or_else(|| AgentError::ToolInput(format!("{} must contain only strings", key)))
        })
        .collect()
}

/// 组装全量工具注册表；ExecutionController 在内部用同一套数据库/缓存/修复引擎构建
pub fn build_registry(
    db: Arc<dyn DatabaseExecutor>,
    catalog: Arc<dyn EntityCatalog>,
    cache: Arc<ResultCache>,
    repair: Arc<dyn RepairEngine>,
) -> ToolRegistry {
    let controller = Arc::new(ExecutionController::new(
        db.clone(),
        cache,
        repair,
        catalog.clone(),
    ));

    let mut registry = ToolRegistry::new();

    // planning
    registry.register(planning::ReadEntityYamlRawTool {
        catalog: catalog.clone(),
    });
    registry.register(planning::LoadEntitiesBulkTool {
        catalog: catalog.clone(),
    });
    registry.register(planning::ScanEntityPropertiesTool {
        catalog: catalog.clone(),
    });
    registry.register(planning::AssessEntityCoverageTool {
        catalog: catalog.clone(),
    });
    registry.register(planning::SearchCatalogTool { catalog });
    registry.register(planning::SearchSchemaTool { db: db.clone() });
    registry.register(planning::ClarifyIntentTool);
    registry.register(planning::FinalizePlanTool);
    registry.register(planning::FinalizeNoDataTool);

    // building
    registry.register(building::JoinPathFinderTool { db: db.clone() });
    registry.register(building::BuildSQLTool);
    registry.register(building::ValidateSQLTool { db: db.clone() });
    registry.register(building::FinalizeBuildTool);

    // execution
    registry.register(execution::EstimateCostTool { db: db.clone() });
    registry.register(execution::ExecuteSQLTool { db });
    registry.register(execution::ExecuteSQLWithRepairTool { controller });

    // reporting
    registry.register(reporting::SanityCheckTool);
    registry.register(reporting::FormatResultsTool);
    registry.register(reporting::ExplainResultsTool);
    registry.register(reporting::FinalizeReportTool);

    registry
}
