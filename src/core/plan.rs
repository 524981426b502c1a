//! 最终化计划载荷
//!
//! planning 阶段产出、building / execution 阶段原样穿透的不透明结构。
//! 核心不约束其内部模式；仅为修复引擎提供一个尽力而为的实体名提取。

use serde::{Deserialize, Serialize};

/// 不透明计划载荷（内部模式属于 planning 子系统）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FinalizedPlan(pub serde_json::Value);

impl FinalizedPlan {
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// 尽力而为地提取计划涉及的实体名：顶层 entities 数组，元素为字符串或带
    /// name / entity 字段的对象。提取不到时返回空（修复引擎会相应缩小候选范围）。
    pub fn entity_names(&self) -> Vec<String> {
        let Some(items) = self.0.get("entities").and_then(|v| v.as_array()) else {
            return Vec::new();
        };
        items
            .iter()
            .filter_map(|item| {
                item.as_str().map(String::from).or_else(|| {
                    item.get("name")
                        .or_else(|| item.get("entity"))
                        .and_then(|v| v.as_str())
                        .map(String::from)
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_names_from_strings_and_objects() {
        let plan = FinalizedPlan::new(serde_json::json!({
            "entities": ["companies", {"name": "employees"}, {"entity": "orders"}, 42],
            "joins": []
        }));
        assert_eq!(plan.entity_names(), vec!["companies", "employees", "orders"]);
    }

    #[test]
    fn test_entity_names_absent() {
        let plan = FinalizedPlan::new(serde_json::json!({"anything": true}));
        assert!(plan.entity_names().is_empty());
        assert!(FinalizedPlan::default().entity_names().is_empty());
    }
}
