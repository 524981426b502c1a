//! SQL 修复引擎
//!
//! 只处理可安全自动纠正的 schema 失配类错误：未知列与歧义列。其余错误一律拒绝，
//! 交给 reporting 阶段向用户叙述。候选列来自计划涉及实体的 properties 与数据库
//! 错误提示（hint），按编辑距离择优。

use async_trait::async_trait;
use regex::Regex;

use crate::core::FinalizedPlan;
use crate::semantic::EntityCatalog;

/// 允许的最大编辑距离（超过即认为不是拼写错误）
const MAX_EDIT_DISTANCE: usize = 3;

/// 一次修复提议：纠正后的 SQL 与理由
#[derive(Debug, Clone)]
pub struct RepairAttempt {
    pub fixed_sql: String,
    pub reason: String,
}

/// 修复引擎 trait：提议一条纠正查询，或拒绝
#[async_trait]
pub trait RepairEngine: Send + Sync {
    async fn propose(
        &self,
        failing_sql: &str,
        plan: &FinalizedPlan,
        catalog: &dyn EntityCatalog,
        error: &str,
    ) -> Option<RepairAttempt>;
}

/// 列名修复引擎：解析 Postgres 的 undefined_column / ambiguous_column 错误信息
pub struct ColumnRepairEngine {
    re_missing: Regex,
    re_hint: Regex,
    re_ambiguous: Regex,
}

impl Default for ColumnRepairEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnRepairEngine {
    pub fn new() -> Self {
        Self {
            re_missing: Regex::new(r#"column "?([A-Za-z_][\w$.]*)"? does not exist"#)
                .expect("valid regex"),
            re_hint: Regex::new(r#"Perhaps you meant to reference the column "([^"]+)""#)
                .expect("valid regex"),
            re_ambiguous: Regex::new(r#"column reference "([^"]+)" is ambiguous"#)
                .expect("valid regex"),
        }
    }

    /// 计划涉及实体的全部 (实体名, 列名) 候选
    async fn candidate_columns(
        &self,
        plan: &FinalizedPlan,
        catalog: &dyn EntityCatalog,
    ) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for entity in plan.entity_names() {
            let Ok(def) = catalog.load_entity(&entity).await else {
                continue;
            };
            let Some(props) = def.get("properties").and_then(|v| v.as_array()) else {
                continue;
            };
            for p in props {
                let name = p
                    .as_str()
                    .map(String::from)
                    .or_else(|| p.get("name").and_then(|v| v.as_str()).map(String::from));
                if let Some(name) = name {
                    out.push((entity.clone(), name));
                }
            }
        }
        out
    }
}

/// 经典 Levenshtein 编辑距离（列名都很短，O(n*m) 足够）
fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = if ca.eq_ignore_ascii_case(cb) { 0 } else { 1 };
            cur[j + 1] = (prev[j + 1] + 1).min(cur[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// 整词替换（保留限定前缀之外的文本）
fn replace_identifier(sql: &str, from: &str, to: &str) -> Option<String> {
    let re = Regex::new(&format!(r"\b{}\b", regex::escape(from))).ok()?;
    if !re.is_match(sql) {
        return None;
    }
    Some(re.replace_all(sql, to).to_string())
}

#[async_trait]
impl RepairEngine for ColumnRepairEngine {
    async fn propose(
        &self,
        failing_sql: &str,
        plan: &FinalizedPlan,
        catalog: &dyn EntityCatalog,
        error: &str,
    ) -> Option<RepairAttempt> {
        // 歧义列：用计划中第一个含该列的实体名限定
        if let Some(cap) = self.re_ambiguous.captures(error) {
            let column = cap.get(1)?.as_str();
            let candidates = self.candidate_columns(plan, catalog).await;
            let owner = candidates
                .iter()
                .find(|(_, c)| c.eq_ignore_ascii_case(column))
                .map(|(e, _)| e.clone())?;
            let qualified = format!("{}.{}", owner, column);
            let fixed_sql = replace_identifier(failing_sql, column, &qualified)?;
            return Some(RepairAttempt {
                fixed_sql,
                reason: format!(
                    "qualified ambiguous column \"{}\" as \"{}\"",
                    column, qualified
                ),
            });
        }

        // 未知列：优先采用数据库 hint，否则在计划实体的属性里找最近的名字
        let cap = self.re_missing.captures(error)?;
        let full = cap.get(1)?.as_str();
        // "t.col" 形式时只替换列名部分，保留限定前缀
        let (qualifier, bare) = match full.rsplit_once('.') {
            Some((q, b)) => (Some(q), b),
            None => (None, full),
        };

        if let Some(hint) = self.re_hint.captures(error) {
            let suggestion = hint.get(1)?.as_str();
            // hint 形如 "table.column"；有限定前缀时沿用原前缀
            let column = suggestion.rsplit_once('.').map(|(_, c)| c).unwrap_or(suggestion);
            let replacement = match qualifier {
                Some(q) => format!("{}.{}", q, column),
                None => column.to_string(),
            };
            let fixed_sql = replace_identifier(failing_sql, full, &replacement)?;
            return Some(RepairAttempt {
                fixed_sql,
                reason: format!(
                    "replaced unknown column \"{}\" with \"{}\" (database hint)",
                    full, column
                ),
            });
        }

        let candidates = self.candidate_columns(plan, catalog).await;
        let (entity, best) = candidates
            .into_iter()
            .map(|(e, c)| {
                let d = edit_distance(bare, &c);
                (e, c, d)
            })
            .filter(|(_, c, d)| *d <= MAX_EDIT_DISTANCE && !c.eq_ignore_ascii_case(bare) && *d < c.len())
            .min_by_key(|(_, _, d)| *d)
            .map(|(e, c, _)| (e, c))?;

        let replacement = match qualifier {
            Some(q) => format!("{}.{}", q, best),
            None => best.clone(),
        };
        let fixed_sql = replace_identifier(failing_sql, full, &replacement)?;
        Some(RepairAttempt {
            fixed_sql,
            reason: format!(
                "replaced unknown column \"{}\" with \"{}\" (from entity \"{}\")",
                full, best, entity
            ),
        })
    }
}
