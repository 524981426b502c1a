//! 语义实体目录
//!
//! 实体定义是目录下的 YAML 文件（每实体一个文件，内部结构对核心不透明）；
//! 目录加载器提供 list（摘要）/ load（解析值）/ raw（原文）三种读取。
//! verified_queries.yaml（如存在）提供 few-shot 示例查询，planning 阶段原样嵌入。

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 实体摘要：名称 + 描述（描述从 YAML 顶层 description 字段提取，缺省为空）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntitySummary {
    pub name: String,
    pub description: String,
}

/// 已验证的示例查询对（few-shot grounding）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedQuery {
    pub question: String,
    pub sql: String,
}

/// 实体目录 trait：对核心只承诺可枚举、可加载、可读原文
#[async_trait]
pub trait EntityCatalog: Send + Sync {
    /// 列出全部实体摘要
    async fn list_entities(&self) -> Result<Vec<EntitySummary>, String>;

    /// 加载单个实体定义（解析后的 YAML 值，内部结构不透明）
    async fn load_entity(&self, name: &str) -> Result<serde_json::Value, String>;

    /// 读取实体 YAML 原文
    async fn read_raw(&self, name: &str) -> Result<String, String>;

    /// few-shot 示例查询；默认空
    async fn verified_queries(&self) -> Vec<VerifiedQuery> {
        Vec::new()
    }
}

/// 基于目录的 YAML 实体目录
pub struct YamlCatalog {
    root: PathBuf,
}

impl YamlCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entity_path(&self, name: &str) -> Result<PathBuf, String> {
        // 实体名即文件名（不含扩展名）；拒绝路径分隔符，防止目录逃逸
        if name.is_empty() || name.contains('/') || name.contains('\\') || name.contains("..") {
            return Err(format!("invalid entity name: {}", name));
        }
        let yaml = self.root.join(format!("{}.yaml", name));
        if yaml.exists() {
            return Ok(yaml);
        }
        let yml = self.root.join(format!("{}.yml", name));
        if yml.exists() {
            return Ok(yml);
        }
        Err(format!("entity not found: {}", name))
    }
}

fn yaml_to_json(value: serde_yaml::Value) -> Result<serde_json::Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}

fn stem_of(path: &Path) -> Option<String> {
    path.file_stem().map(|s| s.to_string_lossy().to_string())
}

#[async_trait]
impl EntityCatalog for YamlCatalog {
    async fn list_entities(&self) -> Result<Vec<EntitySummary>, String> {
        let mut entries = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| format!("cannot read catalog dir {}: {}", self.root.display(), e))?;

        let mut out = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| e.to_string())? {
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            if ext != "yaml" && ext != "yml" {
                continue;
            }
            let Some(name) = stem_of(&path) else { continue };
            if name == "verified_queries" {
                continue;
            }
            let text = tokio::fs::read_to_string(&path)
                .await
                .map_err(|e| e.to_string())?;
            let description = serde_yaml::from_str::<serde_yaml::Value>(&text)
                .ok()
                .and_then(|v| {
                    v.get("description")
                        .and_then(|d| d.as_str())
                        .map(String::from)
                })
                .unwrap_or_default();
            out.push(EntitySummary { name, description });
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(out)
    }

    async fn load_entity(&self, name: &str) -> Result<serde_json::Value, String> {
        let text = self.read_raw(name).await?;
        let value: serde_yaml::Value = serde_yaml::from_str(&text)
            .map_err(|e| format!("invalid YAML for entity {}: {}", name, e))?;
        yaml_to_json(value)
    }

    async fn read_raw(&self, name: &str) -> Result<String, String> {
        let path = self.entity_path(name)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| e.to_string())
    }

    async fn verified_queries(&self) -> Vec<VerifiedQuery> {
        let path = self.root.join("verified_queries.yaml");
        let Ok(text) = tokio::fs::read_to_string(&path).await else {
            return Vec::new();
        };
        serde_yaml::from_str(&text).unwrap_or_default()
    }
}
