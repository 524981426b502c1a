//! 语义层：实体目录抽象与 YAML 目录实现

pub mod catalog;

pub use catalog::{EntityCatalog, EntitySummary, VerifiedQuery, YamlCatalog};
