//! Nectar - 自然语言到 SQL 的阶段化智能体
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、步骤历史、阶段状态机、事件与编排主循环
//! - **db**: 数据库执行器抽象与 PostgreSQL 实现
//! - **execute**: 结果缓存、修复引擎、成本估计与带修复的执行控制器
//! - **llm**: 模型轮次执行器抽象与实现（OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化
//! - **prompts**: 各阶段 system 指令
//! - **semantic**: 语义实体目录（YAML）与已验证示例查询
//! - **tools**: 工具注册表、执行器与按阶段划分的工具集

pub mod config;
pub mod core;
pub mod db;
pub mod execute;
pub mod llm;
pub mod observability;
pub mod prompts;
pub mod semantic;
pub mod tools;
