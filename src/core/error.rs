//! Agent 错误类型
//!
//! 对应错误分级：工具入参错误在执行前被拒绝并回喂给模型；数据库执行错误由修复协议
//! 就地处理（至多两轮）；只有 Transport / Config 作为 Err 穿出 run 边界。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（入参、执行、修复耗尽、步数预算、外部协作者）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 工具入参不合法（执行前拒绝，结构化结果回喂给模型）
    #[error("Tool input error: {0}")]
    ToolInput(String),

    /// 数据库拒绝查询（语法、缺列、歧义列、权限）；由修复协议就地处理
    #[error("Execution error: {0}")]
    Execution(String),

    /// 修复协议用尽两轮仍失败；交给 reporting 阶段向用户叙述，不是系统故障
    #[error("Repair exhausted: {0}")]
    RepairExhausted(String),

    /// 步数预算耗尽仍未出现终止工具结果
    #[error("Step budget exceeded ({0} steps)")]
    BudgetExceeded(usize),

    /// 模型或数据库协作者不可达；不在核心内重试，直接上抛
    #[error("Transport error: {0}")]
    Transport(String),

    /// 用户取消
    #[error("Cancelled by user")]
    Cancelled,

    #[error("Config error: {0}")]
    Config(String),
}
