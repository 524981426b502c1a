//! 执行子系统：结果缓存、修复引擎、成本估计与带修复的执行控制器

pub mod cache;
pub mod controller;
pub mod estimate;
pub mod repair;

pub use cache::{CacheEntry, ResultCache, CACHE_CAPACITY, CACHE_TTL};
pub use controller::{ExecutionController, ExecutionOutcome, MAX_REPAIR_ROUNDS};
pub use estimate::{estimate_cost, CostEstimate};
pub use repair::{ColumnRepairEngine, RepairAttempt, RepairEngine};
