//! 查询结果缓存
//!
//! 以逐字 SQL 文本为键（不规范化、不哈希：两条语义相同但文本不同的查询是两个条目），
//! TTL 5 分钟、容量 100。每次交互前做一次清理：先过期清扫，再按 cached_at 从旧到新
//! 淘汰到容量之内（过期条目不计入容量）。进程级共享实例，内部自带锁，调用方无需外部同步。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::db::ColumnInfo;

/// 条目最大存活时间
pub const CACHE_TTL: Duration = Duration::from_secs(5 * 60);
/// 最大条目数
pub const CACHE_CAPACITY: usize = 100;

/// 缓存条目：行、列与写入时刻
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub rows: Vec<serde_json::Value>,
    pub columns: Vec<ColumnInfo>,
    pub cached_at: Instant,
}

/// 结果缓存：Mutex<HashMap<SQL 文本, 条目>>
pub struct ResultCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
    capacity: usize,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultCache {
    pub fn new() -> Self {
        Self::with_settings(CACHE_TTL, CACHE_CAPACITY)
    }

    /// 测试可用短 TTL / 小容量构造
    pub fn with_settings(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity,
        }
    }

    /// 清理：先删过期条目，仍超容量则按 cached_at 淘汰最旧
    fn housekeep(&self, entries: &mut HashMap<String, CacheEntry>) {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, e| now.duration_since(e.cached_at) <= self.ttl);
        let expired = before - entries.len();
        if expired > 0 {
            tracing::debug!(expired, "expired cache entries removed");
        }

        if entries.len() > self.capacity {
            let mut by_age: Vec<(String, Instant)> = entries
                .iter()
                .map(|(k, e)| (k.clone(), e.cached_at))
                .collect();
            by_age.sort_by_key(|(_, at)| *at);
            let excess = entries.len() - self.capacity;
            for (key, _) in by_age.into_iter().take(excess) {
                entries.remove(&key);
                tracing::debug!("cache capacity reached, removed oldest entry");
            }
        }
    }

    /// 按逐字 SQL 读取；缺失或过期返回 None
    pub fn get(&self, sql: &str) -> Option<CacheEntry> {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        self.housekeep(&mut entries);
        entries.get(sql).cloned()
    }

    /// 写入（覆盖同键）；之后立刻执行容量约束
    pub fn put(&self, sql: &str, rows: Vec<serde_json::Value>, columns: Vec<ColumnInfo>) {
        let mut entries = self.entries.lock().expect("cache lock poisoned");
        self.housekeep(&mut entries);
        entries.insert(
            sql.to_string(),
            CacheEntry {
                rows,
                columns,
                cached_at: Instant::now(),
            },
        );
        self.housekeep(&mut entries);
    }

    pub fn clear(&self) {
        self.entries.lock().expect("cache lock poisoned").clear();
        tracing::info!("query cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols() -> Vec<ColumnInfo> {
        vec![ColumnInfo {
            name: "n".to_string(),
            type_name: "INT8".to_string(),
        }]
    }

    fn rows(v: i64) -> Vec<serde_json::Value> {
        vec![serde_json::json!({ "n": v })]
    }

    #[test]
    fn test_round_trip() {
        let cache = ResultCache::new();
        cache.put("SELECT 1", rows(1), cols());
        let entry = cache.get("SELECT 1").expect("entry present");
        assert_eq!(entry.rows, rows(1));
        assert_eq!(entry.columns, cols());
    }

    #[test]
    fn test_key_is_verbatim_sql_text() {
        let cache = ResultCache::new();
        cache.put("SELECT 1", rows(1), cols());
        // 语义相同、文本不同 -> 不同条目
        assert!(cache.get("select 1").is_none());
        assert!(cache.get("SELECT  1").is_none());
    }

    #[test]
    fn test_expiry() {
        let cache = ResultCache::with_settings(Duration::from_millis(30), 100);
        cache.put("SELECT 1", rows(1), cols());
        assert!(cache.get("SELECT 1").is_some());
        std::thread::sleep(Duration::from_millis(60));
        assert!(cache.get("SELECT 1").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_capacity_keeps_most_recent() {
        let cache = ResultCache::with_settings(Duration::from_secs(600), 5);
        for i in 0..8 {
            cache.put(&format!("SELECT {}", i), rows(i), cols());
            // Instant 分辨率保护：确保 cached_at 严格递增
            std::thread::sleep(Duration::from_millis(2));
        }
        assert_eq!(cache.len(), 5);
        for i in 0..3 {
            assert!(cache.get(&format!("SELECT {}", i)).is_none());
        }
        for i in 3..8 {
            assert!(cache.get(&format!("SELECT {}", i)).is_some());
        }
    }

    #[test]
    fn test_overwrite_and_clear() {
        let cache = ResultCache::new();
        cache.put("SELECT 1", rows(1), cols());
        cache.put("SELECT 1", rows(2), cols());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("SELECT 1").unwrap().rows, rows(2));
        cache.clear();
        assert!(cache.is_empty());
    }
}
