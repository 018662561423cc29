// ==========================================
// 五金配件双库存引擎 - 活跃件解析缓存
// ==========================================
// 显式缓存对象，由组装层持有并以 Arc 传入替换解析器，
// 不使用隐藏的模块级全局变量。
// TTL 默认 60 秒（config_kv: replacement/cache_ttl_seconds 可配置）；
// 任何替换边写入后必须调用 invalidate()。
// ==========================================

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 默认缓存 TTL（秒）
pub const DEFAULT_CACHE_TTL_SECONDS: u64 = 60;

struct CacheEntry {
    live_id: i64,
    cached_at: Instant,
}

// ==========================================
// LiveArticleCache - 配件 -> 活跃件 映射缓存
// ==========================================
pub struct LiveArticleCache {
    ttl: Duration,
    entries: Mutex<HashMap<i64, CacheEntry>>,
}

impl LiveArticleCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(DEFAULT_CACHE_TTL_SECONDS))
    }

    /// 读取缓存（过期条目视为未命中并顺手剔除）
    pub fn get(&self, article_id: i64) -> Option<i64> {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(_) => return None, // 缓存中毒时降级为未命中
        };

        match entries.get(&article_id) {
            Some(entry) if entry.cached_at.elapsed() < self.ttl => Some(entry.live_id),
            Some(_) => {
                entries.remove(&article_id);
                None
            }
            None => None,
        }
    }

    /// 写入缓存
    pub fn put(&self, article_id: i64, live_id: i64) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(
                article_id,
                CacheEntry {
                    live_id,
                    cached_at: Instant::now(),
                },
            );
        }
    }

    /// 全量失效
    ///
    /// 替换边是链式的（A->B->C），改任何一条边都可能影响链上全部解析结果，
    /// 因此写路径统一全量失效而不做单键剔除。
    pub fn invalidate(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }

    /// 当前缓存条数（监控/测试用）
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
