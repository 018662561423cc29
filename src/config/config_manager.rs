// ==========================================
// 五金配件双库存引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::open_sqlite_connection;
use crate::engine::replacement_cache::DEFAULT_CACHE_TTL_SECONDS;
use crate::engine::retry::RetryPolicy;
use rusqlite::{params, Connection};
use std::error::Error;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ===== 配置键全集 =====
pub const KEY_RETRY_MAX_ATTEMPTS: &str = "stock/retry_max_attempts";
pub const KEY_RETRY_BASE_DELAY_MS: &str = "stock/retry_base_delay_ms";
pub const KEY_RETRY_BACKOFF_MULTIPLIER: &str = "stock/retry_backoff_multiplier";
pub const KEY_CACHE_TTL_SECONDS: &str = "replacement/cache_ttl_seconds";
pub const KEY_AUTO_TRANSFER_ENABLED: &str = "replacement/auto_transfer_enabled";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            r#"INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
               ON CONFLICT (scope_id, key) DO UPDATE SET value = excluded.value"#,
            params![key, value],
        )?;

        Ok(())
    }

    fn get_parsed_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        match self.get_config_value(key) {
            Ok(Some(raw)) => match raw.trim().parse() {
                Ok(v) => v,
                Err(_) => {
                    tracing::warn!(key, raw = %raw, "配置值解析失败，使用默认值");
                    default
                }
            },
            Ok(None) => default,
            Err(e) => {
                tracing::warn!(key, error = %e, "配置读取失败，使用默认值");
                default
            }
        }
    }

    /// 库存写路径的乐观锁重试策略（缺省: 3 次 / 50ms / ×2）
    pub fn retry_policy(&self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy::new(
            self.get_parsed_or(KEY_RETRY_MAX_ATTEMPTS, defaults.max_attempts),
            self.get_parsed_or(KEY_RETRY_BASE_DELAY_MS, defaults.base_delay_ms),
            self.get_parsed_or(KEY_RETRY_BACKOFF_MULTIPLIER, defaults.backoff_multiplier),
        )
    }

    /// 活跃件解析缓存 TTL
    pub fn replacement_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.get_parsed_or(KEY_CACHE_TTL_SECONDS, DEFAULT_CACHE_TTL_SECONDS))
    }

    /// 库存清零自动转移开关（缺省开启）
    pub fn auto_transfer_enabled(&self) -> bool {
        self.get_parsed_or(KEY_AUTO_TRANSFER_ENABLED, true)
    }
}
