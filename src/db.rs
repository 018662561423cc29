// ==========================================
// 五金配件双库存引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供幂等建表入口 ensure_schema（测试与运维脚本共用）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
///
/// 说明：
/// - 版本号用于**提示/告警**（不做自动迁移），避免静默在旧库上运行导致隐性错误。
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 幂等建表
///
/// 约束说明：
/// - okuc_stock 的 (article_id, warehouse_type, sub_warehouse) 必须全库唯一；
///   SQLite 的 UNIQUE 约束不会对 NULL 去重，因此主仓以空串 '' 存储，
///   领域层将空串映射为“无子仓”。
/// - okuc_demand 的 (order_id, article_id) 唯一，修正在原行上更新而非插入新行。
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS okuc_article (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_no TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            description TEXT,
            order_unit TEXT NOT NULL DEFAULT 'piece',
            used_in_pvc INTEGER NOT NULL DEFAULT 0,
            used_in_alu INTEGER NOT NULL DEFAULT 0,
            is_phase_out INTEGER NOT NULL DEFAULT 0,
            replaced_by_article_id INTEGER REFERENCES okuc_article(id),
            demand_transferred_at TEXT,
            created_at TEXT NOT NULL,
            deleted_at TEXT
        );

        CREATE TABLE IF NOT EXISTS okuc_stock (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            article_id INTEGER NOT NULL REFERENCES okuc_article(id),
            warehouse_type TEXT NOT NULL,
            sub_warehouse TEXT NOT NULL DEFAULT '',
            current_quantity INTEGER NOT NULL DEFAULT 0,
            initial_quantity INTEGER,
            reserved_qty INTEGER NOT NULL DEFAULT 0,
            min_stock INTEGER,
            max_stock INTEGER,
            is_quantity_uncertain INTEGER NOT NULL DEFAULT 0,
            version INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            UNIQUE (article_id, warehouse_type, sub_warehouse)
        );

        CREATE TABLE IF NOT EXISTS okuc_stock_history (
            history_id TEXT PRIMARY KEY,
            article_id INTEGER NOT NULL REFERENCES okuc_article(id),
            warehouse_type TEXT NOT NULL,
            sub_warehouse TEXT NOT NULL DEFAULT '',
            event_type TEXT NOT NULL,
            previous_qty INTEGER NOT NULL,
            change_qty INTEGER NOT NULL,
            new_qty INTEGER NOT NULL,
            reason TEXT,
            reference TEXT,
            is_manual_edit INTEGER NOT NULL DEFAULT 0,
            actor TEXT,
            recorded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_stock_history_article
            ON okuc_stock_history (article_id, recorded_at);
        CREATE INDEX IF NOT EXISTS idx_stock_history_reference
            ON okuc_stock_history (reference);

        CREATE TABLE IF NOT EXISTS okuc_demand (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            order_id INTEGER NOT NULL,
            article_id INTEGER NOT NULL REFERENCES okuc_article(id),
            expected_week TEXT NOT NULL,
            quantity INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            source TEXT NOT NULL DEFAULT 'order',
            is_manual_edit INTEGER NOT NULL DEFAULT 0,
            edit_reason TEXT,
            edited_by TEXT,
            edited_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (order_id, article_id)
        );
        CREATE INDEX IF NOT EXISTS idx_demand_article_status
            ON okuc_demand (article_id, status);
        CREATE INDEX IF NOT EXISTS idx_demand_week
            ON okuc_demand (expected_week);

        CREATE TABLE IF NOT EXISTS okuc_proportion (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_article_id INTEGER NOT NULL REFERENCES okuc_article(id),
            target_article_id INTEGER NOT NULL REFERENCES okuc_article(id),
            proportion_type TEXT NOT NULL,
            ratio REAL NOT NULL DEFAULT 1.0,
            split_percent REAL,
            tolerance REAL NOT NULL DEFAULT 0.9,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            UNIQUE (source_article_id, target_article_id)
        );
        CREATE INDEX IF NOT EXISTS idx_proportion_source
            ON okuc_proportion (source_article_id, is_active);

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER NOT NULL
        );
        "#,
    )?;

    // 首次建库时写入版本号
    let existing: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    if existing.is_none() {
        conn.execute(
            "INSERT INTO schema_version (version) VALUES (?1)",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }

    Ok(())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ensure_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();

        ensure_schema(&conn).unwrap();
        // 重复执行不应报错，也不应重复写入版本号
        ensure_schema(&conn).unwrap();

        let version = read_schema_version(&conn).unwrap();
        assert_eq!(version, Some(CURRENT_SCHEMA_VERSION));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_schema_version_missing_table() {
        let conn = Connection::open_in_memory().unwrap();
        let version = read_schema_version(&conn).unwrap();
        assert_eq!(version, None);
    }
}
