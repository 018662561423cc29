use crate::domain::stock::StockHistory;
use crate::domain::types::{StockEventType, SubWarehouse, WarehouseType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

const SELECT_BASE: &str = r#"SELECT history_id, article_id, warehouse_type, sub_warehouse,
       event_type, previous_qty, change_qty, new_qty,
       reason, reference, is_manual_edit, actor, recorded_at
FROM okuc_stock_history"#;

// ==========================================
// StockHistoryRepository - 库存流水仓储
// ==========================================
// 红线: 只追加，不更新不删除
pub struct StockHistoryRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StockHistoryRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入流水行（改量之外的独立写入，如盘点初始化）
    pub fn insert(&self, history: &StockHistory) -> RepositoryResult<String> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        super::record::insert_history_tx(&tx, history)?;
        tx.commit()?;
        Ok(history.history_id.clone())
    }

    /// 查询配件流水（时间倒序，限量）
    pub fn find_by_article(
        &self,
        article_id: i64,
        limit: i64,
    ) -> RepositoryResult<Vec<StockHistory>> {
        let conn = self.get_conn()?;

        // recorded_at 秒级精度，rowid 兜底保证插入序稳定
        let mut stmt = conn.prepare(&format!(
            "{} WHERE article_id = ? ORDER BY recorded_at DESC, rowid DESC LIMIT ?",
            SELECT_BASE
        ))?;

        let rows = stmt
            .query_map(params![article_id, limit], Self::map_row)?
            .collect::<Result<Vec<StockHistory>, _>>()?;

        Ok(rows)
    }

    /// 按凭证查询（如 "ORDER:42" 找某订单的全部 RW 流水）
    pub fn find_by_reference(&self, reference: &str) -> RepositoryResult<Vec<StockHistory>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE reference = ? ORDER BY recorded_at, rowid",
            SELECT_BASE
        ))?;

        let rows = stmt
            .query_map(params![reference], Self::map_row)?
            .collect::<Result<Vec<StockHistory>, _>>()?;

        Ok(rows)
    }

    /// 按凭证 + 事件类型查询（RW 冲销时只取 rw 行）
    pub fn find_by_reference_and_type(
        &self,
        reference: &str,
        event_type: StockEventType,
    ) -> RepositoryResult<Vec<StockHistory>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE reference = ? AND event_type = ? ORDER BY recorded_at, rowid",
            SELECT_BASE
        ))?;

        let rows = stmt
            .query_map(params![reference, event_type.to_db_str()], Self::map_row)?
            .collect::<Result<Vec<StockHistory>, _>>()?;

        Ok(rows)
    }

    /// 最近流水
    pub fn find_recent(&self, limit: i64) -> RepositoryResult<Vec<StockHistory>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY recorded_at DESC, rowid DESC LIMIT ?",
            SELECT_BASE
        ))?;

        let rows = stmt
            .query_map(params![limit], Self::map_row)?
            .collect::<Result<Vec<StockHistory>, _>>()?;

        Ok(rows)
    }

    /// 配件流水条数
    pub fn count_by_article(&self, article_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM okuc_stock_history WHERE article_id = ?",
            params![article_id],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<StockHistory> {
        let wh_str: String = row.get(2)?;
        let sub_str: String = row.get(3)?;
        let event_str: String = row.get(4)?;
        Ok(StockHistory {
            history_id: row.get(0)?,
            article_id: row.get(1)?,
            warehouse_type: WarehouseType::from_str(&wh_str).unwrap_or(WarehouseType::Pvc),
            sub_warehouse: SubWarehouse::from_str(&sub_str),
            event_type: StockEventType::from_str(&event_str)
                .unwrap_or(StockEventType::Adjustment),
            previous_qty: row.get(5)?,
            change_qty: row.get(6)?,
            new_qty: row.get(7)?,
            reason: row.get(8)?,
            reference: row.get(9)?,
            is_manual_edit: row.get::<_, i64>(10)? != 0,
            actor: row.get(11)?,
            recorded_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(12)?, TS_FMT)
                .map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        12,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                })?,
        })
    }
}
