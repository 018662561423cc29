use crate::domain::stock::{StockHistory, StockRecord, StockSummary};
use crate::domain::types::{SubWarehouse, WarehouseType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

const SELECT_BASE: &str = r#"SELECT id, article_id, warehouse_type, sub_warehouse,
       current_quantity, initial_quantity, reserved_qty,
       min_stock, max_stock, is_quantity_uncertain,
       version, updated_at
FROM okuc_stock"#;

// ==========================================
// NewStockRecord - 建仓位入参
// ==========================================
#[derive(Debug, Clone)]
pub struct NewStockRecord {
    pub article_id: i64,
    pub warehouse_type: WarehouseType,
    pub sub_warehouse: Option<SubWarehouse>,
    pub current_quantity: i64,
    pub initial_quantity: Option<i64>,
    pub min_stock: Option<i64>,
    pub max_stock: Option<i64>,
    pub is_quantity_uncertain: bool,
}

impl NewStockRecord {
    pub fn new(
        article_id: i64,
        warehouse_type: WarehouseType,
        sub_warehouse: Option<SubWarehouse>,
        current_quantity: i64,
    ) -> Self {
        Self {
            article_id,
            warehouse_type,
            sub_warehouse,
            current_quantity,
            initial_quantity: Some(current_quantity),
            min_stock: None,
            max_stock: None,
            is_quantity_uncertain: false,
        }
    }
}

// ==========================================
// StockRecordRepository - 仓位库存仓储
// ==========================================
// 红线: 唯一事实层，改量必须带版本校验并同事务落流水
pub struct StockRecordRepository {
    conn: Arc<Mutex<Connection>>,
}

impl StockRecordRepository {
    /// 创建新的 StockRecordRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按 (article, warehouse, sub_warehouse) 查询仓位行
    ///
    /// 行不存在不是错误——表示库存未初始化（视为 0），由调用方按需懒建。
    pub fn find_by_key(
        &self,
        article_id: i64,
        warehouse_type: WarehouseType,
        sub_warehouse: Option<SubWarehouse>,
    ) -> RepositoryResult<Option<StockRecord>> {
        let conn = self.get_conn()?;

        conn.query_row(
            &format!(
                "{} WHERE article_id = ? AND warehouse_type = ? AND sub_warehouse = ?",
                SELECT_BASE
            ),
            params![
                article_id,
                warehouse_type.to_db_str(),
                SubWarehouse::to_db_str_opt(sub_warehouse),
            ],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// 按内部 id 查询
    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<StockRecord>> {
        let conn = self.get_conn()?;

        conn.query_row(
            &format!("{} WHERE id = ?", SELECT_BASE),
            params![id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// 建仓位行（version 从 0 开始）
    pub fn create(&self, record: &NewStockRecord) -> RepositoryResult<StockRecord> {
        let conn = self.get_conn()?;
        let now = chrono::Utc::now().naive_utc();

        conn.execute(
            r#"INSERT INTO okuc_stock (
                article_id, warehouse_type, sub_warehouse,
                current_quantity, initial_quantity, reserved_qty,
                min_stock, max_stock, is_quantity_uncertain,
                version, updated_at
            ) VALUES (?, ?, ?, ?, ?, 0, ?, ?, ?, 0, ?)"#,
            params![
                record.article_id,
                record.warehouse_type.to_db_str(),
                SubWarehouse::to_db_str_opt(record.sub_warehouse),
                record.current_quantity,
                record.initial_quantity,
                record.min_stock,
                record.max_stock,
                record.is_quantity_uncertain as i64,
                now.format(TS_FMT).to_string(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.find_by_id(id)?.ok_or(RepositoryError::NotFound {
            entity: "StockRecord".to_string(),
            id: id.to_string(),
        })
    }

    /// 带乐观锁的改量（核心写路径）
    ///
    /// # 并发控制
    /// 条件更新 `WHERE id = ? AND version = ?`；零行命中时区分两种失败：
    /// - 行存在但版本不符 -> OptimisticLockFailure（调用方重读重试）
    /// - 行不存在 -> NotFound
    ///
    /// # 审计
    /// 改量与流水写入在同一事务内提交，保证"每次成功改量必有一条流水"。
    ///
    /// # 返回
    /// 更新后的仓位行
    pub fn adjust_quantity(
        &self,
        stock_id: i64,
        delta: i64,
        expected_version: i64,
        history: &StockHistory,
    ) -> RepositoryResult<StockRecord> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let rows_affected = tx.execute(
            r#"UPDATE okuc_stock
               SET current_quantity = current_quantity + ?,
                   version = version + 1,
                   updated_at = ?
               WHERE id = ? AND version = ?"#,
            params![
                delta,
                chrono::Utc::now().naive_utc().format(TS_FMT).to_string(),
                stock_id,
                expected_version,
            ],
        )?;

        if rows_affected == 0 {
            // 判断是记录不存在还是版本冲突
            let exists: Result<i64, _> = tx.query_row(
                "SELECT version FROM okuc_stock WHERE id = ?",
                params![stock_id],
                |row| row.get(0),
            );

            return match exists {
                Ok(actual_version) => Err(RepositoryError::OptimisticLockFailure {
                    stock_id,
                    expected: expected_version,
                    actual: actual_version,
                }),
                Err(_) => Err(RepositoryError::NotFound {
                    entity: "StockRecord".to_string(),
                    id: stock_id.to_string(),
                }),
            };
        }

        insert_history_tx(&tx, history)?;
        tx.commit()?;
        drop(conn);

        self.find_by_id(stock_id)?.ok_or(RepositoryError::NotFound {
            entity: "StockRecord".to_string(),
            id: stock_id.to_string(),
        })
    }

    /// 直接改写数量（盘点/导入覆盖），同样带版本校验与流水
    pub fn overwrite_quantity(
        &self,
        stock_id: i64,
        new_quantity: i64,
        expected_version: i64,
        history: &StockHistory,
    ) -> RepositoryResult<StockRecord> {
        let current = self.find_by_id(stock_id)?.ok_or(RepositoryError::NotFound {
            entity: "StockRecord".to_string(),
            id: stock_id.to_string(),
        })?;

        self.adjust_quantity(
            stock_id,
            new_quantity - current.current_quantity,
            expected_version,
            history,
        )
    }

    /// 负库存报表（待人工核查）
    pub fn find_negative(&self) -> RepositoryResult<Vec<StockRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE current_quantity < 0 ORDER BY current_quantity ASC",
            SELECT_BASE
        ))?;

        let records = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<StockRecord>, _>>()?;

        Ok(records)
    }

    /// 低于最低库存线的仓位
    pub fn find_below_minimum(
        &self,
        warehouse_type: Option<WarehouseType>,
    ) -> RepositoryResult<Vec<StockRecord>> {
        let conn = self.get_conn()?;

        let sql = format!(
            "{} WHERE min_stock IS NOT NULL AND current_quantity < min_stock{} \
             ORDER BY warehouse_type, sub_warehouse",
            SELECT_BASE,
            if warehouse_type.is_some() {
                " AND warehouse_type = ?"
            } else {
                ""
            }
        );

        let mut stmt = conn.prepare(&sql)?;
        let records = match warehouse_type {
            Some(wh) => stmt
                .query_map(params![wh.to_db_str()], Self::map_row)?
                .collect::<Result<Vec<StockRecord>, _>>()?,
            None => stmt
                .query_map([], Self::map_row)?
                .collect::<Result<Vec<StockRecord>, _>>()?,
        };

        Ok(records)
    }

    /// 按仓位汇总（总件数/总数量/低于最低线数）
    pub fn summary(
        &self,
        warehouse_type: Option<WarehouseType>,
    ) -> RepositoryResult<Vec<StockSummary>> {
        let conn = self.get_conn()?;

        let sql = format!(
            r#"SELECT warehouse_type, sub_warehouse,
                      COUNT(*) AS total_articles,
                      SUM(current_quantity) AS total_quantity,
                      SUM(CASE WHEN min_stock IS NOT NULL AND current_quantity < min_stock
                          THEN 1 ELSE 0 END) AS below_min_count
               FROM okuc_stock
               {}
               GROUP BY warehouse_type, sub_warehouse
               ORDER BY warehouse_type, sub_warehouse"#,
            if warehouse_type.is_some() {
                "WHERE warehouse_type = ?"
            } else {
                ""
            }
        );

        let map = |row: &rusqlite::Row| -> rusqlite::Result<StockSummary> {
            let wh_str: String = row.get(0)?;
            let sub_str: String = row.get(1)?;
            Ok(StockSummary {
                warehouse_type: WarehouseType::from_str(&wh_str).unwrap_or(WarehouseType::Pvc),
                sub_warehouse: SubWarehouse::from_str(&sub_str),
                total_articles: row.get(2)?,
                total_quantity: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                below_min_count: row.get(4)?,
            })
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = match warehouse_type {
            Some(wh) => stmt
                .query_map(params![wh.to_db_str()], map)?
                .collect::<Result<Vec<StockSummary>, _>>()?,
            None => stmt
                .query_map([], map)?
                .collect::<Result<Vec<StockSummary>, _>>()?,
        };

        Ok(rows)
    }

    /// RW 出库取仓位：同仓优先 production 子仓，其次主仓
    pub fn find_rw_candidate(
        &self,
        article_id: i64,
        warehouse_type: WarehouseType,
    ) -> RepositoryResult<Option<StockRecord>> {
        let conn = self.get_conn()?;

        conn.query_row(
            &format!(
                "{} WHERE article_id = ? AND warehouse_type = ? \
                 AND sub_warehouse IN ('', 'production') \
                 ORDER BY sub_warehouse DESC LIMIT 1",
                SELECT_BASE
            ),
            params![article_id, warehouse_type.to_db_str()],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// 配件全部仓位库存合计
    pub fn total_for_article(&self, article_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        let total: Option<i64> = conn.query_row(
            "SELECT SUM(current_quantity) FROM okuc_stock WHERE article_id = ?",
            params![article_id],
            |row| row.get(0),
        )?;

        Ok(total.unwrap_or(0))
    }

    /// 映射数据库行到 StockRecord 对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<StockRecord> {
        let wh_str: String = row.get(2)?;
        let sub_str: String = row.get(3)?;
        Ok(StockRecord {
            id: row.get(0)?,
            article_id: row.get(1)?,
            warehouse_type: WarehouseType::from_str(&wh_str).unwrap_or(WarehouseType::Pvc),
            sub_warehouse: SubWarehouse::from_str(&sub_str),
            current_quantity: row.get(4)?,
            initial_quantity: row.get(5)?,
            reserved_qty: row.get(6)?,
            min_stock: row.get(7)?,
            max_stock: row.get(8)?,
            is_quantity_uncertain: row.get::<_, i64>(9)? != 0,
            version: row.get(10)?,
            updated_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(11)?, TS_FMT).map_err(
                |e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        11,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                },
            )?,
        })
    }
}

/// 事务内写流水（adjust_quantity 与 history 仓储共用同一列集）
pub(super) fn insert_history_tx(tx: &Transaction, history: &StockHistory) -> RepositoryResult<()> {
    tx.execute(
        r#"INSERT INTO okuc_stock_history (
            history_id, article_id, warehouse_type, sub_warehouse,
            event_type, previous_qty, change_qty, new_qty,
            reason, reference, is_manual_edit, actor, recorded_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        params![
            &history.history_id,
            history.article_id,
            history.warehouse_type.to_db_str(),
            SubWarehouse::to_db_str_opt(history.sub_warehouse),
            history.event_type.to_db_str(),
            history.previous_qty,
            history.change_qty,
            history.new_qty,
            &history.reason,
            &history.reference,
            history.is_manual_edit as i64,
            &history.actor,
            history.recorded_at.format(TS_FMT).to_string(),
        ],
    )?;

    Ok(())
}
