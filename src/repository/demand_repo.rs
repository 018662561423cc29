// ==========================================
// 五金配件双库存引擎 - 需求数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: upsert 的查找-创建必须在单事务内完成，避免同键并发下重复建行
// 约束: (order_id, article_id) 唯一；转移操作整体一个事务，失败全量回滚
// ==========================================

use crate::domain::demand::{DemandRecord, WeekDemandRow};
use crate::domain::stock::ShortageRow;
use crate::domain::types::{DemandSource, DemandStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

const SELECT_BASE: &str = r#"SELECT id, order_id, article_id, expected_week, quantity,
       status, source, is_manual_edit, edit_reason, edited_by, edited_at,
       created_at, updated_at
FROM okuc_demand"#;

pub struct DemandRepository {
    conn: Arc<Mutex<Connection>>,
}

impl DemandRepository {
    /// 创建新的 DemandRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 同键查找-创建/改量（单事务）
    ///
    /// # 并发控制
    /// SELECT 与 INSERT/UPDATE 在同一事务内执行；同键并发 upsert 不会产生重复行。
    ///
    /// # 语义
    /// - 已有行: 改写 quantity 与 expected_week，清除人工修正标记（自动来源覆盖）
    /// - 无行:   新建 pending 行
    pub fn upsert(
        &self,
        order_id: i64,
        article_id: i64,
        expected_week: &str,
        quantity: i64,
        source: DemandSource,
    ) -> RepositoryResult<DemandRecord> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().naive_utc().format(TS_FMT).to_string();

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM okuc_demand WHERE order_id = ? AND article_id = ?",
                params![order_id, article_id],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing {
            Some(id) => {
                tx.execute(
                    r#"UPDATE okuc_demand
                       SET quantity = ?, expected_week = ?, source = ?,
                           is_manual_edit = 0, edit_reason = NULL,
                           edited_by = NULL, edited_at = NULL,
                           updated_at = ?
                       WHERE id = ?"#,
                    params![quantity, expected_week, source.to_db_str(), &now, id],
                )?;
                id
            }
            None => {
                tx.execute(
                    r#"INSERT INTO okuc_demand (
                        order_id, article_id, expected_week, quantity,
                        status, source, is_manual_edit, created_at, updated_at
                    ) VALUES (?, ?, ?, ?, 'pending', ?, 0, ?, ?)"#,
                    params![
                        order_id,
                        article_id,
                        expected_week,
                        quantity,
                        source.to_db_str(),
                        &now,
                        &now,
                    ],
                )?;
                tx.last_insert_rowid()
            }
        };

        tx.commit()?;
        drop(conn);

        self.find_by_id(id)?.ok_or(RepositoryError::NotFound {
            entity: "DemandRecord".to_string(),
            id: id.to_string(),
        })
    }

    /// 按 id 查询
    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<DemandRecord>> {
        let conn = self.get_conn()?;

        conn.query_row(
            &format!("{} WHERE id = ?", SELECT_BASE),
            params![id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// 按 (order, article) 唯一键查询
    pub fn find_by_order_article(
        &self,
        order_id: i64,
        article_id: i64,
    ) -> RepositoryResult<Option<DemandRecord>> {
        let conn = self.get_conn()?;

        conn.query_row(
            &format!("{} WHERE order_id = ? AND article_id = ?", SELECT_BASE),
            params![order_id, article_id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// 查询订单全部需求行
    pub fn find_by_order(&self, order_id: i64) -> RepositoryResult<Vec<DemandRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE order_id = ? ORDER BY article_id",
            SELECT_BASE
        ))?;

        let rows = stmt
            .query_map(params![order_id], Self::map_row)?
            .collect::<Result<Vec<DemandRecord>, _>>()?;

        Ok(rows)
    }

    /// 查询订单指定状态的需求行
    pub fn find_by_order_and_status(
        &self,
        order_id: i64,
        status: DemandStatus,
    ) -> RepositoryResult<Vec<DemandRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE order_id = ? AND status = ? ORDER BY article_id",
            SELECT_BASE
        ))?;

        let rows = stmt
            .query_map(params![order_id, status.to_db_str()], Self::map_row)?
            .collect::<Result<Vec<DemandRecord>, _>>()?;

        Ok(rows)
    }

    /// 查询配件全部需求行
    pub fn find_by_article(&self, article_id: i64) -> RepositoryResult<Vec<DemandRecord>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE article_id = ? ORDER BY order_id",
            SELECT_BASE
        ))?;

        let rows = stmt
            .query_map(params![article_id], Self::map_row)?
            .collect::<Result<Vec<DemandRecord>, _>>()?;

        Ok(rows)
    }

    /// 人工修正数量（审计字段同时落库）
    ///
    /// 前置校验（数量非负、原因非空）在 API 层完成。
    pub fn manual_update(
        &self,
        demand_id: i64,
        new_quantity: i64,
        edit_reason: &str,
        edited_by: &str,
    ) -> RepositoryResult<DemandRecord> {
        let conn = self.get_conn()?;
        let now = chrono::Utc::now().naive_utc().format(TS_FMT).to_string();

        let rows = conn.execute(
            r#"UPDATE okuc_demand
               SET quantity = ?, is_manual_edit = 1,
                   edit_reason = ?, edited_by = ?, edited_at = ?,
                   updated_at = ?
               WHERE id = ?"#,
            params![new_quantity, edit_reason, edited_by, &now, &now, demand_id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "DemandRecord".to_string(),
                id: demand_id.to_string(),
            });
        }
        drop(conn);

        self.find_by_id(demand_id)?.ok_or(RepositoryError::NotFound {
            entity: "DemandRecord".to_string(),
            id: demand_id.to_string(),
        })
    }

    /// 状态流转（pending <-> completed）
    pub fn set_status(&self, demand_id: i64, status: DemandStatus) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            "UPDATE okuc_demand SET status = ?, updated_at = ? WHERE id = ?",
            params![
                status.to_db_str(),
                chrono::Utc::now().naive_utc().format(TS_FMT).to_string(),
                demand_id,
            ],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "DemandRecord".to_string(),
                id: demand_id.to_string(),
            });
        }

        Ok(())
    }

    /// 订单整单重开（RW 冲销用: completed -> pending）
    pub fn reopen_by_order(&self, order_id: i64) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            r#"UPDATE okuc_demand
               SET status = 'pending', updated_at = ?
               WHERE order_id = ? AND status = 'completed'"#,
            params![
                chrono::Utc::now().naive_utc().format(TS_FMT).to_string(),
                order_id,
            ],
        )?;

        Ok(rows)
    }

    /// 按周聚合 pending 需求（排程/采购视图）
    ///
    /// 周编号 "YYYY-Www" 按字典序比较即时间序，区间闭合。
    pub fn list_week_aggregate(
        &self,
        from_week: &str,
        to_week: &str,
    ) -> RepositoryResult<Vec<WeekDemandRow>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT d.expected_week, d.article_id, a.article_no,
                      SUM(d.quantity) AS pending_quantity
               FROM okuc_demand d
               JOIN okuc_article a ON a.id = d.article_id
               WHERE d.status = 'pending'
                 AND d.expected_week >= ? AND d.expected_week <= ?
               GROUP BY d.expected_week, d.article_id
               ORDER BY d.expected_week, a.article_no"#,
        )?;

        let rows = stmt
            .query_map(params![from_week, to_week], |row| {
                Ok(WeekDemandRow {
                    expected_week: row.get(0)?,
                    article_id: row.get(1)?,
                    article_no: row.get(2)?,
                    pending_quantity: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<WeekDemandRow>, _>>()?;

        Ok(rows)
    }

    /// 缺料报表：配件库存合计 - pending 需求合计 < 0 的配件
    ///
    /// 单条聚合查询（JOIN + GROUP BY + HAVING），缺口从大到小排序。
    pub fn shortage_report(&self) -> RepositoryResult<Vec<ShortageRow>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT a.id, a.article_no, a.name,
                      COALESCE(s.total_stock, 0) AS current_stock,
                      SUM(d.quantity) AS pending_demand
               FROM okuc_demand d
               JOIN okuc_article a ON a.id = d.article_id
               LEFT JOIN (
                   SELECT article_id, SUM(current_quantity) AS total_stock
                   FROM okuc_stock
                   GROUP BY article_id
               ) s ON s.article_id = a.id
               WHERE d.status = 'pending'
               GROUP BY a.id
               HAVING COALESCE(s.total_stock, 0) - SUM(d.quantity) < 0
               ORDER BY COALESCE(s.total_stock, 0) - SUM(d.quantity) ASC"#,
        )?;

        let rows = stmt
            .query_map([], |row| {
                let current_stock: i64 = row.get(3)?;
                let pending_demand: i64 = row.get(4)?;
                Ok(ShortageRow {
                    article_id: row.get(0)?,
                    article_no: row.get(1)?,
                    article_name: row.get(2)?,
                    current_stock,
                    pending_demand,
                    after_demand: current_stock - pending_demand,
                    shortage: (current_stock - pending_demand).abs(),
                })
            })?
            .collect::<Result<Vec<ShortageRow>, _>>()?;

        Ok(rows)
    }

    /// 配件 pending 需求合计
    pub fn pending_total_for_article(&self, article_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        let total: Option<i64> = conn.query_row(
            "SELECT SUM(quantity) FROM okuc_demand WHERE article_id = ? AND status = 'pending'",
            params![article_id],
            |row| row.get(0),
        )?;

        Ok(total.unwrap_or(0))
    }

    /// 需求整体转移（替换件切换）
    ///
    /// # 事务
    /// 全部受影响行在一个事务内迁移；任何一行失败整体回滚（禁止部分转移）。
    ///
    /// # 合并规则
    /// - 目标键 (order_id, target_article) 已有行: 数量相加合并，源行删除；
    ///   合并后状态取"更未完成"的一侧（任一侧 pending 则 pending）
    /// - 无目标行: 源行直接改指 target_article，状态与数量原样保留
    ///
    /// # 返回
    /// 被转移（含合并）的源行数
    pub fn transfer_article_demand(
        &self,
        old_article_id: i64,
        target_article_id: i64,
    ) -> RepositoryResult<usize> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now = chrono::Utc::now().naive_utc().format(TS_FMT).to_string();

        let sources: Vec<(i64, i64, i64, String)> = {
            let mut stmt = tx.prepare(
                "SELECT id, order_id, quantity, status FROM okuc_demand WHERE article_id = ?",
            )?;
            let rows = stmt
                .query_map(params![old_article_id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut transferred = 0usize;

        for (src_id, order_id, quantity, status) in sources {
            let target: Option<(i64, String)> = tx
                .query_row(
                    "SELECT id, status FROM okuc_demand WHERE order_id = ? AND article_id = ?",
                    params![order_id, target_article_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            match target {
                Some((target_id, target_status)) => {
                    let merged_status = if status == "pending" || target_status == "pending" {
                        "pending"
                    } else {
                        "completed"
                    };
                    tx.execute(
                        r#"UPDATE okuc_demand
                           SET quantity = quantity + ?, status = ?, updated_at = ?
                           WHERE id = ?"#,
                        params![quantity, merged_status, &now, target_id],
                    )?;
                    tx.execute("DELETE FROM okuc_demand WHERE id = ?", params![src_id])?;
                }
                None => {
                    tx.execute(
                        "UPDATE okuc_demand SET article_id = ?, updated_at = ? WHERE id = ?",
                        params![target_article_id, &now, src_id],
                    )?;
                }
            }

            transferred += 1;
        }

        tx.commit()?;
        Ok(transferred)
    }

    /// 映射数据库行到 DemandRecord 对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<DemandRecord> {
        let status_str: String = row.get(5)?;
        let source_str: String = row.get(6)?;
        Ok(DemandRecord {
            id: row.get(0)?,
            order_id: row.get(1)?,
            article_id: row.get(2)?,
            expected_week: row.get(3)?,
            quantity: row.get(4)?,
            status: DemandStatus::from_str(&status_str),
            source: DemandSource::from_str(&source_str),
            is_manual_edit: row.get::<_, i64>(7)? != 0,
            edit_reason: row.get(8)?,
            edited_by: row.get(9)?,
            edited_at: row
                .get::<_, Option<String>>(10)?
                .and_then(|s| NaiveDateTime::parse_from_str(&s, TS_FMT).ok()),
            created_at: parse_ts(row, 11)?,
            updated_at: parse_ts(row, 12)?,
        })
    }
}

fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&s, TS_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}
