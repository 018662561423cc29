// ==========================================
// 五金配件双库存引擎 - 配件主数据仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
// 替换边的环检测在引擎层完成，仓储只负责读写 replaced_by_article_id
// ==========================================

use crate::domain::article::Article;
use crate::domain::types::OrderUnit;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

pub struct ArticleRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ArticleRepository {
    /// 创建新的 ArticleRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建配件（目录导入入口），返回数据库分配的 id
    pub fn create(&self, article: &Article) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO okuc_article (
                article_no, name, description, order_unit,
                used_in_pvc, used_in_alu, is_phase_out,
                replaced_by_article_id, demand_transferred_at,
                created_at, deleted_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &article.article_no,
                &article.name,
                &article.description,
                article.order_unit.to_db_str(),
                article.used_in_pvc as i64,
                article.used_in_alu as i64,
                article.is_phase_out as i64,
                &article.replaced_by_article_id,
                &article
                    .demand_transferred_at
                    .map(|t| t.format(TS_FMT).to_string()),
                article.created_at.format(TS_FMT).to_string(),
                &article.deleted_at.map(|t| t.format(TS_FMT).to_string()),
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// 按内部 id 查询（排除软删除）
    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Article>> {
        let conn = self.get_conn()?;

        conn.query_row(
            &format!("{} WHERE id = ? AND deleted_at IS NULL", SELECT_BASE),
            params![id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// 按外部编码查询（排除软删除）
    pub fn find_by_article_no(&self, article_no: &str) -> RepositoryResult<Option<Article>> {
        let conn = self.get_conn()?;

        conn.query_row(
            &format!("{} WHERE article_no = ? AND deleted_at IS NULL", SELECT_BASE),
            params![article_no],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// 查询全部停产淘汰中的配件
    pub fn find_phase_out(&self) -> RepositoryResult<Vec<Article>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE is_phase_out = 1 AND deleted_at IS NULL ORDER BY article_no",
            SELECT_BASE
        ))?;

        let articles = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<Article>, _>>()?;

        Ok(articles)
    }

    /// 写入/清除替换边
    ///
    /// 说明：
    /// - new_id = Some(..): 配置 old -> new，标记 is_phase_out
    /// - new_id = None:     撤销淘汰，清除边与转移标记
    /// - 任何改边都会清空 demand_transferred_at（重新允许自动转移）
    pub fn set_replacement_edge(&self, old_id: i64, new_id: Option<i64>) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            r#"UPDATE okuc_article
               SET replaced_by_article_id = ?,
                   is_phase_out = ?,
                   demand_transferred_at = NULL
               WHERE id = ? AND deleted_at IS NULL"#,
            params![&new_id, new_id.is_some() as i64, old_id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Article".to_string(),
                id: old_id.to_string(),
            });
        }

        Ok(())
    }

    /// 记录需求已转移时间（自动转移的去重标记）
    pub fn mark_demand_transferred(&self, article_id: i64, ts: NaiveDateTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        conn.execute(
            "UPDATE okuc_article SET demand_transferred_at = ? WHERE id = ?",
            params![ts.format(TS_FMT).to_string(), article_id],
        )?;

        Ok(())
    }

    /// 配件全部仓位库存合计
    pub fn total_stock(&self, article_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        let total: Option<i64> = conn.query_row(
            "SELECT SUM(current_quantity) FROM okuc_stock WHERE article_id = ?",
            params![article_id],
            |row| row.get(0),
        )?;

        Ok(total.unwrap_or(0))
    }

    /// 仍指向该配件的 pending 需求行数
    pub fn count_pending_demands(&self, article_id: i64) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM okuc_demand WHERE article_id = ? AND status = 'pending'",
            params![article_id],
            |row| row.get(0),
        )?;

        Ok(count)
    }

    /// 软删除（仅限从未被库存/需求引用的配件，由调用方保证）
    pub fn soft_delete(&self, id: i64, ts: NaiveDateTime) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            "UPDATE okuc_article SET deleted_at = ? WHERE id = ? AND deleted_at IS NULL",
            params![ts.format(TS_FMT).to_string(), id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Article".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    /// 映射数据库行到 Article 对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Article> {
        let order_unit_str: String = row.get(3)?;
        Ok(Article {
            id: row.get(0)?,
            article_no: row.get(1)?,
            name: row.get(2)?,
            order_unit: OrderUnit::from_str(&order_unit_str),
            description: row.get(4)?,
            used_in_pvc: row.get::<_, i64>(5)? != 0,
            used_in_alu: row.get::<_, i64>(6)? != 0,
            is_phase_out: row.get::<_, i64>(7)? != 0,
            replaced_by_article_id: row.get(8)?,
            demand_transferred_at: parse_ts_opt(row.get::<_, Option<String>>(9)?),
            created_at: parse_ts(row, 10)?,
            deleted_at: parse_ts_opt(row.get::<_, Option<String>>(11)?),
        })
    }
}

const SELECT_BASE: &str = r#"SELECT id, article_no, name, order_unit, description,
       used_in_pvc, used_in_alu, is_phase_out,
       replaced_by_article_id, demand_transferred_at,
       created_at, deleted_at
FROM okuc_article"#;

fn parse_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let s: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&s, TS_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_ts_opt(s: Option<String>) -> Option<NaiveDateTime> {
    s.and_then(|v| NaiveDateTime::parse_from_str(&v, TS_FMT).ok())
}
