// ==========================================
// 五金配件双库存引擎 - 比例关系仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 配置校验（混类型/分摊百分比/自引用）在 API 层创建时完成
// 停用走 is_active=0 软停用，保留历史解析可追溯性
// ==========================================

use crate::domain::proportion::{NewProportion, Proportion};
use crate::domain::types::ProportionType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

const TS_FMT: &str = "%Y-%m-%d %H:%M:%S";

const SELECT_BASE: &str = r#"SELECT id, source_article_id, target_article_id,
       proportion_type, ratio, split_percent, tolerance, is_active, created_at
FROM okuc_proportion"#;

pub struct ProportionRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ProportionRepository {
    /// 创建新的 ProportionRepository 实例
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建比例关系
    pub fn create(&self, proportion: &NewProportion) -> RepositoryResult<Proportion> {
        let conn = self.get_conn()?;
        let now = chrono::Utc::now().naive_utc();

        conn.execute(
            r#"INSERT INTO okuc_proportion (
                source_article_id, target_article_id, proportion_type,
                ratio, split_percent, tolerance, is_active, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, 1, ?)"#,
            params![
                proportion.source_article_id,
                proportion.target_article_id,
                proportion.proportion_type.to_db_str(),
                proportion.ratio,
                proportion.split_percent,
                proportion.tolerance,
                now.format(TS_FMT).to_string(),
            ],
        )?;

        let id = conn.last_insert_rowid();
        drop(conn);

        self.find_by_id(id)?.ok_or(RepositoryError::NotFound {
            entity: "Proportion".to_string(),
            id: id.to_string(),
        })
    }

    /// 按 id 查询
    pub fn find_by_id(&self, id: i64) -> RepositoryResult<Option<Proportion>> {
        let conn = self.get_conn()?;

        conn.query_row(
            &format!("{} WHERE id = ?", SELECT_BASE),
            params![id],
            Self::map_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// 查询全部（可选只看激活）
    pub fn find_all(&self, active_only: bool) -> RepositoryResult<Vec<Proportion>> {
        let conn = self.get_conn()?;

        let sql = if active_only {
            format!("{} WHERE is_active = 1 ORDER BY source_article_id, id", SELECT_BASE)
        } else {
            format!("{} ORDER BY source_article_id, id", SELECT_BASE)
        };

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], Self::map_row)?
            .collect::<Result<Vec<Proportion>, _>>()?;

        Ok(rows)
    }

    /// 查询某源件的全部激活出边（解析遍历入口）
    pub fn find_active_by_source(&self, source_article_id: i64) -> RepositoryResult<Vec<Proportion>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE source_article_id = ? AND is_active = 1 ORDER BY id",
            SELECT_BASE
        ))?;

        let rows = stmt
            .query_map(params![source_article_id], Self::map_row)?
            .collect::<Result<Vec<Proportion>, _>>()?;

        Ok(rows)
    }

    /// 同向边是否已存在（含停用边，受唯一约束限制）
    pub fn exists(&self, source_article_id: i64, target_article_id: i64) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;

        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM okuc_proportion WHERE source_article_id = ? AND target_article_id = ?",
                params![source_article_id, target_article_id],
                |row| row.get(0),
            )
            .optional()?;

        Ok(found.is_some())
    }

    /// 修改数值参数（不允许改方向与类型——改类型应停用后重建）
    pub fn update_values(
        &self,
        id: i64,
        ratio: Option<f64>,
        split_percent: Option<f64>,
        tolerance: Option<f64>,
    ) -> RepositoryResult<Proportion> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            r#"UPDATE okuc_proportion
               SET ratio = COALESCE(?, ratio),
                   split_percent = COALESCE(?, split_percent),
                   tolerance = COALESCE(?, tolerance)
               WHERE id = ?"#,
            params![ratio, split_percent, tolerance, id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Proportion".to_string(),
                id: id.to_string(),
            });
        }
        drop(conn);

        self.find_by_id(id)?.ok_or(RepositoryError::NotFound {
            entity: "Proportion".to_string(),
            id: id.to_string(),
        })
    }

    /// 软停用
    pub fn deactivate(&self, id: i64) -> RepositoryResult<()> {
        self.set_active(id, false)
    }

    /// 重新激活
    pub fn activate(&self, id: i64) -> RepositoryResult<()> {
        self.set_active(id, true)
    }

    fn set_active(&self, id: i64, active: bool) -> RepositoryResult<()> {
        let conn = self.get_conn()?;

        let rows = conn.execute(
            "UPDATE okuc_proportion SET is_active = ? WHERE id = ?",
            params![active as i64, id],
        )?;

        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Proportion".to_string(),
                id: id.to_string(),
            });
        }

        Ok(())
    }

    /// 映射数据库行到 Proportion 对象
    fn map_row(row: &rusqlite::Row) -> rusqlite::Result<Proportion> {
        let type_str: String = row.get(3)?;
        Ok(Proportion {
            id: row.get(0)?,
            source_article_id: row.get(1)?,
            target_article_id: row.get(2)?,
            proportion_type: ProportionType::from_str(&type_str)
                .unwrap_or(ProportionType::Multiplier),
            ratio: row.get(4)?,
            split_percent: row.get(5)?,
            tolerance: row.get(6)?,
            is_active: row.get::<_, i64>(7)? != 0,
            created_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(8)?, TS_FMT).map_err(
                |e| {
                    rusqlite::Error::FromSqlConversionFailure(
                        8,
                        rusqlite::types::Type::Text,
                        Box::new(e),
                    )
                },
            )?,
        })
    }
}
