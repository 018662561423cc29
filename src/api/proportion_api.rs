// ==========================================
// 五金配件双库存引擎 - 比例关系管理 API
// ==========================================
// 职责: 比例关系 CRUD 与创建期配置校验
// 校验全部在创建/激活时完成，解析期不再检查（见比例解析引擎头注释）:
// - 禁止自引用、重复边
// - 同源只允许一种出边类型（multiplier 与 split 不混用）
// - split 百分比 (0, 100]，同源激活 split 合计不超过 100
// - 新边不得使激活图成环
// ==========================================

use std::sync::Arc;
use tracing::info;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::proportion::{NewProportion, Proportion};
use crate::domain::types::ProportionType;
use crate::engine::proportion_resolver::ProportionResolver;
use crate::repository::{ArticleRepository, ProportionRepository};

/// 同源 split 百分比合计允许的浮点误差
const SPLIT_SUM_EPSILON: f64 = 0.01;

// ==========================================
// ProportionApi - 比例关系管理 API
// ==========================================
pub struct ProportionApi {
    proportion_repo: Arc<ProportionRepository>,
    article_repo: Arc<ArticleRepository>,
    resolver: Arc<ProportionResolver>,
}

impl ProportionApi {
    pub fn new(
        proportion_repo: Arc<ProportionRepository>,
        article_repo: Arc<ArticleRepository>,
        resolver: Arc<ProportionResolver>,
    ) -> Self {
        Self {
            proportion_repo,
            article_repo,
            resolver,
        }
    }

    /// 创建比例关系（全部配置校验在此完成）
    pub fn create(&self, proportion: NewProportion) -> ApiResult<Proportion> {
        self.validate_articles(&proportion)?;
        self.validate_values(&proportion)?;

        if self
            .proportion_repo
            .exists(proportion.source_article_id, proportion.target_article_id)?
        {
            return Err(ApiError::ValidationError(format!(
                "比例关系已存在: {} -> {}",
                proportion.source_article_id, proportion.target_article_id
            )));
        }

        self.validate_against_siblings(
            proportion.source_article_id,
            proportion.proportion_type,
            proportion.split_percent,
            None,
        )?;

        if self
            .resolver
            .would_create_cycle(proportion.source_article_id, proportion.target_article_id)?
        {
            return Err(ApiError::CycleError(format!(
                "比例关系将形成环: {} -> {}",
                proportion.source_article_id, proportion.target_article_id
            )));
        }

        let created = self.proportion_repo.create(&proportion)?;
        info!(
            proportion_id = created.id,
            source = created.source_article_id,
            target = created.target_article_id,
            proportion_type = %created.proportion_type,
            "比例关系已创建"
        );
        Ok(created)
    }

    /// 修改数值参数（方向与类型不可改——改类型应停用后重建）
    pub fn update_values(
        &self,
        id: i64,
        ratio: Option<f64>,
        split_percent: Option<f64>,
        tolerance: Option<f64>,
    ) -> ApiResult<Proportion> {
        let existing = self.require(id)?;

        if let Some(r) = ratio {
            if r <= 0.0 {
                return Err(ApiError::ValidationError(format!("ratio 必须为正: {}", r)));
            }
        }
        if let Some(t) = tolerance {
            if t < 0.0 {
                return Err(ApiError::ValidationError(format!(
                    "tolerance 不能为负: {}",
                    t
                )));
            }
        }
        if let Some(p) = split_percent {
            if existing.proportion_type != ProportionType::Split {
                return Err(ApiError::ValidationError(
                    "multiplier 边不接受 split_percent".to_string(),
                ));
            }
            if p <= 0.0 || p > 100.0 {
                return Err(ApiError::ValidationError(format!(
                    "split_percent 必须在 (0, 100] 内: {}",
                    p
                )));
            }
            if existing.is_active {
                self.validate_against_siblings(
                    existing.source_article_id,
                    ProportionType::Split,
                    Some(p),
                    Some(id),
                )?;
            }
        }

        Ok(self
            .proportion_repo
            .update_values(id, ratio, split_percent, tolerance)?)
    }

    /// 软停用（历史解析保持可追溯）
    pub fn deactivate(&self, id: i64) -> ApiResult<()> {
        let existing = self.require(id)?;
        if !existing.is_active {
            return Err(ApiError::ValidationError(format!(
                "比例关系已是停用状态: id={}",
                id
            )));
        }

        self.proportion_repo.deactivate(id)?;
        info!(proportion_id = id, "比例关系已停用");
        Ok(())
    }

    /// 重新激活（按创建期同样的规则复检——停用期间图可能已变化）
    pub fn activate(&self, id: i64) -> ApiResult<()> {
        let existing = self.require(id)?;
        if existing.is_active {
            return Err(ApiError::ValidationError(format!(
                "比例关系已是激活状态: id={}",
                id
            )));
        }

        self.validate_against_siblings(
            existing.source_article_id,
            existing.proportion_type,
            existing.split_percent,
            Some(id),
        )?;

        if self
            .resolver
            .would_create_cycle(existing.source_article_id, existing.target_article_id)?
        {
            return Err(ApiError::CycleError(format!(
                "激活将使比例图成环: {} -> {}",
                existing.source_article_id, existing.target_article_id
            )));
        }

        self.proportion_repo.activate(id)?;
        info!(proportion_id = id, "比例关系已激活");
        Ok(())
    }

    /// 查询全部（可选只看激活）
    pub fn list(&self, active_only: bool) -> ApiResult<Vec<Proportion>> {
        Ok(self.proportion_repo.find_all(active_only)?)
    }

    /// 按 id 查询
    pub fn get(&self, id: i64) -> ApiResult<Proportion> {
        self.require(id)
    }

    // ==========================================
    // 校验辅助
    // ==========================================

    fn validate_articles(&self, proportion: &NewProportion) -> ApiResult<()> {
        if proportion.source_article_id == proportion.target_article_id {
            return Err(ApiError::ValidationError(
                "源件与目标件不能相同".to_string(),
            ));
        }

        for id in [proportion.source_article_id, proportion.target_article_id] {
            if self.article_repo.find_by_id(id)?.is_none() {
                return Err(ApiError::NotFound(format!("Article(id={})不存在", id)));
            }
        }

        Ok(())
    }

    fn validate_values(&self, proportion: &NewProportion) -> ApiResult<()> {
        if proportion.tolerance < 0.0 {
            return Err(ApiError::ValidationError(format!(
                "tolerance 不能为负: {}",
                proportion.tolerance
            )));
        }

        match proportion.proportion_type {
            ProportionType::Multiplier => {
                if proportion.ratio <= 0.0 {
                    return Err(ApiError::ValidationError(format!(
                        "ratio 必须为正: {}",
                        proportion.ratio
                    )));
                }
            }
            ProportionType::Split => {
                let percent = proportion.split_percent.ok_or_else(|| {
                    ApiError::ValidationError("split 边必须提供 split_percent".to_string())
                })?;
                if percent <= 0.0 || percent > 100.0 {
                    return Err(ApiError::ValidationError(format!(
                        "split_percent 必须在 (0, 100] 内: {}",
                        percent
                    )));
                }
            }
        }

        Ok(())
    }

    /// 与同源既有激活边的一致性校验
    ///
    /// - 出边类型必须一致（混用是配置错误，解析器按单类型展开）
    /// - split 百分比合计不超过 100（允许渐进配置，不足 100 在解析期按守恒规则报错）
    fn validate_against_siblings(
        &self,
        source_article_id: i64,
        proportion_type: ProportionType,
        split_percent: Option<f64>,
        exclude_id: Option<i64>,
    ) -> ApiResult<()> {
        let siblings: Vec<Proportion> = self
            .proportion_repo
            .find_active_by_source(source_article_id)?
            .into_iter()
            .filter(|p| Some(p.id) != exclude_id)
            .collect();

        if let Some(first) = siblings.first() {
            if first.proportion_type != proportion_type {
                return Err(ApiError::ValidationError(format!(
                    "同源出边类型不可混用: source={} 已有 {} 边",
                    source_article_id, first.proportion_type
                )));
            }
        }

        if proportion_type == ProportionType::Split {
            let existing_sum: f64 = siblings.iter().filter_map(|p| p.split_percent).sum();
            let new_sum = existing_sum + split_percent.unwrap_or(0.0);
            if new_sum > 100.0 + SPLIT_SUM_EPSILON {
                return Err(ApiError::ValidationError(format!(
                    "同源 split 百分比合计超出 100: {:.2}",
                    new_sum
                )));
            }
        }

        Ok(())
    }

    fn require(&self, id: i64) -> ApiResult<Proportion> {
        self.proportion_repo
            .find_by_id(id)?
            .ok_or_else(|| ApiError::NotFound(format!("Proportion(id={})不存在", id)))
    }
}
