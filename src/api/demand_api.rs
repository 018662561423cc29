// ==========================================
// 五金配件双库存引擎 - 需求跟踪 API
// ==========================================
// 职责: 需求行生命周期（建立/人工修正/完成/重开）与计划视图
// 红线合规:
// - 落库前必须 resolve_live：新需求永远记在当前活跃件上
// - 人工修正必须给出非空原因
// - (order_id, article_id) 唯一，修正改写原行
// ==========================================

use std::sync::Arc;
use tracing::{debug, info};

use crate::api::error::{ApiError, ApiResult};
use crate::domain::demand::{DemandRecord, WeekDemandRow};
use crate::domain::stock::ShortageRow;
use crate::domain::types::{is_valid_week, DemandSource, DemandStatus};
use crate::engine::proportion_resolver::ProportionResolver;
use crate::engine::replacement_resolver::ReplacementResolver;
use crate::repository::DemandRepository;

// ==========================================
// DemandApi - 需求跟踪 API
// ==========================================
pub struct DemandApi {
    demand_repo: Arc<DemandRepository>,
    replacement_resolver: Arc<ReplacementResolver>,
    proportion_resolver: Arc<ProportionResolver>,
}

impl DemandApi {
    pub fn new(
        demand_repo: Arc<DemandRepository>,
        replacement_resolver: Arc<ReplacementResolver>,
        proportion_resolver: Arc<ProportionResolver>,
    ) -> Self {
        Self {
            demand_repo,
            replacement_resolver,
            proportion_resolver,
        }
    }

    // ==========================================
    // 写入接口
    // ==========================================

    /// 建立/更新需求行（订单 BOM 变更入口）
    ///
    /// # 集成规则
    /// 落库前先 resolve_live(article_id)：配件若已被替换，
    /// 需求直接记在链末端活跃件上，台账与比例解析器不感知替换。
    ///
    /// # 约束
    /// - quantity >= 0（负数拒绝）
    /// - expected_week 为 "YYYY-Www" 格式
    /// - 同键已有行则改写数量（不建重复行），并清除人工修正标记
    pub fn upsert_demand(
        &self,
        order_id: i64,
        article_id: i64,
        expected_week: &str,
        quantity: i64,
        source: DemandSource,
    ) -> ApiResult<DemandRecord> {
        if quantity < 0 {
            return Err(ApiError::ValidationError(format!(
                "需求数量不能为负: {}",
                quantity
            )));
        }
        self.validate_week(expected_week)?;

        let live_article_id = self.replacement_resolver.resolve_live(article_id)?;
        if live_article_id != article_id {
            debug!(
                article_id,
                live_article_id, "需求落库前已重定向到活跃件"
            );
        }

        let record = self.demand_repo.upsert(
            order_id,
            live_article_id,
            expected_week,
            quantity,
            source,
        )?;

        info!(
            order_id,
            article_id = live_article_id,
            quantity,
            "需求行已写入"
        );
        Ok(record)
    }

    /// 一站式需求摄入: 比例展开 + 活跃件重定向 + 逐行落库
    ///
    /// 订单摄入方对一条逻辑需求调用一次；返回实际写入的需求行。
    pub fn ingest_requirement(
        &self,
        order_id: i64,
        source_article_id: i64,
        expected_week: &str,
        quantity: i64,
    ) -> ApiResult<Vec<DemandRecord>> {
        let lines = self
            .proportion_resolver
            .resolve_demand(source_article_id, quantity)?;

        let mut records = Vec::with_capacity(lines.len());
        for line in lines {
            records.push(self.upsert_demand(
                order_id,
                line.article_id,
                expected_week,
                line.quantity,
                DemandSource::Order,
            )?);
        }

        Ok(records)
    }

    /// 人工修正数量
    ///
    /// # 约束
    /// - edit_reason 非空（可审计性）
    /// - new_quantity >= 0
    pub fn manual_correct(
        &self,
        demand_id: i64,
        new_quantity: i64,
        edit_reason: &str,
        edited_by: &str,
    ) -> ApiResult<DemandRecord> {
        if edit_reason.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "人工修正必须填写原因".to_string(),
            ));
        }
        if new_quantity < 0 {
            return Err(ApiError::ValidationError(format!(
                "需求数量不能为负: {}",
                new_quantity
            )));
        }

        let record =
            self.demand_repo
                .manual_update(demand_id, new_quantity, edit_reason, edited_by)?;

        info!(demand_id, new_quantity, edited_by, "需求已人工修正");
        Ok(record)
    }

    /// 完成（生产领料消耗）
    pub fn complete(&self, demand_id: i64) -> ApiResult<()> {
        self.demand_repo.set_status(demand_id, DemandStatus::Completed)?;
        debug!(demand_id, "需求已完成");
        Ok(())
    }

    /// 重开（订单返工）
    pub fn reopen(&self, demand_id: i64) -> ApiResult<()> {
        self.demand_repo.set_status(demand_id, DemandStatus::Pending)?;
        debug!(demand_id, "需求已重开");
        Ok(())
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 按周聚合 pending 需求（闭区间）
    pub fn list_by_week(&self, from_week: &str, to_week: &str) -> ApiResult<Vec<WeekDemandRow>> {
        self.validate_week(from_week)?;
        self.validate_week(to_week)?;
        if from_week > to_week {
            return Err(ApiError::InvalidInput(format!(
                "周区间颠倒: {} > {}",
                from_week, to_week
            )));
        }

        Ok(self.demand_repo.list_week_aggregate(from_week, to_week)?)
    }

    /// 缺料报表（现有库存 - pending 需求 < 0 的配件，缺口从大到小）
    pub fn shortage_report(&self) -> ApiResult<Vec<ShortageRow>> {
        Ok(self.demand_repo.shortage_report()?)
    }

    /// 订单全部需求行
    pub fn list_by_order(&self, order_id: i64) -> ApiResult<Vec<DemandRecord>> {
        Ok(self.demand_repo.find_by_order(order_id)?)
    }

    /// 配件全部需求行
    pub fn list_by_article(&self, article_id: i64) -> ApiResult<Vec<DemandRecord>> {
        Ok(self.demand_repo.find_by_article(article_id)?)
    }

    /// 按 id 查询
    pub fn get_demand(&self, demand_id: i64) -> ApiResult<DemandRecord> {
        self.demand_repo
            .find_by_id(demand_id)?
            .ok_or_else(|| ApiError::NotFound(format!("DemandRecord(id={})不存在", demand_id)))
    }

    fn validate_week(&self, week: &str) -> ApiResult<()> {
        if !is_valid_week(week) {
            return Err(ApiError::InvalidInput(format!(
                "周编号格式错误（应为 YYYY-Www）: {}",
                week
            )));
        }
        Ok(())
    }
}
