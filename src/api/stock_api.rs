// ==========================================
// 五金配件双库存引擎 - 库存台账 API
// ==========================================
// 职责: 仓位库存查询、带重试的改量、负库存/低库存报表
// 红线合规:
// - 所有改量带乐观锁版本校验，流水同事务落库
// - 重试统一走 RetryPolicy（有界次数 + 指数退避），不在调用点散落
// - 负库存不硬拒绝，但必须告警并进入负库存报表
// ==========================================

use std::sync::Arc;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::config_manager::ConfigManager;
use crate::domain::stock::{StockHistory, StockRecord, StockSummary};
use crate::domain::types::{StockEventType, SubWarehouse, WarehouseType};
use crate::engine::replacement_resolver::ReplacementResolver;
use crate::repository::stock_repo::{NewStockRecord, StockHistoryRepository, StockRecordRepository};
use crate::repository::ArticleRepository;

// ==========================================
// StockApi - 库存台账 API
// ==========================================

/// 库存台账API
///
/// 职责：
/// 1. 仓位库存查询（含预留量回填）
/// 2. 带乐观锁的库存改量（单次尝试 / 统一重试两种入口）
/// 3. 负库存与低库存报表
/// 4. 库存清零后的需求自动转移联动
pub struct StockApi {
    stock_repo: Arc<StockRecordRepository>,
    history_repo: Arc<StockHistoryRepository>,
    article_repo: Arc<ArticleRepository>,
    demand_repo: Arc<crate::repository::DemandRepository>,
    replacement_resolver: Arc<ReplacementResolver>,
    config: Arc<ConfigManager>,
}

impl StockApi {
    pub fn new(
        stock_repo: Arc<StockRecordRepository>,
        history_repo: Arc<StockHistoryRepository>,
        article_repo: Arc<ArticleRepository>,
        demand_repo: Arc<crate::repository::DemandRepository>,
        replacement_resolver: Arc<ReplacementResolver>,
        config: Arc<ConfigManager>,
    ) -> Self {
        Self {
            stock_repo,
            history_repo,
            article_repo,
            demand_repo,
            replacement_resolver,
            config,
        }
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 查询仓位库存行
    ///
    /// 行不存在返回 Ok(None)——表示未初始化（视为 0），不是错误。
    pub fn get_stock(
        &self,
        article_id: i64,
        warehouse_type: WarehouseType,
        sub_warehouse: Option<SubWarehouse>,
    ) -> ApiResult<Option<StockRecord>> {
        let record = self
            .stock_repo
            .find_by_key(article_id, warehouse_type, sub_warehouse)?;
        Ok(record)
    }

    /// 查询仓位库存行并回填预留量（= 该配件 pending 需求合计）
    pub fn get_stock_with_reserved(
        &self,
        article_id: i64,
        warehouse_type: WarehouseType,
        sub_warehouse: Option<SubWarehouse>,
    ) -> ApiResult<Option<StockRecord>> {
        let record = self
            .stock_repo
            .find_by_key(article_id, warehouse_type, sub_warehouse)?;

        match record {
            Some(mut r) => {
                r.reserved_qty = self.demand_repo.pending_total_for_article(article_id)?;
                Ok(Some(r))
            }
            None => Ok(None),
        }
    }

    /// 负库存报表（待人工核查的仓位）
    pub fn negative_stock_report(&self) -> ApiResult<Vec<StockRecord>> {
        Ok(self.stock_repo.find_negative()?)
    }

    /// 低于最低库存线报表
    pub fn below_minimum_report(
        &self,
        warehouse_type: Option<WarehouseType>,
    ) -> ApiResult<Vec<StockRecord>> {
        Ok(self.stock_repo.find_below_minimum(warehouse_type)?)
    }

    /// 按仓位汇总
    pub fn stock_summary(
        &self,
        warehouse_type: Option<WarehouseType>,
    ) -> ApiResult<Vec<StockSummary>> {
        Ok(self.stock_repo.summary(warehouse_type)?)
    }

    /// 配件流水（时间倒序）
    pub fn stock_history(&self, article_id: i64, limit: i64) -> ApiResult<Vec<StockHistory>> {
        Ok(self.history_repo.find_by_article(article_id, limit)?)
    }

    // ==========================================
    // 写入接口
    // ==========================================

    /// 盘点初始化仓位（建行 + inventory 流水）
    pub fn init_stock(&self, record: NewStockRecord, actor: &str) -> ApiResult<StockRecord> {
        self.require_article(record.article_id)?;

        if record.current_quantity < 0 {
            return Err(ApiError::InvalidInput(
                "盘点初始数量不能为负".to_string(),
            ));
        }

        let created = self.stock_repo.create(&record)?;

        let history = StockHistory::from_change(
            created.article_id,
            created.warehouse_type,
            created.sub_warehouse,
            StockEventType::Inventory,
            0,
            created.current_quantity,
        )
        .with_reason("盘点初始化")
        .with_actor(actor);
        self.history_repo.insert(&history)?;

        info!(
            article_id = created.article_id,
            warehouse = %created.warehouse_type,
            quantity = created.current_quantity,
            "仓位已初始化"
        );
        Ok(created)
    }

    /// 单次尝试改量（调用方持有期望版本，冲突直接上抛）
    ///
    /// # 参数
    /// - delta: 改量（可为负）
    /// - expected_version: 调用方读到的版本号；不符立即返回乐观锁冲突
    /// - reason: 变更原因（必填，可审计性）
    ///
    /// # 失败语义
    /// - 版本不符: OptimisticLockFailure（可恢复——刷新重试）
    /// - 仓位未初始化: 懒建零量行后再改量
    pub fn adjust_quantity(
        &self,
        article_id: i64,
        warehouse_type: WarehouseType,
        sub_warehouse: Option<SubWarehouse>,
        delta: i64,
        expected_version: i64,
        reason: &str,
        actor: &str,
    ) -> ApiResult<StockRecord> {
        self.validate_reason(reason)?;
        self.require_article(article_id)?;

        let record = self.ensure_record(article_id, warehouse_type, sub_warehouse)?;

        let history = StockHistory::from_change(
            article_id,
            warehouse_type,
            sub_warehouse,
            StockEventType::Adjustment,
            record.current_quantity,
            delta,
        )
        .with_reason(reason)
        .with_actor(actor)
        .manual();

        let updated = self
            .stock_repo
            .adjust_quantity(record.id, delta, expected_version, &history)?;

        self.after_quantity_change(&updated);
        Ok(updated)
    }

    /// 带统一重试策略的改量（每次重试前重读当前版本）
    ///
    /// 重试耗尽仍冲突时把冲突错误上抛，调用方不会无限阻塞。
    pub fn adjust_quantity_with_retry(
        &self,
        article_id: i64,
        warehouse_type: WarehouseType,
        sub_warehouse: Option<SubWarehouse>,
        delta: i64,
        event_type: StockEventType,
        reason: &str,
        reference: Option<&str>,
        actor: &str,
    ) -> ApiResult<StockRecord> {
        self.validate_reason(reason)?;
        self.require_article(article_id)?;

        let record = self.ensure_record(article_id, warehouse_type, sub_warehouse)?;
        let stock_id = record.id;

        let policy = self.config.retry_policy();
        let stock_repo = self.stock_repo.clone();

        let updated = policy.run(|| {
            // 每次尝试重读当前数量与版本
            let current = stock_repo.find_by_id(stock_id)?.ok_or(
                crate::repository::RepositoryError::NotFound {
                    entity: "StockRecord".to_string(),
                    id: stock_id.to_string(),
                },
            )?;

            let mut history = StockHistory::from_change(
                article_id,
                warehouse_type,
                sub_warehouse,
                event_type,
                current.current_quantity,
                delta,
            )
            .with_reason(reason)
            .with_actor(actor);
            if let Some(reference) = reference {
                history = history.with_reference(reference);
            }

            stock_repo.adjust_quantity(stock_id, delta, current.version, &history)
        })?;

        self.after_quantity_change(&updated);
        Ok(updated)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 仓位懒建：未初始化视为 0 量，首次改量时建行
    fn ensure_record(
        &self,
        article_id: i64,
        warehouse_type: WarehouseType,
        sub_warehouse: Option<SubWarehouse>,
    ) -> ApiResult<StockRecord> {
        if let Some(record) = self
            .stock_repo
            .find_by_key(article_id, warehouse_type, sub_warehouse)?
        {
            return Ok(record);
        }

        let mut new_record = NewStockRecord::new(article_id, warehouse_type, sub_warehouse, 0);
        new_record.initial_quantity = None;
        new_record.is_quantity_uncertain = true; // 懒建行没有盘点依据

        info!(article_id, warehouse = %warehouse_type, "仓位未初始化，懒建零量行");
        Ok(self.stock_repo.create(&new_record)?)
    }

    /// 改量后的统一联动：负库存告警 + 库存清零自动转移
    fn after_quantity_change(&self, record: &StockRecord) {
        if record.current_quantity < 0 {
            warn!(
                article_id = record.article_id,
                warehouse = %record.warehouse_type,
                quantity = record.current_quantity,
                "库存为负，已进入负库存报表待人工核查"
            );
        }

        if self.config.auto_transfer_enabled() {
            // 自动转移失败不阻断主流程，只告警
            match self
                .replacement_resolver
                .check_and_transfer_if_stock_zero(record.article_id)
            {
                Ok(Some(transferred)) if transferred > 0 => {
                    info!(
                        article_id = record.article_id,
                        transferred, "库存变动后需求已自动转移"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(article_id = record.article_id, error = %e, "自动转移检查失败");
                }
            }
        }
    }

    fn validate_reason(&self, reason: &str) -> ApiResult<()> {
        if reason.trim().is_empty() {
            return Err(ApiError::InvalidInput(
                "变更原因不能为空（可审计性要求）".to_string(),
            ));
        }
        Ok(())
    }

    fn require_article(&self, article_id: i64) -> ApiResult<()> {
        match self.article_repo.find_by_id(article_id)? {
            Some(_) => Ok(()),
            None => Err(ApiError::NotFound(format!(
                "Article(id={})不存在",
                article_id
            ))),
        }
    }
}
