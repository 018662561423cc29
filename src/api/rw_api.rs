// ==========================================
// 五金配件双库存引擎 - 内部领料 (RW) API
// ==========================================
// 职责: 订单完工时按需求行扣减库存（RW 出库），以及误操作后的整单冲销
// 语义:
// - 扣减与流水同事务、需求置 completed；单条配件失败记入结果不中断整单
// - 冲销按流水凭证 ORDER:<id> 反向回加，需求整单重开
// - 扣减走统一重试策略（与人工校正共用 RetryPolicy）
// ==========================================

use std::sync::Arc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::api::stock_api::StockApi;
use crate::domain::types::{DemandStatus, StockEventType, WarehouseType};
use crate::repository::stock_repo::{StockHistoryRepository, StockRecordRepository};
use crate::repository::DemandRepository;

// ==========================================
// RwProcessResult - 整单处理结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RwProcessResult {
    pub order_id: i64,
    pub processed: usize,
    pub skipped: usize,
    pub errors: Vec<RwItemError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RwItemError {
    pub article_id: i64,
    pub error: String,
}

impl RwProcessResult {
    fn new(order_id: i64) -> Self {
        Self {
            order_id,
            processed: 0,
            skipped: 0,
            errors: vec![],
        }
    }
}

// ==========================================
// RwApi - 内部领料 API
// ==========================================
pub struct RwApi {
    demand_repo: Arc<DemandRepository>,
    stock_repo: Arc<StockRecordRepository>,
    history_repo: Arc<StockHistoryRepository>,
    stock_api: Arc<StockApi>,
}

impl RwApi {
    pub fn new(
        demand_repo: Arc<DemandRepository>,
        stock_repo: Arc<StockRecordRepository>,
        history_repo: Arc<StockHistoryRepository>,
        stock_api: Arc<StockApi>,
    ) -> Self {
        Self {
            demand_repo,
            stock_repo,
            history_repo,
            stock_api,
        }
    }

    /// 订单完工 RW 处理
    ///
    /// 对订单全部 pending 需求行逐条:
    /// 1. 取 RW 出库仓位（同仓优先 production 子仓，其次主仓）
    /// 2. 扣减库存（统一重试 + rw 流水，凭证 ORDER:<order_id>）
    /// 3. 需求行置 completed
    ///
    /// 仓位缺失或扣减失败的配件记入 errors/skipped，整单继续。
    pub fn process_rw_for_order(
        &self,
        order_id: i64,
        warehouse_type: WarehouseType,
        actor: &str,
    ) -> ApiResult<RwProcessResult> {
        let mut result = RwProcessResult::new(order_id);

        let demands = self
            .demand_repo
            .find_by_order_and_status(order_id, DemandStatus::Pending)?;

        if demands.is_empty() {
            info!(order_id, "订单无待处理需求，RW 跳过");
            return Ok(result);
        }

        info!(
            order_id,
            warehouse = %warehouse_type,
            demands = demands.len(),
            "开始处理订单 RW"
        );

        let reference = format!("ORDER:{}", order_id);
        for demand in demands {
            let outcome = self.process_single_demand(
                demand.article_id,
                demand.id,
                demand.quantity,
                warehouse_type,
                &reference,
                order_id,
                actor,
            );

            match outcome {
                Ok(()) => result.processed += 1,
                Err(e) => {
                    warn!(
                        order_id,
                        article_id = demand.article_id,
                        error = %e,
                        "RW 单条配件处理失败"
                    );
                    result.errors.push(RwItemError {
                        article_id: demand.article_id,
                        error: e.to_string(),
                    });
                    result.skipped += 1;
                }
            }
        }

        info!(
            order_id,
            processed = result.processed,
            skipped = result.skipped,
            errors = result.errors.len(),
            "订单 RW 处理完成"
        );
        Ok(result)
    }

    /// 整单 RW 冲销（订单状态回退时使用，谨慎调用）
    ///
    /// 按 rw 流水凭证反向回加库存（return 流水，凭证 ORDER:<id>:REVERSE），
    /// 并把该订单 completed 需求整单重开为 pending。
    pub fn reverse_rw_for_order(&self, order_id: i64, actor: &str) -> ApiResult<RwProcessResult> {
        let mut result = RwProcessResult::new(order_id);

        let reference = format!("ORDER:{}", order_id);
        let entries = self
            .history_repo
            .find_by_reference_and_type(&reference, StockEventType::Rw)?;

        if entries.is_empty() {
            info!(order_id, "订单无 RW 流水可冲销");
            return Ok(result);
        }

        let reverse_reference = format!("ORDER:{}:REVERSE", order_id);
        for entry in entries {
            // change_qty 为负（出库），取反即回加量
            let reverse_qty = -entry.change_qty;

            let outcome = self.stock_api.adjust_quantity_with_retry(
                entry.article_id,
                entry.warehouse_type,
                entry.sub_warehouse,
                reverse_qty,
                StockEventType::Return,
                &format!("RW 冲销 - 订单 {}", order_id),
                Some(&reverse_reference),
                actor,
            );

            match outcome {
                Ok(_) => result.processed += 1,
                Err(e) => {
                    warn!(
                        order_id,
                        article_id = entry.article_id,
                        error = %e,
                        "RW 冲销单条失败"
                    );
                    result.errors.push(RwItemError {
                        article_id: entry.article_id,
                        error: e.to_string(),
                    });
                    result.skipped += 1;
                }
            }
        }

        let reopened = self.demand_repo.reopen_by_order(order_id)?;
        info!(
            order_id,
            processed = result.processed,
            reopened, "RW 冲销完成，需求已整单重开"
        );
        Ok(result)
    }

    /// 单条需求的扣减 + 完成
    ///
    /// 出库仓位必须已存在（同仓优先 production 子仓，其次主仓）；
    /// 仓位缺失报错而不懒建——RW 不应在空仓位上制造负库存行。
    #[allow(clippy::too_many_arguments)]
    fn process_single_demand(
        &self,
        article_id: i64,
        demand_id: i64,
        quantity: i64,
        warehouse_type: WarehouseType,
        reference: &str,
        order_id: i64,
        actor: &str,
    ) -> ApiResult<()> {
        let candidate = self
            .stock_repo
            .find_rw_candidate(article_id, warehouse_type)?
            .ok_or_else(|| {
                ApiError::NotFound(format!(
                    "配件{}在{}仓无可出库仓位",
                    article_id,
                    warehouse_type.to_db_str().to_uppercase()
                ))
            })?;

        self.stock_api.adjust_quantity_with_retry(
            article_id,
            warehouse_type,
            candidate.sub_warehouse,
            -quantity,
            StockEventType::Rw,
            &format!("RW - 订单 {}", order_id),
            Some(reference),
            actor,
        )?;

        self.demand_repo.set_status(demand_id, DemandStatus::Completed)?;
        Ok(())
    }
}
