// ==========================================
// 五金配件双库存引擎 - 需求领域模型
// ==========================================
// 约束: (order_id, article_id) 至多一条活跃行，修正改写原行
// 人工修正必须给出 edit_reason（可审计性）
// ==========================================

use crate::domain::types::{DemandSource, DemandStatus};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// DemandRecord - 订单配件需求行
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DemandRecord {
    pub id: i64,
    pub order_id: i64,          // 生产订单（外部实体，仅存 id）
    pub article_id: i64,
    pub expected_week: String,  // 需求周 "YYYY-Www"
    pub quantity: i64,          // 需求数量（>= 0）
    pub status: DemandStatus,
    pub source: DemandSource,

    // ===== 人工修正审计 =====
    pub is_manual_edit: bool,
    pub edit_reason: Option<String>, // is_manual_edit=true 时必填
    pub edited_by: Option<String>,
    pub edited_at: Option<NaiveDateTime>,

    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl DemandRecord {
    pub fn is_pending(&self) -> bool {
        self.status == DemandStatus::Pending
    }
}

// ==========================================
// WeekDemandRow - 按周聚合行
// ==========================================
// 用途: 排程/采购计划视图（listByWeek）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeekDemandRow {
    pub expected_week: String,
    pub article_id: i64,
    pub article_no: String,
    pub pending_quantity: i64, // 该周该配件 pending 合计
}
