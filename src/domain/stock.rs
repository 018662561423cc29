// ==========================================
// 五金配件双库存引擎 - 库存领域模型
// ==========================================
// 约束: (article_id, warehouse_type, sub_warehouse) 全库唯一，一行一个仓位
// 并发: version 单调递增，所有改量必须带版本校验（乐观锁）
// 负库存: 不做硬约束，允许写入但进入负库存报表待人工核查
// ==========================================

use crate::domain::types::{StockEventType, SubWarehouse, WarehouseType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// StockRecord - 仓位库存行
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockRecord {
    // ===== 主键与定位 =====
    pub id: i64,
    pub article_id: i64,
    pub warehouse_type: WarehouseType,
    pub sub_warehouse: Option<SubWarehouse>, // None = 主仓

    // ===== 数量 =====
    pub current_quantity: i64,       // 当前数量（可为负，负值进报表）
    pub initial_quantity: Option<i64>, // 盘点初始数量
    pub reserved_qty: i64,           // 预留量（= 活跃需求合计，由查询侧回填）
    pub min_stock: Option<i64>,      // 最低库存告警线
    pub max_stock: Option<i64>,      // 最高库存参考线
    pub is_quantity_uncertain: bool, // 初始盘点为估算值

    // ===== 并发控制 =====
    pub version: i64, // 乐观锁版本号，成功改量 +1

    pub updated_at: NaiveDateTime,
}

impl StockRecord {
    /// 可用量 = 当前数量 - 预留量
    pub fn available(&self) -> i64 {
        self.current_quantity - self.reserved_qty
    }

    /// 是否低于最低库存线
    pub fn below_minimum(&self) -> bool {
        match self.min_stock {
            Some(min) => self.current_quantity < min,
            None => false,
        }
    }

    /// 自盘点以来的消耗量（未设初始盘点时为 None）
    pub fn consumed_since_initial(&self) -> Option<i64> {
        self.initial_quantity.map(|init| init - self.current_quantity)
    }
}

// ==========================================
// StockHistory - 库存流水（只追加）
// ==========================================
// 约束: 每次成功改量必须落一条流水，与改量同事务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockHistory {
    pub history_id: String, // UUID
    pub article_id: i64,
    pub warehouse_type: WarehouseType,
    pub sub_warehouse: Option<SubWarehouse>,
    pub event_type: StockEventType,
    pub previous_qty: i64,
    pub change_qty: i64,
    pub new_qty: i64,
    pub reason: Option<String>,    // 变更原因（人工校正必填）
    pub reference: Option<String>, // 关联凭证，如 "ORDER:42"
    pub is_manual_edit: bool,
    pub actor: Option<String>, // 操作人
    pub recorded_at: NaiveDateTime,
}

impl StockHistory {
    /// 由一次改量构造流水行
    pub fn from_change(
        article_id: i64,
        warehouse_type: WarehouseType,
        sub_warehouse: Option<SubWarehouse>,
        event_type: StockEventType,
        previous_qty: i64,
        change_qty: i64,
    ) -> Self {
        Self {
            history_id: uuid::Uuid::new_v4().to_string(),
            article_id,
            warehouse_type,
            sub_warehouse,
            event_type,
            previous_qty,
            change_qty,
            new_qty: previous_qty + change_qty,
            reason: None,
            reference: None,
            is_manual_edit: false,
            actor: None,
            recorded_at: chrono::Utc::now().naive_utc(),
        }
    }

    pub fn with_reason(mut self, reason: &str) -> Self {
        self.reason = Some(reason.to_string());
        self
    }

    pub fn with_reference(mut self, reference: &str) -> Self {
        self.reference = Some(reference.to_string());
        self
    }

    pub fn with_actor(mut self, actor: &str) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn manual(mut self) -> Self {
        self.is_manual_edit = true;
        self
    }
}

// ==========================================
// StockSummary - 按仓位的汇总行
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockSummary {
    pub warehouse_type: WarehouseType,
    pub sub_warehouse: Option<SubWarehouse>,
    pub total_articles: i64,
    pub total_quantity: i64,
    pub below_min_count: i64,
}

// ==========================================
// ShortageRow - 缺料报表行
// ==========================================
// 口径: 配件全仓位库存合计 - pending 需求合计 < 0 的配件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortageRow {
    pub article_id: i64,
    pub article_no: String,
    pub article_name: String,
    pub current_stock: i64,
    pub pending_demand: i64,
    pub after_demand: i64, // current_stock - pending_demand（负值）
    pub shortage: i64,     // 缺口绝对值
}
