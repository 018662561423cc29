// ==========================================
// 五金配件双库存引擎 - 配件主数据领域模型
// ==========================================
// 约束: 配件一经库存/需求引用不得物理删除（软删除 deleted_at）
// 替换关系: replaced_by_article_id 自引用，链式替换沿指针追到末端
// ==========================================

use crate::domain::types::OrderUnit;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Article - 配件主数据
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    // ===== 主键 =====
    pub id: i64,                // 内部代理主键
    pub article_no: String,     // 外部稳定编码（如 "201-NEW"），全局唯一

    // ===== 基本属性 =====
    pub name: String,           // 显示名称
    pub description: Option<String>,
    pub order_unit: OrderUnit,  // 订购单位
    pub used_in_pvc: bool,      // PVC 产线使用
    pub used_in_alu: bool,      // 铝产线使用

    // ===== 替换（停产件 -> 替换件） =====
    pub is_phase_out: bool,                    // 是否处于停产淘汰流程
    pub replaced_by_article_id: Option<i64>,   // 直接替换件（至多一个）
    pub demand_transferred_at: Option<NaiveDateTime>, // 需求已转移时间（自动转移去重标记）

    // ===== 生命周期 =====
    pub created_at: NaiveDateTime,
    pub deleted_at: Option<NaiveDateTime>, // 软删除标记
}

impl Article {
    /// 创建新的配件（目录导入入口）
    pub fn new(article_no: &str, name: &str) -> Self {
        Self {
            id: 0, // 插入后由数据库分配
            article_no: article_no.to_string(),
            name: name.to_string(),
            description: None,
            order_unit: OrderUnit::Piece,
            used_in_pvc: false,
            used_in_alu: false,
            is_phase_out: false,
            replaced_by_article_id: None,
            demand_transferred_at: None,
            created_at: chrono::Utc::now().naive_utc(),
            deleted_at: None,
        }
    }

    /// 是否配置了替换件
    pub fn has_replacement(&self) -> bool {
        self.replaced_by_article_id.is_some()
    }
}

// ==========================================
// ReplacementMapping - 替换映射总览行
// ==========================================
// 用途: 管理端替换关系列表（停产件 + 替换件 + 当前库存 + 待转需求数）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementMapping {
    pub old_article_id: i64,
    pub old_article_no: String,
    pub old_article_name: String,
    pub current_stock: i64,              // 停产件全部仓位库存合计
    pub new_article_id: Option<i64>,
    pub new_article_no: Option<String>,
    pub new_article_name: Option<String>,
    pub demand_transferred_at: Option<NaiveDateTime>,
    pub pending_demand_count: i64,       // 仍指向停产件的 pending 需求行数
}
