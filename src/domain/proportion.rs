// ==========================================
// 五金配件双库存引擎 - 比例关系领域模型
// ==========================================
// 比例关系描述"一个逻辑需求展开为多个物理配件需求"的规则:
// - multiplier: 合页组 -> N 颗螺丝 之类的倍数派生
// - split:      一个源需求按百分比分摊到多个目标件
// 同一源同一时刻只允许一种出边类型（建配置时校验，解析时不再检查）
// 停用走软删除 is_active=false，历史解析保持可追溯
// ==========================================

use crate::domain::types::ProportionType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Proportion - 配件比例关系（有向边）
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proportion {
    pub id: i64,
    pub source_article_id: i64,
    pub target_article_id: i64,
    pub proportion_type: ProportionType,
    pub ratio: f64,                 // multiplier: 每单位源需求派生的目标数量
    pub split_percent: Option<f64>, // split: 分摊百分比 (0..=100)
    pub tolerance: f64,             // split 聚合允许的守恒偏差（单位: 件）
    pub is_active: bool,
    pub created_at: NaiveDateTime,
}

// ==========================================
// NewProportion - 创建入参
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProportion {
    pub source_article_id: i64,
    pub target_article_id: i64,
    pub proportion_type: ProportionType,
    pub ratio: f64,
    pub split_percent: Option<f64>,
    pub tolerance: f64,
}

impl NewProportion {
    /// 倍数关系
    pub fn multiplier(source_article_id: i64, target_article_id: i64, ratio: f64) -> Self {
        Self {
            source_article_id,
            target_article_id,
            proportion_type: ProportionType::Multiplier,
            ratio,
            split_percent: None,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// 分摊关系
    pub fn split(source_article_id: i64, target_article_id: i64, split_percent: f64) -> Self {
        Self {
            source_article_id,
            target_article_id,
            proportion_type: ProportionType::Split,
            ratio: 1.0,
            split_percent: Some(split_percent),
            tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// split 聚合守恒的默认容差（件）
pub const DEFAULT_TOLERANCE: f64 = 0.9;

// ==========================================
// DemandLine - 解析输出行
// ==========================================
/// 一次需求展开的输出: 具体配件与数量
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemandLine {
    pub article_id: i64,
    pub quantity: i64,
}
