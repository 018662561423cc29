// ==========================================
// 五金配件双库存引擎 - 领域类型定义
// ==========================================
// 仓库类型与子仓划分来自原始库存数据口径
// 数据库存储统一使用小写字符串
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 仓库类型 (Warehouse Type)
// ==========================================
// PVC 与铝型材产线各有一套独立库存（"双库存"）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WarehouseType {
    Pvc,
    Alu,
}

impl fmt::Display for WarehouseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WarehouseType::Pvc => write!(f, "pvc"),
            WarehouseType::Alu => write!(f, "alu"),
        }
    }
}

impl WarehouseType {
    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            WarehouseType::Pvc => "pvc",
            WarehouseType::Alu => "alu",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pvc" => Some(WarehouseType::Pvc),
            "alu" => Some(WarehouseType::Alu),
            _ => None,
        }
    }
}

// ==========================================
// 子仓 (Sub Warehouse)
// ==========================================
// 主仓不设子仓标识；数据库中主仓以空串存储（见 db.rs 约束说明）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubWarehouse {
    Production, // 生产区
    Buffer,     // 缓冲区
    Gabaraty,   // 超规格件区
}

impl fmt::Display for SubWarehouse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubWarehouse::Production => write!(f, "production"),
            SubWarehouse::Buffer => write!(f, "buffer"),
            SubWarehouse::Gabaraty => write!(f, "gabaraty"),
        }
    }
}

impl SubWarehouse {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            SubWarehouse::Production => "production",
            SubWarehouse::Buffer => "buffer",
            SubWarehouse::Gabaraty => "gabaraty",
        }
    }

    /// 从字符串解析；空串表示主仓
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(SubWarehouse::Production),
            "buffer" => Some(SubWarehouse::Buffer),
            "gabaraty" => Some(SubWarehouse::Gabaraty),
            _ => None,
        }
    }

    /// Option<SubWarehouse> -> 数据库字符串
    pub fn to_db_str_opt(sub: Option<SubWarehouse>) -> &'static str {
        match sub {
            Some(s) => s.to_db_str(),
            None => "",
        }
    }
}

// ==========================================
// 订购单位 (Order Unit)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderUnit {
    Piece, // 单件
    Pack,  // 整包
}

impl OrderUnit {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            OrderUnit::Piece => "piece",
            OrderUnit::Pack => "pack",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "pack" => OrderUnit::Pack,
            _ => OrderUnit::Piece, // 默认值
        }
    }
}

// ==========================================
// 需求状态 (Demand Status)
// ==========================================
// 状态机: pending -> completed（领料消耗）; completed -> pending（返工重开）
// 无终态，历史行永久保留
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandStatus {
    Pending,
    Completed,
}

impl fmt::Display for DemandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DemandStatus::Pending => write!(f, "pending"),
            DemandStatus::Completed => write!(f, "completed"),
        }
    }
}

impl DemandStatus {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DemandStatus::Pending => "pending",
            DemandStatus::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "completed" => DemandStatus::Completed,
            _ => DemandStatus::Pending, // 默认值
        }
    }
}

// ==========================================
// 需求来源 (Demand Source)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandSource {
    Order,    // 订单 BOM 展开
    Manual,   // 人工录入
    Transfer, // 替换件转移合并产生
}

impl DemandSource {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DemandSource::Order => "order",
            DemandSource::Manual => "manual",
            DemandSource::Transfer => "transfer",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "manual" => DemandSource::Manual,
            "transfer" => DemandSource::Transfer,
            _ => DemandSource::Order,
        }
    }
}

// ==========================================
// 比例关系类型 (Proportion Type)
// ==========================================
// multiplier: 1 单位源需求派生 ratio 单位目标需求（向上取整）
// split:      源需求按 split_percent 分摊到多个目标（合计守恒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProportionType {
    Multiplier,
    Split,
}

impl fmt::Display for ProportionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProportionType::Multiplier => write!(f, "multiplier"),
            ProportionType::Split => write!(f, "split"),
        }
    }
}

impl ProportionType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            ProportionType::Multiplier => "multiplier",
            ProportionType::Split => "split",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "multiplier" => Some(ProportionType::Multiplier),
            "split" => Some(ProportionType::Split),
            _ => None,
        }
    }
}

// ==========================================
// 库存流水事件类型 (Stock Event Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockEventType {
    Rw,         // 内部领料出库（RW）
    Adjustment, // 人工校正
    Transfer,   // 子仓调拨
    Delivery,   // 到货入库
    Return,     // 退回（含 RW 冲销）
    Inventory,  // 盘点初始化
    ManualEdit, // 直接改写
}

impl StockEventType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            StockEventType::Rw => "rw",
            StockEventType::Adjustment => "adjustment",
            StockEventType::Transfer => "transfer",
            StockEventType::Delivery => "delivery",
            StockEventType::Return => "return",
            StockEventType::Inventory => "inventory",
            StockEventType::ManualEdit => "manual_edit",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rw" => Some(StockEventType::Rw),
            "adjustment" => Some(StockEventType::Adjustment),
            "transfer" => Some(StockEventType::Transfer),
            "delivery" => Some(StockEventType::Delivery),
            "return" => Some(StockEventType::Return),
            "inventory" => Some(StockEventType::Inventory),
            "manual_edit" => Some(StockEventType::ManualEdit),
            _ => None,
        }
    }
}

// ==========================================
// 计划周 (Expected Week)
// ==========================================
// 格式: "YYYY-Www"，如 "2025-W08"；按字典序比较即为时间序
/// 校验周编号格式（YYYY-Www，周号 01..53）
pub fn is_valid_week(week: &str) -> bool {
    if !week.is_ascii() || week.len() != 8 {
        return false;
    }
    let (year, rest) = week.split_at(4);
    if year.chars().any(|c| !c.is_ascii_digit()) {
        return false;
    }
    if !rest.starts_with("-W") {
        return false;
    }
    let digits = &rest[2..];
    if digits.len() != 2 || digits.chars().any(|c| !c.is_ascii_digit()) {
        return false;
    }
    let no: u32 = match digits.parse() {
        Ok(v) => v,
        Err(_) => return false,
    };
    (1..=53).contains(&no)
}
