// ==========================================
// 五金配件双库存引擎 - 领域层
// ==========================================
// 职责: 实体与类型定义，不含数据访问与业务流程
// ==========================================

pub mod article;
pub mod demand;
pub mod proportion;
pub mod stock;
pub mod types;

// 重导出核心实体
pub use article::{Article, ReplacementMapping};
pub use demand::{DemandRecord, WeekDemandRow};
pub use proportion::{DemandLine, NewProportion, Proportion, DEFAULT_TOLERANCE};
pub use stock::{ShortageRow, StockHistory, StockRecord, StockSummary};
