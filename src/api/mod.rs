// ==========================================
// 五金配件双库存引擎 - API 层
// ==========================================
// 职责: 面向外部协作方的业务接口（参数校验、流程编排、可解释错误）
// 协作方约定（接口消费侧，不在本库实现）:
// - 订单摄入:  DemandApi::ingest_requirement / upsert_demand
// - 仓库领料:  RwApi::process_rw_for_order（扣库存 + 需求完成）
// - 目录管理:  ReplacementResolver + ProportionApi
// - 计划报表:  DemandApi::list_by_week / shortage_report + StockApi 各报表
// ==========================================

pub mod demand_api;
pub mod error;
pub mod proportion_api;
pub mod rw_api;
pub mod stock_api;

// 重导出核心 API
pub use demand_api::DemandApi;
pub use error::{ApiError, ApiResult};
pub use proportion_api::ProportionApi;
pub use rw_api::{RwApi, RwItemError, RwProcessResult};
pub use stock_api::StockApi;
