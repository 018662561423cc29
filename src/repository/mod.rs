// ==========================================
// 五金配件双库存引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod article_repo;
pub mod demand_repo;
pub mod error;
pub mod proportion_repo;
pub mod stock_repo;

// 重导出核心仓储
pub use article_repo::ArticleRepository;
pub use demand_repo::DemandRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use proportion_repo::ProportionRepository;
pub use stock_repo::{NewStockRecord, StockHistoryRepository, StockRecordRepository};
