// ==========================================
// 五金配件双库存引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 库存/需求/替换解析引擎（外围 CRUD 与导入为外部协作方）
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// 国际化
pub mod i18n;

// API 层 - 业务接口
pub mod api;

// 应用层 - 引擎组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    DemandSource, DemandStatus, OrderUnit, ProportionType, StockEventType, SubWarehouse,
    WarehouseType,
};

// 领域实体
pub use domain::{
    Article, DemandLine, DemandRecord, NewProportion, Proportion, ReplacementMapping, ShortageRow,
    StockHistory, StockRecord, StockSummary, WeekDemandRow,
};

// 引擎
pub use engine::{
    EngineError, LiveArticleCache, ProportionResolver, ReplacementResolver, RetryPolicy,
};

// API
pub use api::{ApiError, DemandApi, ProportionApi, RwApi, RwProcessResult, StockApi};

// 应用组装
pub use app::EngineState;

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "五金配件双库存引擎";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";
