// ==========================================
// 五金配件双库存引擎 - 应用状态
// ==========================================
// 职责: 管理引擎级别的共享状态和API实例
// 说明: 缓存等共享对象统一在这里组装并以 Arc 传递，
//       不使用模块级全局变量
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::api::{DemandApi, ProportionApi, RwApi, StockApi};
use crate::config::config_manager::ConfigManager;
use crate::engine::{
    LiveArticleCache, ProportionResolver, ReplacementResolver,
};
use crate::repository::{
    ArticleRepository, DemandRepository, ProportionRepository, StockHistoryRepository,
    StockRecordRepository,
};

/// 引擎状态
///
/// 包含所有API实例和共享资源
pub struct EngineState {
    /// 数据库路径（内存库为 ":memory:"）
    pub db_path: String,

    // ===== 仓储 =====
    pub article_repo: Arc<ArticleRepository>,
    pub stock_repo: Arc<StockRecordRepository>,
    pub history_repo: Arc<StockHistoryRepository>,
    pub demand_repo: Arc<DemandRepository>,
    pub proportion_repo: Arc<ProportionRepository>,

    // ===== 引擎 =====
    pub replacement_resolver: Arc<ReplacementResolver>,
    pub proportion_resolver: Arc<ProportionResolver>,
    pub live_article_cache: Arc<LiveArticleCache>,

    // ===== API =====
    pub stock_api: Arc<StockApi>,
    pub demand_api: Arc<DemandApi>,
    pub proportion_api: Arc<ProportionApi>,
    pub rw_api: Arc<RwApi>,

    /// 配置管理器
    pub config: Arc<ConfigManager>,
}

impl EngineState {
    /// 从数据库路径创建（打开连接 + 幂等建表）
    pub fn new(db_path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        tracing::info!("初始化EngineState，数据库路径: {}", db_path);

        let conn = crate::db::open_sqlite_connection(db_path)?;
        crate::db::ensure_schema(&conn)?;

        // schema 版本仅提示，不做自动迁移
        if let Ok(Some(version)) = crate::db::read_schema_version(&conn) {
            if version != crate::db::CURRENT_SCHEMA_VERSION {
                tracing::warn!(
                    db_version = version,
                    expected = crate::db::CURRENT_SCHEMA_VERSION,
                    "schema 版本与代码不一致"
                );
            }
        }

        Self::from_connection(db_path.to_string(), Arc::new(Mutex::new(conn)))
    }

    /// 从已有连接创建（测试用内存库走这里）
    pub fn from_connection(
        db_path: String,
        conn: Arc<Mutex<Connection>>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        // ==========================================
        // 初始化Repository层
        // ==========================================
        let article_repo = Arc::new(ArticleRepository::new(conn.clone()));
        let stock_repo = Arc::new(StockRecordRepository::new(conn.clone()));
        let history_repo = Arc::new(StockHistoryRepository::new(conn.clone()));
        let demand_repo = Arc::new(DemandRepository::new(conn.clone()));
        let proportion_repo = Arc::new(ProportionRepository::new(conn.clone()));

        // ==========================================
        // 初始化配置与共享缓存
        // ==========================================
        let config = Arc::new(ConfigManager::from_connection(conn.clone())?);
        let live_article_cache = Arc::new(LiveArticleCache::new(config.replacement_cache_ttl()));

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let replacement_resolver = Arc::new(ReplacementResolver::new(
            article_repo.clone(),
            demand_repo.clone(),
            live_article_cache.clone(),
        ));
        let proportion_resolver = Arc::new(ProportionResolver::new(proportion_repo.clone()));

        // ==========================================
        // 初始化API层
        // ==========================================
        let stock_api = Arc::new(StockApi::new(
            stock_repo.clone(),
            history_repo.clone(),
            article_repo.clone(),
            demand_repo.clone(),
            replacement_resolver.clone(),
            config.clone(),
        ));
        let demand_api = Arc::new(DemandApi::new(
            demand_repo.clone(),
            replacement_resolver.clone(),
            proportion_resolver.clone(),
        ));
        let proportion_api = Arc::new(ProportionApi::new(
            proportion_repo.clone(),
            article_repo.clone(),
            proportion_resolver.clone(),
        ));
        let rw_api = Arc::new(RwApi::new(
            demand_repo.clone(),
            stock_repo.clone(),
            history_repo.clone(),
            stock_api.clone(),
        ));

        tracing::info!("EngineState初始化完成");
        Ok(Self {
            db_path,
            article_repo,
            stock_repo,
            history_repo,
            demand_repo,
            proportion_repo,
            replacement_resolver,
            proportion_resolver,
            live_article_cache,
            stock_api,
            demand_api,
            proportion_api,
            rw_api,
            config,
        })
    }
}

/// 默认数据库路径（用户数据目录下）
pub fn get_default_db_path() -> String {
    let base = dirs::data_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
    base.join("okuc-dualstock")
        .join("okuc_dualstock.db")
        .to_string_lossy()
        .to_string()
}
