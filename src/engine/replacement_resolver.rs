// ==========================================
// 五金配件双库存引擎 - 配件替换解析器
// ==========================================
// 职责:
// 1. 维护 停产件 -> 替换件 映射（写入时环检测，拒绝自引用）
// 2. resolve_live: 沿替换链追到末端活跃件（带环守卫，不做无界遍历）
// 3. transfer_demand: 把历史需求整体迁到活跃件（同单合并，整事务）
// 4. 库存清零自动转移（停产件库存耗尽后需求自动切换）
//
// 库存台账与比例解析器不感知"当前活跃件"概念，由本解析器统一兜底。
// ==========================================

use crate::domain::article::ReplacementMapping;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::replacement_cache::LiveArticleCache;
use crate::repository::article_repo::ArticleRepository;
use crate::repository::demand_repo::DemandRepository;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ReplacementResolver {
    article_repo: Arc<ArticleRepository>,
    demand_repo: Arc<DemandRepository>,
    cache: Arc<LiveArticleCache>,
}

impl ReplacementResolver {
    /// 创建新的 ReplacementResolver 实例
    ///
    /// # 参数
    /// - article_repo: 配件主数据仓储
    /// - demand_repo: 需求仓储
    /// - cache: 活跃件解析缓存（由组装层持有，写路径统一失效）
    pub fn new(
        article_repo: Arc<ArticleRepository>,
        demand_repo: Arc<DemandRepository>,
        cache: Arc<LiveArticleCache>,
    ) -> Self {
        Self {
            article_repo,
            demand_repo,
            cache,
        }
    }

    // ==========================================
    // 替换边维护
    // ==========================================

    /// 配置/变更替换边 old -> new
    ///
    /// # 失败语义
    /// - 自引用: Validation，配置保持原状
    /// - 新边将成环（如 A->B 后配 B->A）: Cycle，配置保持原状
    /// - 任一配件不存在: NotFound
    pub fn set_replacement(&self, old_id: i64, new_id: i64) -> EngineResult<()> {
        if old_id == new_id {
            return Err(EngineError::Validation(
                "替换件不能指向自身".to_string(),
            ));
        }

        self.require_article(old_id)?;
        self.require_article(new_id)?;

        // 环检测: 从 new 出发沿现有替换链走，不允许回到 old
        let mut visited = HashSet::new();
        visited.insert(old_id);
        let mut current = new_id;
        loop {
            if !visited.insert(current) {
                return Err(EngineError::Cycle(format!(
                    "替换关系将形成环: old={}, new={}",
                    old_id, new_id
                )));
            }
            let article = self.require_article(current)?;
            match article.replaced_by_article_id {
                Some(next) => current = next,
                None => break,
            }
        }

        self.article_repo.set_replacement_edge(old_id, Some(new_id))?;
        self.cache.invalidate();

        info!(old_id, new_id, "替换边已配置");
        Ok(())
    }

    /// 撤销替换边（停产撤回）
    pub fn remove_replacement(&self, old_id: i64) -> EngineResult<()> {
        self.require_article(old_id)?;
        self.article_repo.set_replacement_edge(old_id, None)?;
        self.cache.invalidate();

        info!(old_id, "替换边已撤销");
        Ok(())
    }

    // ==========================================
    // 活跃件解析
    // ==========================================

    /// 解析活跃件: 沿 replaced_by 链追到末端
    ///
    /// 写路径已拒绝成环，这里的环守卫只是读侧兜底——
    /// 命中时报 Cycle 而不是死循环。
    pub fn resolve_live(&self, article_id: i64) -> EngineResult<i64> {
        if let Some(live_id) = self.cache.get(article_id) {
            return Ok(live_id);
        }

        let mut visited = HashSet::new();
        let mut current = article_id;
        loop {
            if !visited.insert(current) {
                return Err(EngineError::Cycle(format!(
                    "替换链存在环: article_id={}",
                    article_id
                )));
            }
            let article = self.require_article(current)?;
            match article.replaced_by_article_id {
                Some(next) => current = next,
                None => break,
            }
        }

        self.cache.put(article_id, current);
        Ok(current)
    }

    // ==========================================
    // 需求转移
    // ==========================================

    /// 手动转移: 把仍指向 old 的需求整体迁到链末端活跃件
    ///
    /// # 语义
    /// - 未配置替换件: 无操作，返回 0（不是错误）
    /// - 目标取 resolve_live(old)——链 A->B->C 直接迁到 C
    /// - 同单已有目标行则数量合并，不建重复行
    /// - 整个迁移一个事务，失败全量回滚
    pub fn transfer_demand(&self, old_id: i64) -> EngineResult<usize> {
        let article = self.require_article(old_id)?;

        if article.replaced_by_article_id.is_none() {
            debug!(old_id, "未配置替换件，转移跳过");
            return Ok(0);
        }

        let live_id = self.resolve_live(old_id)?;
        if live_id == old_id {
            return Ok(0);
        }

        let transferred = self
            .demand_repo
            .transfer_article_demand(old_id, live_id)?;

        self.article_repo
            .mark_demand_transferred(old_id, chrono::Utc::now().naive_utc())?;

        info!(old_id, live_id, transferred, "需求已转移到活跃件");
        Ok(transferred)
    }

    /// 对账清扫: 对全部已配置替换边的停产件重跑 transfer_demand
    ///
    /// 用途: 补救在替换边配置之前就已落库的历史需求行；
    /// 由外部调度器/运维脚本周期性调用（引擎内部不起后台任务）。
    ///
    /// # 返回
    /// (迁移行数合计, 涉及的停产件数)
    pub fn transfer_all(&self) -> EngineResult<(usize, usize)> {
        let phase_out = self.article_repo.find_phase_out()?;

        let mut total_rows = 0usize;
        let mut touched = 0usize;
        for article in phase_out {
            if article.replaced_by_article_id.is_none() {
                continue;
            }
            let rows = self.transfer_demand(article.id)?;
            if rows > 0 {
                touched += 1;
                total_rows += rows;
            }
        }

        info!(total_rows, touched, "替换需求对账清扫完成");
        Ok((total_rows, touched))
    }

    /// 库存清零自动转移
    ///
    /// 每次库存变动后由库存服务调用：停产件配置了替换件、尚未转移过、
    /// 且全仓位合计 <= 0 时自动转移需求。不适用时返回 None。
    pub fn check_and_transfer_if_stock_zero(
        &self,
        article_id: i64,
    ) -> EngineResult<Option<usize>> {
        let article = match self.article_repo.find_by_id(article_id)? {
            Some(a) => a,
            None => return Ok(None),
        };

        if !article.is_phase_out || article.replaced_by_article_id.is_none() {
            return Ok(None);
        }

        // 已自动转移过（时间戳即去重标记）
        if article.demand_transferred_at.is_some() {
            return Ok(None);
        }

        let total_stock = self.article_repo.total_stock(article_id)?;
        if total_stock > 0 {
            return Ok(None); // 还有库存，继续消耗旧件
        }

        let transferred = self.transfer_demand(article_id)?;
        if transferred > 0 {
            warn!(
                article_id,
                transferred, "停产件库存清零，需求已自动转移"
            );
        }
        Ok(Some(transferred))
    }

    // ==========================================
    // 管理端总览
    // ==========================================

    /// 替换映射列表（停产件 + 替换件 + 库存合计 + 待转需求数）
    pub fn list_mappings(&self) -> EngineResult<Vec<ReplacementMapping>> {
        let phase_out = self.article_repo.find_phase_out()?;

        let mut mappings = Vec::with_capacity(phase_out.len());
        for article in phase_out {
            let current_stock = self.article_repo.total_stock(article.id)?;
            let pending_count = self.article_repo.count_pending_demands(article.id)?;

            let replacement = match article.replaced_by_article_id {
                Some(new_id) => self.article_repo.find_by_id(new_id)?,
                None => None,
            };

            mappings.push(ReplacementMapping {
                old_article_id: article.id,
                old_article_no: article.article_no.clone(),
                old_article_name: article.name.clone(),
                current_stock,
                new_article_id: replacement.as_ref().map(|a| a.id),
                new_article_no: replacement.as_ref().map(|a| a.article_no.clone()),
                new_article_name: replacement.as_ref().map(|a| a.name.clone()),
                demand_transferred_at: article.demand_transferred_at,
                pending_demand_count: pending_count,
            });
        }

        debug!(count = mappings.len(), "替换映射列表");
        Ok(mappings)
    }

    fn require_article(&self, id: i64) -> EngineResult<crate::domain::article::Article> {
        self.article_repo
            .find_by_id(id)?
            .ok_or(EngineError::NotFound {
                entity: "Article".to_string(),
                id: id.to_string(),
            })
    }
}
