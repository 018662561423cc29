// ==========================================
// 五金配件双库存引擎 - 比例解析引擎
// ==========================================
// 职责: 把一条逻辑需求 (source, quantity) 展开为具体配件需求行
// 规则:
// - multiplier 边: 派生量 = ceil(源量 × ratio)，零头永不丢弃
// - split 边:      派生量 = round(源量 × percent / 100)，
//                  聚合守恒校验（偏差 <= tolerance 件），
//                  舍入余数记入百分比最高的子件
// - 叶子节点（无激活出边）原样产出
// - 遍历命中环立即报错，绝不空转
// 同源混用两种边类型在创建期拒绝，解析期不再检查。
// ==========================================

use crate::domain::proportion::{DemandLine, Proportion};
use crate::domain::types::ProportionType;
use crate::engine::error::{EngineError, EngineResult};
use crate::repository::proportion_repo::ProportionRepository;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

pub struct ProportionResolver {
    proportion_repo: Arc<ProportionRepository>,
}

impl ProportionResolver {
    /// 创建新的 ProportionResolver 实例
    pub fn new(proportion_repo: Arc<ProportionRepository>) -> Self {
        Self { proportion_repo }
    }

    /// 需求展开
    ///
    /// # 参数
    /// - source_article_id: 逻辑需求的源配件
    /// - quantity: 源需求量（>= 0；0 直接产出空结果）
    ///
    /// # 返回
    /// 按 article_id 升序的 (配件, 数量) 列表；多路径汇聚到同一叶子时数量合并
    ///
    /// # 错误
    /// - Cycle: 激活比例边可达子图存在环
    /// - Validation: 数量为负，或 split 聚合偏差超出容差
    pub fn resolve_demand(
        &self,
        source_article_id: i64,
        quantity: i64,
    ) -> EngineResult<Vec<DemandLine>> {
        if quantity < 0 {
            return Err(EngineError::Validation(format!(
                "需求量不能为负: {}",
                quantity
            )));
        }
        if quantity == 0 {
            return Ok(vec![]);
        }

        // 第一遍: 收集可达子图并做环检测（DFS 三色标记）
        let adjacency = self.collect_reachable(source_article_id)?;

        // 第二遍: 拓扑序传播数量（可达子图已确认无环）
        let lines = propagate(source_article_id, quantity, &adjacency)?;

        debug!(
            source_article_id,
            quantity,
            lines = lines.len(),
            "需求展开完成"
        );
        Ok(lines)
    }

    /// 新比例边 source -> target 是否会使激活图成环
    ///
    /// 供创建期校验使用: 从 target 出发沿激活边可达 source 即成环。
    pub fn would_create_cycle(&self, source_article_id: i64, target_article_id: i64) -> EngineResult<bool> {
        if source_article_id == target_article_id {
            return Ok(true);
        }

        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(target_article_id);

        while let Some(node) = queue.pop_front() {
            if !visited.insert(node) {
                continue;
            }
            for edge in self.proportion_repo.find_active_by_source(node)? {
                if edge.target_article_id == source_article_id {
                    return Ok(true);
                }
                queue.push_back(edge.target_article_id);
            }
        }

        Ok(false)
    }

    /// DFS 收集可达子图的激活出边；on_path 命中即环
    fn collect_reachable(
        &self,
        root: i64,
    ) -> EngineResult<HashMap<i64, Vec<Proportion>>> {
        let mut adjacency: HashMap<i64, Vec<Proportion>> = HashMap::new();
        let mut done: HashSet<i64> = HashSet::new();
        let mut on_path: HashSet<i64> = HashSet::new();
        // 显式栈代替递归; Enter/Leave 两段式维护 on_path
        enum Frame {
            Enter(i64),
            Leave(i64),
        }
        let mut stack = vec![Frame::Enter(root)];

        while let Some(frame) = stack.pop() {
            match frame {
                Frame::Enter(node) => {
                    if done.contains(&node) {
                        continue;
                    }
                    if !on_path.insert(node) {
                        return Err(EngineError::Cycle(format!(
                            "比例图存在环: article_id={}",
                            node
                        )));
                    }
                    stack.push(Frame::Leave(node));

                    let edges = self.proportion_repo.find_active_by_source(node)?;
                    for edge in &edges {
                        if on_path.contains(&edge.target_article_id) {
                            return Err(EngineError::Cycle(format!(
                                "比例图存在环: article_id={}",
                                edge.target_article_id
                            )));
                        }
                        stack.push(Frame::Enter(edge.target_article_id));
                    }
                    adjacency.insert(node, edges);
                }
                Frame::Leave(node) => {
                    on_path.remove(&node);
                    done.insert(node);
                }
            }
        }

        Ok(adjacency)
    }
}

/// 拓扑序数量传播
///
/// 入度计数基于可达子图；节点的入量全部累计完成后再展开其出边，
/// 保证菱形结构（两条路径汇聚）只展开一次且数量正确合并。
fn propagate(
    root: i64,
    quantity: i64,
    adjacency: &HashMap<i64, Vec<Proportion>>,
) -> EngineResult<Vec<DemandLine>> {
    // 可达子图内的入度
    let mut in_degree: HashMap<i64, usize> = HashMap::new();
    in_degree.insert(root, 0);
    for edges in adjacency.values() {
        for edge in edges {
            *in_degree.entry(edge.target_article_id).or_insert(0) += 1;
        }
    }

    let mut amounts: HashMap<i64, i64> = HashMap::new();
    amounts.insert(root, quantity);

    let mut emitted: HashMap<i64, i64> = HashMap::new();
    let mut queue: VecDeque<i64> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(node, _)| *node)
        .collect();

    while let Some(node) = queue.pop_front() {
        let node_qty = amounts.get(&node).copied().unwrap_or(0);
        let edges = adjacency.get(&node).map(Vec::as_slice).unwrap_or(&[]);

        if edges.is_empty() {
            // 叶子: 原样产出（派生量为 0 的行不产出）
            if node_qty > 0 {
                *emitted.entry(node).or_insert(0) += node_qty;
            }
        } else {
            match edges[0].proportion_type {
                ProportionType::Multiplier => {
                    for edge in edges {
                        let derived = (node_qty as f64 * edge.ratio).ceil() as i64;
                        *amounts.entry(edge.target_article_id).or_insert(0) += derived;
                    }
                }
                ProportionType::Split => {
                    apply_split(node, node_qty, edges, &mut amounts)?;
                }
            }

            for edge in edges {
                if let Some(deg) = in_degree.get_mut(&edge.target_article_id) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(edge.target_article_id);
                    }
                }
            }
        }
    }

    let mut lines: Vec<DemandLine> = emitted
        .into_iter()
        .map(|(article_id, quantity)| DemandLine {
            article_id,
            quantity,
        })
        .collect();
    lines.sort_by_key(|l| l.article_id);
    Ok(lines)
}

/// split 边展开: 逐子件取整 + 守恒校验 + 余数归最大百分比子件
fn apply_split(
    node: i64,
    node_qty: i64,
    edges: &[Proportion],
    amounts: &mut HashMap<i64, i64>,
) -> EngineResult<()> {
    let mut derived: Vec<(i64, f64, i64)> = Vec::with_capacity(edges.len());
    let mut rounded_sum = 0i64;

    for edge in edges {
        let percent = edge.split_percent.ok_or_else(|| {
            EngineError::Validation(format!(
                "split 边缺少 split_percent: proportion_id={}",
                edge.id
            ))
        })?;
        let qty = (node_qty as f64 * percent / 100.0).round() as i64;
        rounded_sum += qty;
        derived.push((edge.target_article_id, percent, qty));
    }

    // 守恒校验: 取整合计与源量的偏差必须在容差内
    let tolerance = edges[0].tolerance;
    let remainder = node_qty - rounded_sum;
    if (remainder.abs() as f64) > tolerance.max(1.0) {
        return Err(EngineError::Validation(format!(
            "split 聚合偏差超出容差: source={}, 源量={}, 取整合计={}, 容差={}",
            node, node_qty, rounded_sum, tolerance
        )));
    }

    // 余数记入百分比最高的子件（并列取靠后配置的一条），保证合计守恒
    if remainder != 0 {
        let mut best_idx = 0usize;
        for (idx, (_, percent, _)) in derived.iter().enumerate() {
            if *percent >= derived[best_idx].1 {
                best_idx = idx;
            }
        }
        derived[best_idx].2 += remainder;
    }

    for (target, _, qty) in derived {
        *amounts.entry(target).or_insert(0) += qty;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::proportion::NewProportion;
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};

    fn setup() -> (ProportionResolver, Arc<ProportionRepository>) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();

        // 预置 1..=9 号配件
        for i in 1..=9 {
            conn.execute(
                "INSERT INTO okuc_article (article_no, name, created_at) VALUES (?, ?, '2026-01-10 08:00:00')",
                rusqlite::params![format!("ART-{}", i), format!("配件{}", i)],
            )
            .unwrap();
        }

        let conn = Arc::new(Mutex::new(conn));
        let repo = Arc::new(ProportionRepository::new(conn));
        (ProportionResolver::new(repo.clone()), repo)
    }

    #[test]
    fn test_leaf_passthrough() {
        let (resolver, _repo) = setup();
        let lines = resolver.resolve_demand(1, 5).unwrap();
        assert_eq!(lines, vec![DemandLine { article_id: 1, quantity: 5 }]);
    }

    #[test]
    fn test_zero_quantity_yields_nothing() {
        let (resolver, _repo) = setup();
        assert!(resolver.resolve_demand(1, 0).unwrap().is_empty());
    }

    #[test]
    fn test_negative_quantity_rejected() {
        let (resolver, _repo) = setup();
        assert!(matches!(
            resolver.resolve_demand(1, -1),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_multiplier_ceil() {
        let (resolver, repo) = setup();
        repo.create(&NewProportion::multiplier(1, 2, 3.0)).unwrap();

        let lines = resolver.resolve_demand(1, 5).unwrap();
        assert_eq!(lines, vec![DemandLine { article_id: 2, quantity: 15 }]);

        // 非整数比例向上取整: 5 × 0.5 = 2.5 -> 3
        repo.create(&NewProportion::multiplier(3, 4, 0.5)).unwrap();
        let lines = resolver.resolve_demand(3, 5).unwrap();
        assert_eq!(lines, vec![DemandLine { article_id: 4, quantity: 3 }]);
    }

    #[test]
    fn test_multiplier_chain() {
        let (resolver, repo) = setup();
        // 1 -(×2)-> 2 -(×3)-> 3
        repo.create(&NewProportion::multiplier(1, 2, 2.0)).unwrap();
        repo.create(&NewProportion::multiplier(2, 3, 3.0)).unwrap();

        let lines = resolver.resolve_demand(1, 4).unwrap();
        // 中间节点 2 不产出，只有叶子 3: 4×2=8, 8×3=24
        assert_eq!(lines, vec![DemandLine { article_id: 3, quantity: 24 }]);
    }

    #[test]
    fn test_split_conserves_total() {
        let (resolver, repo) = setup();
        repo.create(&NewProportion::split(1, 2, 60.0)).unwrap();
        repo.create(&NewProportion::split(1, 3, 40.0)).unwrap();

        let lines = resolver.resolve_demand(1, 10).unwrap();
        assert_eq!(
            lines,
            vec![
                DemandLine { article_id: 2, quantity: 6 },
                DemandLine { article_id: 3, quantity: 4 },
            ]
        );

        // 奇数量也必须守恒（余数归 60% 的子件）
        let lines = resolver.resolve_demand(1, 7).unwrap();
        let total: i64 = lines.iter().map(|l| l.quantity).sum();
        assert_eq!(total, 7);
    }

    #[test]
    fn test_split_remainder_goes_to_highest_percent() {
        let (resolver, repo) = setup();
        // 三份 33.33%: round 后每份近似，总差额归最后配置的最高百分比子件
        repo.create(&NewProportion::split(1, 2, 33.34)).unwrap();
        repo.create(&NewProportion::split(1, 3, 33.33)).unwrap();
        repo.create(&NewProportion::split(1, 4, 33.33)).unwrap();

        let lines = resolver.resolve_demand(1, 100).unwrap();
        let total: i64 = lines.iter().map(|l| l.quantity).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_inactive_proportion_skipped() {
        let (resolver, repo) = setup();
        let p = repo.create(&NewProportion::multiplier(1, 2, 3.0)).unwrap();
        repo.deactivate(p.id).unwrap();

        // 停用边视同不存在 -> 源件成为叶子
        let lines = resolver.resolve_demand(1, 5).unwrap();
        assert_eq!(lines, vec![DemandLine { article_id: 1, quantity: 5 }]);
    }

    #[test]
    fn test_cycle_detected() {
        let (resolver, repo) = setup();
        repo.create(&NewProportion::multiplier(1, 2, 1.0)).unwrap();
        repo.create(&NewProportion::multiplier(2, 3, 1.0)).unwrap();
        repo.create(&NewProportion::multiplier(3, 1, 1.0)).unwrap();

        assert!(matches!(
            resolver.resolve_demand(1, 5),
            Err(EngineError::Cycle(_))
        ));
    }

    #[test]
    fn test_diamond_merges_quantities() {
        let (resolver, repo) = setup();
        // 1 分摊给 2/3，各自 ×2 汇聚到 4（菱形，合法 DAG）
        repo.create(&NewProportion::split(1, 2, 50.0)).unwrap();
        repo.create(&NewProportion::split(1, 3, 50.0)).unwrap();
        repo.create(&NewProportion::multiplier(2, 4, 2.0)).unwrap();
        repo.create(&NewProportion::multiplier(3, 4, 2.0)).unwrap();

        let lines = resolver.resolve_demand(1, 10).unwrap();
        assert_eq!(lines, vec![DemandLine { article_id: 4, quantity: 20 }]);
    }

    #[test]
    fn test_would_create_cycle() {
        let (resolver, repo) = setup();
        repo.create(&NewProportion::multiplier(1, 2, 1.0)).unwrap();
        repo.create(&NewProportion::multiplier(2, 3, 1.0)).unwrap();

        assert!(resolver.would_create_cycle(1, 1).unwrap());
        // 已有 1->2->3，再加 3->1 成环
        assert!(resolver.would_create_cycle(3, 1).unwrap());
        // 加 1->3 只是抄近路，仍是 DAG
        assert!(!resolver.would_create_cycle(1, 3).unwrap());
        assert!(!resolver.would_create_cycle(4, 5).unwrap());
    }
}
