// ==========================================
// 配件替换解析测试
// ==========================================
// 职责: 验证替换边环检测、链式活跃件解析、需求整体转移与同单合并
// ==========================================


use okuc_dualstock::domain::types::{DemandSource, DemandStatus, WarehouseType};
use okuc_dualstock::engine::EngineError;
use okuc_dualstock::repository::NewStockRecord;

use crate::test_helpers::{create_article, setup_engine};

#[test]
fn test_set_replacement_rejects_self_reference() {
    let (_tmp, state) = setup_engine();
    let a = create_article(&state, "A", "配件A");

    let result = state.replacement_resolver.set_replacement(a, a);
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[test]
fn test_set_replacement_cycle_rejected_and_original_intact() {
    let (_tmp, state) = setup_engine();
    let a = create_article(&state, "A", "配件A");
    let b = create_article(&state, "B", "配件B");

    state.replacement_resolver.set_replacement(a, b).unwrap();

    // 回指成环必须拒绝
    let result = state.replacement_resolver.set_replacement(b, a);
    assert!(matches!(result, Err(EngineError::Cycle(_))));

    // 原 A->B 边保持原状
    let article_a = state.article_repo.find_by_id(a).unwrap().unwrap();
    assert_eq!(article_a.replaced_by_article_id, Some(b));
    let article_b = state.article_repo.find_by_id(b).unwrap().unwrap();
    assert_eq!(article_b.replaced_by_article_id, None);
}

#[test]
fn test_resolve_live_follows_chain_to_terminal() {
    let (_tmp, state) = setup_engine();
    let a = create_article(&state, "A", "配件A");
    let b = create_article(&state, "B", "配件B");
    let c = create_article(&state, "C", "配件C");

    state.replacement_resolver.set_replacement(a, b).unwrap();
    state.replacement_resolver.set_replacement(b, c).unwrap();

    assert_eq!(state.replacement_resolver.resolve_live(a).unwrap(), c);
    assert_eq!(state.replacement_resolver.resolve_live(b).unwrap(), c);
    assert_eq!(state.replacement_resolver.resolve_live(c).unwrap(), c);
}

#[test]
fn test_remove_replacement_restores_identity() {
    let (_tmp, state) = setup_engine();
    let a = create_article(&state, "A", "配件A");
    let b = create_article(&state, "B", "配件B");

    state.replacement_resolver.set_replacement(a, b).unwrap();
    assert_eq!(state.replacement_resolver.resolve_live(a).unwrap(), b);

    state.replacement_resolver.remove_replacement(a).unwrap();
    assert_eq!(state.replacement_resolver.resolve_live(a).unwrap(), a);

    let article_a = state.article_repo.find_by_id(a).unwrap().unwrap();
    assert!(!article_a.is_phase_out);
}

#[test]
fn test_upsert_demand_redirects_to_live_article() {
    let (_tmp, state) = setup_engine();
    let old = create_article(&state, "OLD", "旧件");
    let new = create_article(&state, "NEW", "新件");

    state.replacement_resolver.set_replacement(old, new).unwrap();

    // 落库前 resolve_live: 需求直接记到新件上
    let record = state
        .demand_api
        .upsert_demand(100, old, "2026-W20", 5, DemandSource::Order)
        .unwrap();
    assert_eq!(record.article_id, new);

    assert!(state.demand_api.list_by_article(old).unwrap().is_empty());
}

#[test]
fn test_transfer_demand_no_mapping_is_noop() {
    let (_tmp, state) = setup_engine();
    let a = create_article(&state, "A", "配件A");

    state
        .demand_api
        .upsert_demand(100, a, "2026-W20", 5, DemandSource::Order)
        .unwrap();

    // 未配置替换件: 无操作返回 0，不是错误
    let transferred = state.replacement_resolver.transfer_demand(a).unwrap();
    assert_eq!(transferred, 0);
    assert_eq!(state.demand_api.list_by_article(a).unwrap().len(), 1);
}

#[test]
fn test_transfer_demand_chain_goes_to_terminal() {
    let (_tmp, state) = setup_engine();
    let a = create_article(&state, "A", "配件A");
    let b = create_article(&state, "B", "配件B");
    let c = create_article(&state, "C", "配件C");

    state
        .demand_api
        .upsert_demand(100, a, "2026-W20", 5, DemandSource::Order)
        .unwrap();
    state
        .demand_api
        .upsert_demand(101, a, "2026-W20", 3, DemandSource::Order)
        .unwrap();

    state.replacement_resolver.set_replacement(a, b).unwrap();
    state.replacement_resolver.set_replacement(b, c).unwrap();

    // 链 A->B->C: 需求直达末端 C，不停留在 B
    let transferred = state.replacement_resolver.transfer_demand(a).unwrap();
    assert_eq!(transferred, 2);

    assert!(state.demand_api.list_by_article(a).unwrap().is_empty());
    assert!(state.demand_api.list_by_article(b).unwrap().is_empty());

    let on_c = state.demand_api.list_by_article(c).unwrap();
    assert_eq!(on_c.len(), 2);
}

#[test]
fn test_transfer_demand_merges_into_existing_rows() {
    // 规格场景: "201-OLD" 有 3 条 completed 需求 [2,3,4] @ 订单 [10,11,12]；
    // "201-NEW" 已有订单 11 的 completed 行 qty=1。
    // 转移后: 订单 11 合并为 4，订单 10/12 新指向 201-NEW，201-OLD 无残留。
    let (_tmp, state) = setup_engine();
    let old = create_article(&state, "201-OLD", "锁块 旧款");
    let new = create_article(&state, "201-NEW", "锁块 新款");

    for (order_id, qty) in [(10_i64, 2_i64), (11, 3), (12, 4)] {
        let record = state
            .demand_api
            .upsert_demand(order_id, old, "2026-W10", qty, DemandSource::Order)
            .unwrap();
        state.demand_api.complete(record.id).unwrap();
    }
    let existing = state
        .demand_api
        .upsert_demand(11, new, "2026-W10", 1, DemandSource::Order)
        .unwrap();
    state.demand_api.complete(existing.id).unwrap();

    state.replacement_resolver.set_replacement(old, new).unwrap();
    let transferred = state.replacement_resolver.transfer_demand(old).unwrap();
    assert_eq!(transferred, 3);

    // 201-OLD 无任何残留行
    assert!(state.demand_api.list_by_article(old).unwrap().is_empty());

    let on_new = state.demand_api.list_by_article(new).unwrap();
    assert_eq!(on_new.len(), 3);

    let by_order = |order_id: i64| {
        on_new
            .iter()
            .find(|d| d.order_id == order_id)
            .unwrap_or_else(|| panic!("order {} missing", order_id))
    };
    assert_eq!(by_order(10).quantity, 2);
    assert_eq!(by_order(11).quantity, 4); // 3 + 1 合并
    assert_eq!(by_order(12).quantity, 4);

    // 两侧皆 completed -> 合并行保持 completed
    assert_eq!(by_order(11).status, DemandStatus::Completed);
}

#[test]
fn test_transfer_merge_pending_wins() {
    let (_tmp, state) = setup_engine();
    let old = create_article(&state, "OLD", "旧件");
    let new = create_article(&state, "NEW", "新件");

    // 旧件 pending 5，新件同单 completed 2
    state
        .demand_api
        .upsert_demand(42, old, "2026-W10", 5, DemandSource::Order)
        .unwrap();
    let done = state
        .demand_api
        .upsert_demand(42, new, "2026-W10", 2, DemandSource::Order)
        .unwrap();
    state.demand_api.complete(done.id).unwrap();

    state.replacement_resolver.set_replacement(old, new).unwrap();
    state.replacement_resolver.transfer_demand(old).unwrap();

    // 任一侧未消耗 -> 合并行回到 pending
    let merged = state.demand_api.get_demand(done.id).unwrap();
    assert_eq!(merged.quantity, 7);
    assert_eq!(merged.status, DemandStatus::Pending);
}

#[test]
fn test_auto_transfer_on_stock_zero() {
    let (_tmp, state) = setup_engine();
    let old = create_article(&state, "OLD", "旧件");
    let new = create_article(&state, "NEW", "新件");

    state
        .stock_api
        .init_stock(NewStockRecord::new(old, WarehouseType::Pvc, None, 3), "t")
        .unwrap();
    state
        .demand_api
        .upsert_demand(100, old, "2026-W20", 8, DemandSource::Order)
        .unwrap();

    state.replacement_resolver.set_replacement(old, new).unwrap();

    // 库存未清零: 不自动转移
    state
        .stock_api
        .adjust_quantity(old, WarehouseType::Pvc, None, -1, 0, "领料", "t")
        .unwrap();
    assert_eq!(state.demand_api.list_by_article(old).unwrap().len(), 1);

    // 清零触发自动转移
    state
        .stock_api
        .adjust_quantity(old, WarehouseType::Pvc, None, -2, 1, "领料", "t")
        .unwrap();
    assert!(state.demand_api.list_by_article(old).unwrap().is_empty());
    assert_eq!(state.demand_api.list_by_article(new).unwrap().len(), 1);

    // 转移时间戳已记录（去重标记）
    let article_old = state.article_repo.find_by_id(old).unwrap().unwrap();
    assert!(article_old.demand_transferred_at.is_some());
}

#[test]
fn test_transfer_all_reconciliation_sweep() {
    let (_tmp, state) = setup_engine();
    let a_old = create_article(&state, "A-OLD", "A旧");
    let a_new = create_article(&state, "A-NEW", "A新");
    let b_old = create_article(&state, "B-OLD", "B旧");
    let b_new = create_article(&state, "B-NEW", "B新");

    // 先落需求，后配置替换边（历史遗留场景）
    state
        .demand_api
        .upsert_demand(100, a_old, "2026-W20", 5, DemandSource::Order)
        .unwrap();
    state
        .demand_api
        .upsert_demand(101, b_old, "2026-W20", 7, DemandSource::Order)
        .unwrap();

    state.replacement_resolver.set_replacement(a_old, a_new).unwrap();
    state.replacement_resolver.set_replacement(b_old, b_new).unwrap();

    let (rows, articles) = state.replacement_resolver.transfer_all().unwrap();
    assert_eq!(rows, 2);
    assert_eq!(articles, 2);

    assert!(state.demand_api.list_by_article(a_old).unwrap().is_empty());
    assert!(state.demand_api.list_by_article(b_old).unwrap().is_empty());
}

#[test]
fn test_list_mappings_overview() {
    let (_tmp, state) = setup_engine();
    let old = create_article(&state, "OLD", "旧件");
    let new = create_article(&state, "NEW", "新件");

    state
        .stock_api
        .init_stock(NewStockRecord::new(old, WarehouseType::Pvc, None, 15), "t")
        .unwrap();
    state
        .demand_api
        .upsert_demand(100, old, "2026-W20", 5, DemandSource::Order)
        .unwrap();

    state.replacement_resolver.set_replacement(old, new).unwrap();

    let mappings = state.replacement_resolver.list_mappings().unwrap();
    assert_eq!(mappings.len(), 1);

    let mapping = &mappings[0];
    assert_eq!(mapping.old_article_no, "OLD");
    assert_eq!(mapping.new_article_no.as_deref(), Some("NEW"));
    assert_eq!(mapping.current_stock, 15);
    assert_eq!(mapping.pending_demand_count, 1);
    assert!(mapping.demand_transferred_at.is_none());
}

#[test]
fn test_cache_invalidated_on_edge_change() {
    let (_tmp, state) = setup_engine();
    let a = create_article(&state, "A", "配件A");
    let b = create_article(&state, "B", "配件B");

    // 解析进缓存
    assert_eq!(state.replacement_resolver.resolve_live(a).unwrap(), a);
    assert!(!state.live_article_cache.is_empty());

    // 改边必须失效缓存，旧映射不得残留
    state.replacement_resolver.set_replacement(a, b).unwrap();
    assert_eq!(state.replacement_resolver.resolve_live(a).unwrap(), b);
}
