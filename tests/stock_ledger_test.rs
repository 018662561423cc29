// ==========================================
// 库存台账测试
// ==========================================
// 职责: 验证乐观锁语义、改量守恒、负库存报表、流水审计
// ==========================================


use okuc_dualstock::api::ApiError;
use okuc_dualstock::domain::types::{StockEventType, SubWarehouse, WarehouseType};
use okuc_dualstock::repository::NewStockRecord;

use crate::test_helpers::{create_article, setup_engine};

#[test]
fn test_adjust_sum_of_deltas_and_version_count() {
    let (_tmp, state) = setup_engine();
    let article_id = create_article(&state, "A001", "合页");

    state
        .stock_api
        .init_stock(
            NewStockRecord::new(article_id, WarehouseType::Pvc, None, 100),
            "tester",
        )
        .unwrap();

    // 正确版本的连续改量: 最终数量 = 初始 + Σdelta，version = 成功改量次数
    let deltas = [5_i64, -12, 30, -3, -20];
    let mut version = 0_i64;
    for delta in deltas {
        let updated = state
            .stock_api
            .adjust_quantity(
                article_id,
                WarehouseType::Pvc,
                None,
                delta,
                version,
                "校正",
                "tester",
            )
            .unwrap();
        version = updated.version;
    }

    let record = state
        .stock_api
        .get_stock(article_id, WarehouseType::Pvc, None)
        .unwrap()
        .unwrap();

    let sum: i64 = deltas.iter().sum();
    assert_eq!(record.current_quantity, 100 + sum);
    assert_eq!(record.version, deltas.len() as i64);
}

#[test]
fn test_stale_version_conflict_never_mutates() {
    let (_tmp, state) = setup_engine();
    let article_id = create_article(&state, "A001", "合页");

    state
        .stock_api
        .init_stock(
            NewStockRecord::new(article_id, WarehouseType::Pvc, None, 10),
            "tester",
        )
        .unwrap();

    state
        .stock_api
        .adjust_quantity(article_id, WarehouseType::Pvc, None, 5, 0, "入库", "tester")
        .unwrap();

    // 过期版本 0 必须冲突，且行完全不变
    let result = state
        .stock_api
        .adjust_quantity(article_id, WarehouseType::Pvc, None, 99, 0, "并发写", "tester");
    assert!(matches!(result, Err(ApiError::OptimisticLockFailure(_))));

    let record = state
        .stock_api
        .get_stock(article_id, WarehouseType::Pvc, None)
        .unwrap()
        .unwrap();
    assert_eq!(record.current_quantity, 15);
    assert_eq!(record.version, 1);
}

#[test]
fn test_missing_stock_record_is_lazily_created() {
    let (_tmp, state) = setup_engine();
    let article_id = create_article(&state, "A001", "合页");

    // 未初始化仓位: 查询返回 None（不是错误）
    let missing = state
        .stock_api
        .get_stock(article_id, WarehouseType::Alu, None)
        .unwrap();
    assert!(missing.is_none());

    // 改量懒建零量行后生效
    let record = state
        .stock_api
        .adjust_quantity(article_id, WarehouseType::Alu, None, 7, 0, "到货", "tester")
        .unwrap();
    assert_eq!(record.current_quantity, 7);
    assert!(record.is_quantity_uncertain); // 懒建行无盘点依据
}

#[test]
fn test_negative_stock_flagged_not_rejected() {
    let (_tmp, state) = setup_engine();
    let article_id = create_article(&state, "A001", "合页");

    state
        .stock_api
        .init_stock(
            NewStockRecord::new(article_id, WarehouseType::Pvc, None, 3),
            "tester",
        )
        .unwrap();

    // 超扣成功（不硬拒绝）
    let record = state
        .stock_api
        .adjust_quantity(article_id, WarehouseType::Pvc, None, -10, 0, "领料", "tester")
        .unwrap();
    assert_eq!(record.current_quantity, -7);

    // 但进入负库存报表
    let report = state.stock_api.negative_stock_report().unwrap();
    assert_eq!(report.len(), 1);
    assert_eq!(report[0].article_id, article_id);
    assert_eq!(report[0].current_quantity, -7);
}

#[test]
fn test_every_adjustment_writes_history() {
    let (_tmp, state) = setup_engine();
    let article_id = create_article(&state, "A001", "合页");

    state
        .stock_api
        .init_stock(
            NewStockRecord::new(article_id, WarehouseType::Pvc, None, 10),
            "tester",
        )
        .unwrap();

    state
        .stock_api
        .adjust_quantity(article_id, WarehouseType::Pvc, None, 4, 0, "到货", "magazynier")
        .unwrap();
    state
        .stock_api
        .adjust_quantity(article_id, WarehouseType::Pvc, None, -2, 1, "损耗", "magazynier")
        .unwrap();

    let history = state.stock_api.stock_history(article_id, 100).unwrap();
    // 盘点初始化 1 条 + 改量 2 条
    assert_eq!(history.len(), 3);

    // 最新一条在前，链路 previous -> new 自洽
    let latest = &history[0];
    assert_eq!(latest.change_qty, -2);
    assert_eq!(latest.previous_qty, 14);
    assert_eq!(latest.new_qty, 12);
    assert_eq!(latest.actor.as_deref(), Some("magazynier"));

    let inventory = history.last().unwrap();
    assert_eq!(inventory.event_type, StockEventType::Inventory);
}

#[test]
fn test_adjust_requires_reason() {
    let (_tmp, state) = setup_engine();
    let article_id = create_article(&state, "A001", "合页");

    let result = state
        .stock_api
        .adjust_quantity(article_id, WarehouseType::Pvc, None, 1, 0, "  ", "tester");
    assert!(matches!(result, Err(ApiError::InvalidInput(_))));
}

#[test]
fn test_adjust_unknown_article_not_found() {
    let (_tmp, state) = setup_engine();

    let result = state
        .stock_api
        .adjust_quantity(999, WarehouseType::Pvc, None, 1, 0, "到货", "tester");
    assert!(matches!(result, Err(ApiError::NotFound(_))));
}

#[test]
fn test_below_minimum_and_summary_reports() {
    let (_tmp, state) = setup_engine();
    let a1 = create_article(&state, "A001", "合页");
    let a2 = create_article(&state, "A002", "执手");

    let mut low = NewStockRecord::new(a1, WarehouseType::Pvc, None, 2);
    low.min_stock = Some(10);
    state.stock_api.init_stock(low, "tester").unwrap();

    let mut ok = NewStockRecord::new(a2, WarehouseType::Pvc, Some(SubWarehouse::Buffer), 80);
    ok.min_stock = Some(10);
    state.stock_api.init_stock(ok, "tester").unwrap();

    let below = state.stock_api.below_minimum_report(None).unwrap();
    assert_eq!(below.len(), 1);
    assert_eq!(below[0].article_id, a1);

    let summary = state.stock_api.stock_summary(Some(WarehouseType::Pvc)).unwrap();
    let total: i64 = summary.iter().map(|s| s.total_quantity).sum();
    assert_eq!(total, 82);
}

#[test]
fn test_reserved_qty_backfilled_from_pending_demand() {
    let (_tmp, state) = setup_engine();
    let article_id = create_article(&state, "A001", "合页");

    state
        .stock_api
        .init_stock(
            NewStockRecord::new(article_id, WarehouseType::Pvc, None, 100),
            "tester",
        )
        .unwrap();

    state
        .demand_api
        .upsert_demand(
            500,
            article_id,
            "2026-W30",
            30,
            okuc_dualstock::domain::types::DemandSource::Order,
        )
        .unwrap();

    let record = state
        .stock_api
        .get_stock_with_reserved(article_id, WarehouseType::Pvc, None)
        .unwrap()
        .unwrap();
    assert_eq!(record.reserved_qty, 30);
    assert_eq!(record.available(), 70);
}
