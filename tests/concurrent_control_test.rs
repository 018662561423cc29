// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证乐观锁在多线程竞争下的正确性与统一重试策略
// ==========================================


use okuc_dualstock::api::ApiError;
use okuc_dualstock::domain::types::{DemandSource, StockEventType, WarehouseType};
use okuc_dualstock::repository::NewStockRecord;
use std::sync::Arc;
use std::thread;

use crate::test_helpers::{create_article, setup_engine};

#[test]
fn test_concurrent_adjust_with_retry_conserves_total() {
    let (_tmp, state) = setup_engine();
    let state = Arc::new(state);
    let article_id = create_article(&state, "A001", "合页");

    state
        .stock_api
        .init_stock(
            NewStockRecord::new(article_id, WarehouseType::Pvc, None, 1_000),
            "seed",
        )
        .unwrap();

    // 提高重试上限，保证高竞争下全部写入最终成功
    state
        .config
        .set_global_config_value("stock/retry_max_attempts", "20")
        .unwrap();

    let threads = 8;
    let per_thread = 5;
    let mut handles = Vec::new();
    for t in 0..threads {
        let state = state.clone();
        handles.push(thread::spawn(move || {
            for i in 0..per_thread {
                state
                    .stock_api
                    .adjust_quantity_with_retry(
                        article_id,
                        WarehouseType::Pvc,
                        None,
                        -2,
                        StockEventType::Rw,
                        "并发领料",
                        Some(&format!("ORDER:{}", t * 100 + i)),
                        "tester",
                    )
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    let record = state
        .stock_api
        .get_stock(article_id, WarehouseType::Pvc, None)
        .unwrap()
        .unwrap();

    // 守恒: 1000 - 8×5×2 = 920; version = 成功改量次数
    assert_eq!(record.current_quantity, 920);
    assert_eq!(record.version, (threads * per_thread) as i64);

    // 每次成功改量都有流水
    let history_count = state
        .history_repo
        .count_by_article(article_id)
        .unwrap();
    assert_eq!(history_count, (threads * per_thread + 1) as i64); // +1 盘点初始化
}

#[test]
fn test_single_attempt_conflict_surfaces_to_caller() {
    let (_tmp, state) = setup_engine();
    let article_id = create_article(&state, "A001", "合页");

    state
        .stock_api
        .init_stock(
            NewStockRecord::new(article_id, WarehouseType::Pvc, None, 100),
            "seed",
        )
        .unwrap();

    // 模拟两个读到同一版本的写入方
    let first = state
        .stock_api
        .adjust_quantity(article_id, WarehouseType::Pvc, None, -10, 0, "写入方1", "u1")
        .unwrap();
    assert_eq!(first.version, 1);

    let second = state
        .stock_api
        .adjust_quantity(article_id, WarehouseType::Pvc, None, -10, 0, "写入方2", "u2");
    match second {
        Err(ApiError::OptimisticLockFailure(msg)) => {
            // 错误信息必须足以让 UI 解释"为什么"
            assert!(msg.contains("刷新后重试"));
        }
        other => panic!("Expected OptimisticLockFailure, got {:?}", other.map(|r| r.version)),
    }
}

#[test]
fn test_concurrent_upsert_same_key_single_row() {
    let (_tmp, state) = setup_engine();
    let state = Arc::new(state);
    let article_id = create_article(&state, "A001", "合页");

    let mut handles = Vec::new();
    for i in 0..8 {
        let state = state.clone();
        handles.push(thread::spawn(move || {
            state
                .demand_api
                .upsert_demand(
                    7_000,
                    article_id,
                    "2026-W30",
                    10 + i,
                    DemandSource::Order,
                )
                .unwrap();
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // 同键并发 upsert 永不产生第二行
    let rows = state.demand_api.list_by_order(7_000).unwrap();
    assert_eq!(rows.len(), 1);
    // 终值是其中某一次写入的数量
    assert!((10..18).contains(&rows[0].quantity));
}
