use super::{NewStockRecord, StockHistoryRepository, StockRecordRepository};
use crate::domain::stock::StockHistory;
use crate::domain::types::{StockEventType, SubWarehouse, WarehouseType};
use crate::repository::error::RepositoryError;
use rusqlite::Connection;
use std::sync::{Arc, Mutex};

fn setup_test_db() -> Arc<Mutex<Connection>> {
    let conn = Connection::open_in_memory().unwrap();
    crate::db::configure_sqlite_connection(&conn).unwrap();
    crate::db::ensure_schema(&conn).unwrap();

    conn.execute(
        "INSERT INTO okuc_article (article_no, name, created_at) VALUES ('A100', '合页', '2026-01-10 08:00:00')",
        [],
    )
    .unwrap();

    Arc::new(Mutex::new(conn))
}

fn make_history(stock: &crate::domain::stock::StockRecord, delta: i64) -> StockHistory {
    StockHistory::from_change(
        stock.article_id,
        stock.warehouse_type,
        stock.sub_warehouse,
        StockEventType::Adjustment,
        stock.current_quantity,
        delta,
    )
    .with_reason("测试改量")
}

#[test]
fn test_create_and_find_by_key() {
    let conn = setup_test_db();
    let repo = StockRecordRepository::new(conn);

    let created = repo
        .create(&NewStockRecord::new(1, WarehouseType::Pvc, None, 50))
        .unwrap();

    assert_eq!(created.current_quantity, 50);
    assert_eq!(created.version, 0);
    assert_eq!(created.initial_quantity, Some(50));

    let found = repo.find_by_key(1, WarehouseType::Pvc, None).unwrap();
    assert!(found.is_some());
    assert_eq!(found.unwrap().id, created.id);

    // 不同子仓是不同仓位
    let missing = repo
        .find_by_key(1, WarehouseType::Pvc, Some(SubWarehouse::Buffer))
        .unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_adjust_quantity_increments_version_and_writes_history() {
    let conn = setup_test_db();
    let repo = StockRecordRepository::new(conn.clone());
    let history_repo = StockHistoryRepository::new(conn);

    let stock = repo
        .create(&NewStockRecord::new(1, WarehouseType::Pvc, None, 10))
        .unwrap();

    let updated = repo
        .adjust_quantity(stock.id, -4, 0, &make_history(&stock, -4))
        .unwrap();

    assert_eq!(updated.current_quantity, 6);
    assert_eq!(updated.version, 1);

    let history = history_repo.find_by_article(1, 10).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].previous_qty, 10);
    assert_eq!(history[0].change_qty, -4);
    assert_eq!(history[0].new_qty, 6);
}

#[test]
fn test_adjust_quantity_stale_version_conflict() {
    let conn = setup_test_db();
    let repo = StockRecordRepository::new(conn.clone());
    let history_repo = StockHistoryRepository::new(conn);

    let stock = repo
        .create(&NewStockRecord::new(1, WarehouseType::Pvc, None, 10))
        .unwrap();

    repo.adjust_quantity(stock.id, 5, 0, &make_history(&stock, 5))
        .unwrap();

    // 使用过期版本 0 再次改量
    let result = repo.adjust_quantity(stock.id, 5, 0, &make_history(&stock, 5));
    match result {
        Err(RepositoryError::OptimisticLockFailure {
            expected, actual, ..
        }) => {
            assert_eq!(expected, 0);
            assert_eq!(actual, 1);
        }
        other => panic!("Expected OptimisticLockFailure, got {:?}", other.map(|r| r.version)),
    }

    // 冲突不落任何变化：数量、版本、流水均保持原状
    let current = repo.find_by_id(stock.id).unwrap().unwrap();
    assert_eq!(current.current_quantity, 15);
    assert_eq!(current.version, 1);
    assert_eq!(history_repo.count_by_article(1).unwrap(), 1);
}

#[test]
fn test_adjust_quantity_missing_row_not_found() {
    let conn = setup_test_db();
    let repo = StockRecordRepository::new(conn);

    let history = StockHistory::from_change(1, WarehouseType::Pvc, None, StockEventType::Adjustment, 0, 1);
    let result = repo.adjust_quantity(999, 1, 0, &history);

    assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
}

#[test]
fn test_negative_stock_is_allowed_and_reported() {
    let conn = setup_test_db();
    let repo = StockRecordRepository::new(conn);

    let stock = repo
        .create(&NewStockRecord::new(1, WarehouseType::Pvc, None, 3))
        .unwrap();

    // 扣减超过现有量——不做硬约束
    let updated = repo
        .adjust_quantity(stock.id, -5, 0, &make_history(&stock, -5))
        .unwrap();
    assert_eq!(updated.current_quantity, -2);

    let negative = repo.find_negative().unwrap();
    assert_eq!(negative.len(), 1);
    assert_eq!(negative[0].id, stock.id);
}

#[test]
fn test_find_below_minimum() {
    let conn = setup_test_db();
    let repo = StockRecordRepository::new(conn);

    let mut new_record = NewStockRecord::new(1, WarehouseType::Pvc, None, 5);
    new_record.min_stock = Some(10);
    repo.create(&new_record).unwrap();

    let mut ok_record = NewStockRecord::new(1, WarehouseType::Alu, None, 50);
    ok_record.min_stock = Some(10);
    repo.create(&ok_record).unwrap();

    let below = repo.find_below_minimum(None).unwrap();
    assert_eq!(below.len(), 1);
    assert_eq!(below[0].warehouse_type, WarehouseType::Pvc);

    let below_alu = repo.find_below_minimum(Some(WarehouseType::Alu)).unwrap();
    assert!(below_alu.is_empty());
}

#[test]
fn test_rw_candidate_prefers_production_sub_warehouse() {
    let conn = setup_test_db();
    let repo = StockRecordRepository::new(conn);

    repo.create(&NewStockRecord::new(1, WarehouseType::Pvc, None, 10))
        .unwrap();
    let production = repo
        .create(&NewStockRecord::new(
            1,
            WarehouseType::Pvc,
            Some(SubWarehouse::Production),
            20,
        ))
        .unwrap();

    let candidate = repo.find_rw_candidate(1, WarehouseType::Pvc).unwrap().unwrap();
    assert_eq!(candidate.id, production.id);
}

#[test]
fn test_summary_groups_by_warehouse() {
    let conn = setup_test_db();
    let repo = StockRecordRepository::new(conn);

    repo.create(&NewStockRecord::new(1, WarehouseType::Pvc, None, 10))
        .unwrap();
    repo.create(&NewStockRecord::new(
        1,
        WarehouseType::Pvc,
        Some(SubWarehouse::Buffer),
        5,
    ))
    .unwrap();

    let summary = repo.summary(None).unwrap();
    assert_eq!(summary.len(), 2);
    let total: i64 = summary.iter().map(|s| s.total_quantity).sum();
    assert_eq!(total, 15);
}
