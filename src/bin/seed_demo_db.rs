// Dev utility: reset and seed a demo database with a small but complete
// scenario (articles, proportions, stock, demands, one replacement chain).
//
// Usage:
//   cargo run --bin seed_demo_db -- [db_path]

use okuc_dualstock::app::{get_default_db_path, EngineState};
use okuc_dualstock::domain::article::Article;
use okuc_dualstock::domain::proportion::NewProportion;
use okuc_dualstock::domain::types::{DemandSource, WarehouseType};
use okuc_dualstock::repository::NewStockRecord;
use std::error::Error;
use std::fs;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    okuc_dualstock::logging::init();

    let db_path = std::env::args().nth(1).unwrap_or_else(get_default_db_path);

    // 重建库（旧库先备份）
    if Path::new(&db_path).exists() {
        let backup = format!("{}.bak", db_path);
        fs::rename(&db_path, &backup)?;
        println!("existing db moved to {}", backup);
    }
    if let Some(parent) = Path::new(&db_path).parent() {
        fs::create_dir_all(parent)?;
    }

    let state = EngineState::new(&db_path)?;

    // ===== 配件目录 =====
    let hinge_set = create_article(&state, "HNG-SET-01", "合页组件")?;
    let screw = create_article(&state, "SCR-4x40", "自攻螺丝 4x40")?;
    let handle_left = create_article(&state, "HDL-L", "执手 左")?;
    let handle_right = create_article(&state, "HDL-R", "执手 右")?;
    let latch_old = create_article(&state, "201-OLD", "锁块 旧款")?;
    let latch_new = create_article(&state, "201-NEW", "锁块 新款")?;

    // ===== 比例关系 =====
    // 合页组件 -> 螺丝 ×6
    state
        .proportion_api
        .create(NewProportion::multiplier(hinge_set, screw, 6.0))?;
    // 执手需求按左右 50/50 分摊
    let handle_logical = create_article(&state, "HDL-SET", "执手组（逻辑件）")?;
    state
        .proportion_api
        .create(NewProportion::split(handle_logical, handle_left, 50.0))?;
    state
        .proportion_api
        .create(NewProportion::split(handle_logical, handle_right, 50.0))?;

    // ===== 初始库存 =====
    for (article_id, qty) in [
        (screw, 5_000),
        (handle_left, 120),
        (handle_right, 120),
        (latch_old, 40),
        (latch_new, 300),
    ] {
        state.stock_api.init_stock(
            NewStockRecord::new(article_id, WarehouseType::Pvc, None, qty),
            "seed",
        )?;
    }

    // ===== 订单需求 =====
    for (order_id, qty) in [(1001_i64, 10_i64), (1002, 25), (1003, 8)] {
        state
            .demand_api
            .ingest_requirement(order_id, hinge_set, "2026-W33", qty)?;
        state
            .demand_api
            .ingest_requirement(order_id, handle_logical, "2026-W33", qty)?;
        state.demand_api.upsert_demand(
            order_id,
            latch_old,
            "2026-W34",
            qty,
            DemandSource::Order,
        )?;
    }

    // ===== 替换链 =====
    state
        .replacement_resolver
        .set_replacement(latch_old, latch_new)?;

    println!("seeded demo db at {}", db_path);
    println!("  articles: 7, proportions: 3, orders: 3, replacement: 201-OLD -> 201-NEW");
    Ok(())
}

fn create_article(state: &EngineState, article_no: &str, name: &str) -> Result<i64, Box<dyn Error>> {
    let mut article = Article::new(article_no, name);
    article.used_in_pvc = true;
    Ok(state.article_repo.create(&article)?)
}
