// ==========================================
// 五金配件双库存引擎 - 库存数据仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 并发: 所有改量走 adjust_quantity（版本校验 + 流水同事务）
// ==========================================

mod history;
mod record;

#[cfg(test)]
mod tests;

pub use history::StockHistoryRepository;
pub use record::{NewStockRecord, StockRecordRepository};
