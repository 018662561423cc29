// ==========================================
// 五金配件双库存引擎 - 引擎层错误类型
// ==========================================
// 依据: Rust 错误处理最佳实践
// 工具: thiserror 派生宏
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
///
/// 错误分类约定：
/// - Cycle:      替换/比例图将成环，配置保持原状
/// - Validation: 入参或配置不合法，落库前拒绝
/// - NotFound:   引用的实体不存在，无部分副作用
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("图成环: {0}")]
    Cycle(String),

    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;
