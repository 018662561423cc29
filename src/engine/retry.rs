// ==========================================
// 五金配件双库存引擎 - 乐观锁重试策略
// ==========================================
// 统一策略: 有界次数 + 指数退避，所有库存写路径共用一份配置
// 不在各调用点散落 ad hoc 重试循环
// ==========================================

use crate::repository::error::{RepositoryError, RepositoryResult};
use std::time::Duration;

// ==========================================
// RetryPolicy - 有界重试 + 指数退避
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,       // 总尝试次数（含首次）
    pub base_delay_ms: u64,      // 首次退避时长
    pub backoff_multiplier: u32, // 退避倍率
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 50,
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay_ms: u64, backoff_multiplier: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay_ms,
            backoff_multiplier,
        }
    }

    /// 第 attempt 次失败后的退避时长（attempt 从 1 计）
    fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self.backoff_multiplier.saturating_pow(attempt.saturating_sub(1));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor as u64))
    }

    /// 执行带重试的写操作
    ///
    /// 仅乐观锁冲突触发重试（每次重试前调用方闭包应重读当前版本）；
    /// 其他错误立即透传。重试耗尽后返回最后一次冲突错误，由调用方上抛。
    pub fn run<T, F>(&self, mut op: F) -> RepositoryResult<T>
    where
        F: FnMut() -> RepositoryResult<T>,
    {
        let mut attempt = 1u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if is_retryable(&err) => {
                    if attempt >= self.max_attempts {
                        tracing::warn!(
                            attempts = attempt,
                            error = %err,
                            "乐观锁重试耗尽"
                        );
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt = attempt,
                        delay_ms = delay.as_millis() as u64,
                        "乐观锁冲突，退避后重试"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// 冲突类错误可重试，其余不可
fn is_retryable(err: &RepositoryError) -> bool {
    matches!(
        err,
        RepositoryError::OptimisticLockFailure { .. } | RepositoryError::VersionConflict { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn conflict() -> RepositoryError {
        RepositoryError::OptimisticLockFailure {
            stock_id: 1,
            expected: 0,
            actual: 1,
        }
    }

    #[test]
    fn test_success_first_attempt() {
        let policy = RetryPolicy::default();
        let mut calls = 0;
        let result: RepositoryResult<i32> = policy.run(|| {
            calls += 1;
            Ok(42)
        });
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_retries_then_succeeds() {
        let policy = RetryPolicy::new(3, 1, 2);
        let mut calls = 0;
        let result: RepositoryResult<i32> = policy.run(|| {
            calls += 1;
            if calls < 3 {
                Err(conflict())
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_exhausted_returns_conflict() {
        let policy = RetryPolicy::new(3, 1, 2);
        let mut calls = 0;
        let result: RepositoryResult<i32> = policy.run(|| {
            calls += 1;
            Err(conflict())
        });
        assert!(matches!(
            result,
            Err(RepositoryError::OptimisticLockFailure { .. })
        ));
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_non_retryable_propagates_immediately() {
        let policy = RetryPolicy::new(3, 1, 2);
        let mut calls = 0;
        let result: RepositoryResult<i32> = policy.run(|| {
            calls += 1;
            Err(RepositoryError::ValidationError("负数量".to_string()))
        });
        assert!(matches!(result, Err(RepositoryError::ValidationError(_))));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_delay_progression() {
        let policy = RetryPolicy::new(4, 50, 2);
        assert_eq!(policy.delay_for(1), Duration::from_millis(50));
        assert_eq!(policy.delay_for(2), Duration::from_millis(100));
        assert_eq!(policy.delay_for(3), Duration::from_millis(200));
    }
}
