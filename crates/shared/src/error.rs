//! 统一错误处理模块
//!
//! 定义账本系统中所有共享的错误类型，使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// PostgreSQL 可串行化冲突
const PG_SERIALIZATION_FAILURE: &str = "40001";
/// PostgreSQL 死锁
const PG_DEADLOCK_DETECTED: &str = "40P01";
/// PostgreSQL 唯一约束冲突（并发 upsert 插入竞争）
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// 系统错误类型
#[derive(Debug, Error)]
pub enum LedgerError {
    // ==================== 存储错误 ====================
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("MongoDB 错误: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("BSON 编解码失败: {0}")]
    Bson(String),

    /// `key` 为发生冲突的唯一键，如 `transaction_id=T1` 或 `profile_id=P1, reference_code=ORD-1`
    #[error("交易记录已存在: {key}")]
    DuplicateTransaction { key: String },

    #[error("记录未找到: {entity} {key}")]
    NotFound { entity: String, key: String },

    // ==================== Kafka 错误 ====================
    #[error("Kafka 错误: {0}")]
    Kafka(String),

    // ==================== 验证错误 ====================
    #[error("参数验证失败: {0}")]
    Validation(String),

    // ==================== 事务错误 ====================
    #[error("事务超时: {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("事务失败: {0}")]
    Transaction(String),

    // ==================== 配置与外部服务 ====================
    #[error("配置错误: {0}")]
    Config(String),

    #[error("外部服务错误: {service} - {message}")]
    ExternalService { service: String, message: String },

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, LedgerError>;

impl LedgerError {
    pub fn not_found(entity: impl Into<String>, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            key: key.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Mongo(_) => "MONGO_ERROR",
            Self::Bson(_) => "BSON_ERROR",
            Self::DuplicateTransaction { .. } => "DUPLICATE_TRANSACTION",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Kafka(_) => "KAFKA_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Transaction(_) => "TRANSACTION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误（消费者退避重投、外部调用重试）
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Database(_) | Self::Kafka(_) | Self::Timeout { .. } => true,
            Self::ExternalService { .. } => true,
            Self::Mongo(e) => {
                e.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR)
                    || e.contains_label(mongodb::error::RETRYABLE_WRITE_ERROR)
                    || matches!(
                        *e.kind,
                        mongodb::error::ErrorKind::Io(_)
                            | mongodb::error::ErrorKind::ServerSelection { .. }
                            | mongodb::error::ErrorKind::ConnectionPoolCleared { .. }
                    )
            }
            _ => false,
        }
    }

    /// 是否为事务内的瞬时冲突，执行器据此重跑整个事务单元
    pub fn is_transient_conflict(&self) -> bool {
        match self {
            Self::Database(sqlx::Error::Database(db)) => matches!(
                db.code().as_deref(),
                Some(PG_SERIALIZATION_FAILURE | PG_DEADLOCK_DETECTED | PG_UNIQUE_VIOLATION)
            ),
            Self::Mongo(e) => e.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR),
            _ => false,
        }
    }

    /// 提交结果未知，可单独重试提交
    pub fn is_unknown_commit_result(&self) -> bool {
        match self {
            Self::Mongo(e) => e.contains_label(mongodb::error::UNKNOWN_TRANSACTION_COMMIT_RESULT),
            _ => false,
        }
    }
}

impl From<mongodb::bson::ser::Error> for LedgerError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        Self::Bson(err.to_string())
    }
}

impl From<mongodb::bson::de::Error> for LedgerError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        Self::Bson(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        let err = LedgerError::not_found("transaction_history", "profile_id=P1");
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "记录未找到: transaction_history profile_id=P1");
    }

    #[test]
    fn test_is_retryable() {
        let db_err = LedgerError::Database(sqlx::Error::PoolTimedOut);
        assert!(db_err.is_retryable());

        let not_found = LedgerError::not_found("transaction_history", "P1");
        assert!(!not_found.is_retryable());

        let duplicate = LedgerError::DuplicateTransaction {
            key: "transaction_id=T1".to_string(),
        };
        assert!(!duplicate.is_retryable());
    }

    #[test]
    fn test_pool_timeout_is_not_a_transaction_conflict() {
        let db_err = LedgerError::Database(sqlx::Error::PoolTimedOut);
        assert!(!db_err.is_transient_conflict());
        assert!(!db_err.is_unknown_commit_result());
    }

    #[test]
    fn test_timeout_message() {
        let err = LedgerError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.code(), "TIMEOUT");
        assert!(err.to_string().contains("5000"));
    }
}
