//! 基础设施错误
//!
//! 只覆盖进程启动与资源初始化（配置、连接池、迁移）；
//! 交易业务错误定义在 `transaction_engine::error`。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommerceError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("数据库迁移失败: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("配置错误: {0}")]
    Config(#[from] config::ConfigError),

    #[error("配置校验失败: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, CommerceError>;

impl CommerceError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Database(_) => "DATABASE_ERROR",
            Self::Migration(_) => "MIGRATION_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Validation(_) => "VALIDATION_ERROR",
        }
    }

    /// 连接池超时、连接被关闭等瞬时故障
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Database(sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_))
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            CommerceError::Validation("batch_size 必须大于 0".to_string()).code(),
            "VALIDATION_ERROR"
        );
        assert_eq!(
            CommerceError::Database(sqlx::Error::RowNotFound).code(),
            "DATABASE_ERROR"
        );
    }

    #[test]
    fn test_only_transient_database_errors_retryable() {
        assert!(CommerceError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!CommerceError::Database(sqlx::Error::RowNotFound).is_retryable());
        assert!(!CommerceError::Validation("x".to_string()).is_retryable());
    }
}
