// ==========================================
// Voltech 采集系统 - API层错误类型
// ==========================================
// 职责: 汇总各层错误，转换为用户可读的错误消息
// 约定: 只读列表查询失败时降级为空集合（不走这里）；
//       改变状态的操作一律返回 Err
// ==========================================

use crate::config::settings_manager::ConfigError;
use crate::engine::leadership::LeadershipError;
use crate::engine::pipeline::PipelineError;
use crate::engine::watcher::WatcherError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 配置 / 权限
    // ==========================================
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("需要管理员权限: user={user}, operation={operation}")]
    PermissionDenied { user: String, operation: String },

    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("当前状态不允许该操作: {0}")]
    InvalidState(String),

    // ==========================================
    // 主从 / 导入
    // ==========================================
    #[error("主从仲裁失败: {0}")]
    LeadershipError(String),

    #[error("导入失败: {0}")]
    ImportError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库繁忙: {0}")]
    DatabaseBusy(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 前端使用的错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Configuration(_) => "CONFIGURATION_ERROR",
            ApiError::PermissionDenied { .. } => "PERMISSION_DENIED",
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::InvalidState(_) => "INVALID_STATE",
            ApiError::LeadershipError(_) => "LEADERSHIP_ERROR",
            ApiError::ImportError(_) => "IMPORT_ERROR",
            ApiError::DatabaseError(_) => "DATABASE_ERROR",
            ApiError::DatabaseConnectionError(_) => "DATABASE_CONNECTION_ERROR",
            ApiError::DatabaseBusy(_) => "DATABASE_BUSY",
            ApiError::DatabaseTransactionError(_) => "DATABASE_TRANSACTION_ERROR",
            ApiError::InternalError(_) => "INTERNAL_ERROR",
            ApiError::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseBusy(msg) => ApiError::DatabaseBusy(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::InvalidInput(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ValidationError(msg) => ApiError::InvalidInput(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Repository(e) => e.into(),
            other => ApiError::Configuration(other.to_string()),
        }
    }
}

impl From<LeadershipError> for ApiError {
    fn from(err: LeadershipError) -> Self {
        match err {
            LeadershipError::Repository(e) => e.into(),
            other => ApiError::LeadershipError(other.to_string()),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        ApiError::ImportError(err.to_string())
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Repository(e) => e.into(),
            PipelineError::Scan(e) => e.into(),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

impl From<WatcherError> for ApiError {
    fn from(err: WatcherError) -> Self {
        match err {
            WatcherError::Configuration(e) => e.into(),
            WatcherError::Leadership(e) => e.into(),
            WatcherError::Pipeline(e) => e.into(),
            WatcherError::Repository(e) => e.into(),
            WatcherError::InvalidState(msg) => ApiError::InvalidState(msg),
            WatcherError::InvalidInput(msg) => ApiError::InvalidInput(msg),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "TestResult".to_string(),
            id: "42".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("TestResult"));
                assert!(msg.contains("42"));
            }
            _ => panic!("Expected NotFound"),
        }

        let api_err: ApiError = RepositoryError::DatabaseBusy("locked".to_string()).into();
        assert_eq!(api_err.code(), "DATABASE_BUSY");
    }

    #[test]
    fn test_configuration_errors_are_fatal_configuration() {
        let api_err: ApiError = WatcherError::Configuration(ConfigError::MissingServerPath).into();
        assert_eq!(api_err.code(), "CONFIGURATION_ERROR");
        assert!(api_err.to_string().contains("server_path"));
    }

    #[test]
    fn test_leadership_timeout() {
        let api_err: ApiError =
            LeadershipError::Timeout(std::time::Duration::from_secs(10)).into();
        assert_eq!(api_err.code(), "LEADERSHIP_ERROR");
    }
}
