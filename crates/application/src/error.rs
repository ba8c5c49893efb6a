//! 应用层错误定义
//!
//! 每个变体对应一个稳定的对外错误码，由 web 层映射为 HTTP 状态。

use domain::{DomainError, RepositoryError};
use thiserror::Error;
use validator::ValidationErrors;

use crate::validation::describe_validation_errors;

/// 应用层错误类型
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ApplicationError {
    /// 输入缺失或格式错误
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// 名称已被占用
    #[error("conflict: {0}")]
    Conflict(String),

    /// 操作者未提供身份或未登记
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// 操作者不是消息作者
    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// 存储失败，不自动重试
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApplicationError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

/// 应用层结果类型
pub type ApplicationResult<T> = Result<T, ApplicationError>;

impl From<DomainError> for ApplicationError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::InvalidArgument { field, reason } => {
                ApplicationError::InvalidArgument(format!("{field} {reason}"))
            }
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => ApplicationError::NotFound("record not found".into()),
            RepositoryError::Conflict => {
                ApplicationError::Conflict("record already exists".into())
            }
            RepositoryError::Storage { message } => ApplicationError::Internal(message),
        }
    }
}

impl From<ValidationErrors> for ApplicationError {
    fn from(value: ValidationErrors) -> Self {
        ApplicationError::InvalidArgument(describe_validation_errors(&value))
    }
}
