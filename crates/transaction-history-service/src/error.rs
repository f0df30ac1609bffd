//! 业务错误码与服务错误
//!
//! 服务层对外只暴露 `{errorCode, description}` 形状的错误，
//! 存储层错误在服务边界被映射为对应的业务错误码。

use ledger_shared::error::LedgerError;
use serde::Serialize;
use thiserror::Error;

/// 业务错误码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    StatusOk,
    System,
    NotFound,
    DataInvalid,
    StoreFailed,
}

impl ErrorCode {
    /// 对外的数值错误码
    pub fn code(self) -> i32 {
        match self {
            Self::StatusOk => 1,
            Self::System => 1000,
            Self::NotFound => 1001,
            Self::DataInvalid => 1002,
            Self::StoreFailed => 1003,
        }
    }

    /// 对外的英文提示
    pub fn message(self) -> &'static str {
        match self {
            Self::StatusOk => "Success",
            Self::System => "System error",
            Self::NotFound => "Data not found",
            Self::DataInvalid => "Data invalid",
            Self::StoreFailed => "There was an error during the data saving process",
        }
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i32(self.code())
    }
}

/// 服务错误：错误码 + 描述
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[error("{}: {description}", code.message())]
#[serde(rename_all = "camelCase")]
pub struct ServiceError {
    #[serde(rename = "errorCode")]
    pub code: ErrorCode,
    pub description: String,
}

impl ServiceError {
    pub fn new(code: ErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
        }
    }

    pub fn not_found(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, description)
    }

    pub fn system(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::System, description)
    }

    pub fn data_invalid(description: impl Into<String>) -> Self {
        Self::new(ErrorCode::DataInvalid, description)
    }

    /// 读取与创建路径沿用的映射：任何存储错误都报告为 NotFound，描述保留存储错误
    pub fn not_found_from(err: &LedgerError) -> Self {
        Self::not_found(err.to_string())
    }

    /// 事件路径的映射：存储错误报告为 System，校验错误报告为 DataInvalid
    pub fn system_from(err: &LedgerError) -> Self {
        match err {
            LedgerError::Validation(msg) => Self::data_invalid(msg.clone()),
            other => Self::system(other.to_string()),
        }
    }
}

/// 服务层 Result 类型别名
pub type Result<T> = std::result::Result<T, ServiceError>;
