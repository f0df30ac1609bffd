//! 管理端错误类型定义
//!
//! 参数绑定与校验失败返回 400 + DataInvalid；服务层错误沿用既有约定返回 404，
//! 错误码取服务错误自带的业务码。

use axum::Json;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use transaction_history::{ErrorCode, ServiceError};

use crate::dto::ApiResponse;

/// 管理端错误类型
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("参数验证失败: {0}")]
    Validation(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl ApiError {
    /// 返回对应的 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Service(_) => StatusCode::NOT_FOUND,
        }
    }

    /// 返回业务错误码
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::DataInvalid,
            Self::Service(e) => e.code,
        }
    }

    fn description(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Service(e) => e.description.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if let Self::Service(e) = &self {
            tracing::warn!(code = e.code.code(), description = %e.description, "请求处理失败");
        }

        let body = ApiResponse::<()>::error(self.error_code(), self.description());
        (status, Json(body)).into_response()
    }
}

/// 从 validator 错误转换
impl From<validator::ValidationErrors> for ApiError {
    fn from(errors: validator::ValidationErrors) -> Self {
        Self::Validation(errors.to_string())
    }
}

/// 查询参数绑定失败
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

/// 请求体绑定失败
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

/// 管理端 Result 类型别名
pub type Result<T> = std::result::Result<T, ApiError>;
