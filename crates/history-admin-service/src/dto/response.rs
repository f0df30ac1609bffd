//! 统一响应信封
//!
//! 所有端点都返回 `{errorCode, description, message, data, paging?}`：
//! 成功时 errorCode 为 1、message 为 "Success"，失败时 data 为 null。

use serde::{Deserialize, Serialize};
use transaction_history::ErrorCode;

/// 分页信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paging {
    pub offset: i64,
    pub limit: i64,
    pub total: i64,
}

/// 统一 API 响应
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub error_code: i32,
    #[serde(default)]
    pub description: String,
    pub message: String,
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

impl<T> ApiResponse<T> {
    /// 创建成功响应
    pub fn success(data: T) -> Self {
        Self {
            error_code: ErrorCode::StatusOk.code(),
            description: String::new(),
            message: ErrorCode::StatusOk.message().to_string(),
            data: Some(data),
            paging: None,
        }
    }

    /// 附带分页信息
    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = Some(paging);
        self
    }

    /// 创建成功响应（无数据）
    pub fn success_empty() -> ApiResponse<()> {
        ApiResponse {
            error_code: ErrorCode::StatusOk.code(),
            description: String::new(),
            message: ErrorCode::StatusOk.message().to_string(),
            data: None,
            paging: None,
        }
    }

    /// 创建错误响应
    pub fn error(code: ErrorCode, description: impl Into<String>) -> ApiResponse<()> {
        ApiResponse {
            error_code: code.code(),
            description: description.into(),
            message: code.message().to_string(),
            data: None,
            paging: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let response = ApiResponse::success(vec!["a"]).with_paging(Paging {
            offset: 0,
            limit: 1,
            total: 5,
        });
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["errorCode"], 1);
        assert_eq!(json["message"], "Success");
        assert_eq!(json["description"], "");
        assert_eq!(json["data"][0], "a");
        assert_eq!(json["paging"]["total"], 5);
    }

    #[test]
    fn test_error_envelope_has_no_paging() {
        let response = ApiResponse::<()>::error(ErrorCode::NotFound, "order cannot be nil");
        let json = serde_json::to_value(&response).unwrap();

        assert_eq!(json["errorCode"], 1001);
        assert_eq!(json["message"], "Data not found");
        assert_eq!(json["description"], "order cannot be nil");
        assert!(json["data"].is_null());
        assert!(json.get("paging").is_none());
    }
}
