//! 健康检查处理器

use axum::Json;
use serde_json::{Value, json};

use crate::dto::ApiResponse;

/// GET /v1/health
pub async fn health() -> Json<ApiResponse<Value>> {
    Json(ApiResponse::success(json!({ "status": "ok" })))
}
