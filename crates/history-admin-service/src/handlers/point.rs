//! 积分下单 API 处理器

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::HeaderMap,
};
use serde::Serialize;
use transaction_history::service::OrderRequest;

use crate::{
    dto::ApiResponse,
    error::{ApiError, Result},
    state::AppState,
};

/// 调用方所在区域的请求头
pub const CLIENT_REGION_HEADER: &str = "x-client-region";

/// 下单结果
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTransactionDto {
    pub order_number: String,
}

/// 转发积分订单
///
/// POST /v1/point/create-point-transaction
pub async fn create_point_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: std::result::Result<Json<OrderRequest>, JsonRejection>,
) -> Result<Json<ApiResponse<PointTransactionDto>>> {
    let Json(order) = body?;

    let region = headers
        .get(CLIENT_REGION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation("X-Client-Region header is required".to_string()))?;

    let order_number = state.points.create_point_transaction(region, order).await?;
    Ok(Json(ApiResponse::success(PointTransactionDto { order_number })))
}
