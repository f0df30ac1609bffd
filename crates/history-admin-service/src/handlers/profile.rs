//! 交易历史 API 处理器
//!
//! MongoDB 端点支持完整的增删改查，PostgreSQL 端点只提供查询与创建。

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
};
use tracing::info;
use transaction_history::{HistoryPage, TransactionRecord};
use validator::Validate;

use crate::{
    dto::{ApiResponse, DeleteParams, HistoryParams, Paging},
    error::{ApiError, Result},
    state::AppState,
};

type QueryParams<T> = std::result::Result<Query<T>, QueryRejection>;
type JsonBody<T> = std::result::Result<Json<T>, JsonRejection>;

fn paged(page: HistoryPage) -> ApiResponse<Vec<TransactionRecord>> {
    let paging = Paging {
        offset: page.offset,
        limit: page.limit,
        total: page.total,
    };
    ApiResponse::success(page.records).with_paging(paging)
}

/// 查询交易历史
///
/// GET /v1/profile/user-transaction-history
pub async fn get_history(
    State(state): State<AppState>,
    params: QueryParams<HistoryParams>,
) -> Result<Json<ApiResponse<Vec<TransactionRecord>>>> {
    let Query(params) = params?;
    params.validate()?;

    let page = state.history.get_history(&params.into()).await?;
    Ok(Json(paged(page)))
}

/// 创建交易记录
///
/// POST /v1/profile/user-transaction-history
///
/// 请求体为 `null` 时返回 NotFound（order cannot be nil）。
pub async fn create_record(
    State(state): State<AppState>,
    body: JsonBody<Option<TransactionRecord>>,
) -> Result<Json<ApiResponse<TransactionRecord>>> {
    let Json(record) = body?;

    let created = state.history.create_record(record).await?;
    Ok(Json(ApiResponse::success(created)))
}

/// 覆盖该用户最近的一条记录，用户取请求体中的 profileID
///
/// PUT /v1/profile/user-transaction-history
pub async fn update_record(
    State(state): State<AppState>,
    body: JsonBody<TransactionRecord>,
) -> Result<Json<ApiResponse<TransactionRecord>>> {
    let Json(record) = body?;
    if record.profile_id.is_empty() {
        return Err(ApiError::Validation("profileID is required".to_string()));
    }

    let profile_id = record.profile_id.clone();
    let updated = state.history.update_record(record, &profile_id).await;
    Ok(Json(ApiResponse::success(updated)))
}

/// 删除该用户的全部记录
///
/// DELETE /v1/profile/user-transaction-history?profileID=
pub async fn delete_record(
    State(state): State<AppState>,
    params: QueryParams<DeleteParams>,
) -> Result<Json<ApiResponse<()>>> {
    let Query(params) = params?;
    params.validate()?;

    state.history.delete_record(&params.profile_id).await;
    info!(profile_id = %params.profile_id, "删除交易历史请求已处理");
    Ok(Json(ApiResponse::<()>::success_empty()))
}

/// 查询交易历史（PostgreSQL）
///
/// GET /v1/profile/user-transaction-history-postgresql
pub async fn get_history_relational(
    State(state): State<AppState>,
    params: QueryParams<HistoryParams>,
) -> Result<Json<ApiResponse<Vec<TransactionRecord>>>> {
    let Query(params) = params?;
    params.validate()?;

    let page = state.history.get_history_relational(&params.into()).await?;
    Ok(Json(paged(page)))
}

/// 创建交易记录（PostgreSQL）
///
/// POST /v1/profile/user-transaction-history-postgresql
pub async fn create_record_relational(
    State(state): State<AppState>,
    body: JsonBody<Option<TransactionRecord>>,
) -> Result<Json<ApiResponse<TransactionRecord>>> {
    let Json(record) = body?;

    let created = state.history.create_record_relational(record).await?;
    Ok(Json(ApiResponse::success(created)))
}
