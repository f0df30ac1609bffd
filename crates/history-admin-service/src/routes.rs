//! 路由配置模块
//!
//! 定义所有 REST API 端点的路由映射

use axum::{
    Router,
    routing::{get, post},
};

use crate::{handlers, state::AppState};

/// 所有业务端点的公共前缀
pub const API_PREFIX: &str = "/build-service-gin/api-main";

/// 构建交易历史相关的路由
pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/v1/profile/user-transaction-history",
            get(handlers::profile::get_history)
                .post(handlers::profile::create_record)
                .put(handlers::profile::update_record)
                .delete(handlers::profile::delete_record),
        )
        .route(
            "/v1/profile/user-transaction-history-postgresql",
            get(handlers::profile::get_history_relational)
                .post(handlers::profile::create_record_relational),
        )
}

/// 构建积分下单路由
pub fn point_routes() -> Router<AppState> {
    Router::new().route(
        "/v1/point/create-point-transaction",
        post(handlers::point::create_point_transaction),
    )
}

/// 构建完整的 API 路由（不含前缀）
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(profile_routes())
        .merge(point_routes())
        .route("/v1/health", get(handlers::health::health))
}

/// 挂载前缀并注入状态
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest(API_PREFIX, api_routes())
        .with_state(state)
}
