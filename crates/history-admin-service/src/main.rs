//! 交易历史管理服务
//!
//! 提供交易历史查询、维护与积分下单转发的 REST API。

use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, middleware, routing::get};
use history_admin_service::{routes, state::AppState};
use ledger_shared::{
    config::AppConfig,
    database::Database,
    mongo::MongoStore,
    observability::{self, middleware as obs_middleware},
    retry::{RetryPolicy, retry_with_policy},
};
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tracing::info;
use transaction_history::{
    LedgerRepository, MongoLedgerRepository, PostgresLedgerRepository,
    client::{HttpReceiverClient, ReceiverClient},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 统一加载配置：从 config/{service_name}.toml 加载，包含可观测性配置
    let config = AppConfig::load("history-admin-service").unwrap_or_default();

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting history-admin-service on {}", config.server_addr());

    // 初始化基础设施：启动阶段的瞬时连接失败按默认策略退避重试
    let startup = RetryPolicy::startup();
    let db = retry_with_policy(&startup, "connect_postgres", |e| e.is_retryable(), || {
        Database::connect(&config.database)
    })
    .await?;
    if config.database.run_migrations {
        db.run_migrations().await?;
    }
    let mongo = retry_with_policy(&startup, "connect_mongodb", |e| e.is_retryable(), || {
        MongoStore::connect(&config.mongodb)
    })
    .await?;

    let document: Arc<dyn LedgerRepository> = Arc::new(
        MongoLedgerRepository::new(mongo.database(), &config.mongodb.collection).await?,
    );
    let relational: Arc<dyn LedgerRepository> =
        Arc::new(PostgresLedgerRepository::new(db.pool().clone()));
    let receiver: Arc<dyn ReceiverClient> = Arc::new(HttpReceiverClient::new(&config.receiver)?);

    let state = AppState::from_parts(document, relational, receiver);

    let app = Router::new()
        .merge(routes::app(state))
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let db_for_ready = db.clone();
                let mongo_for_ready = mongo;
                move || readiness_check(db_for_ready.clone(), mongo_for_ready.clone())
            }),
        )
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_seconds,
        )))
        // 可观测性中间件：请求追踪和指标收集
        .layer(middleware::from_fn(obs_middleware::http_tracing))
        .layer(middleware::from_fn(obs_middleware::request_id));

    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Listening on {}", config.server_addr());

    // 优雅关闭：收到 SIGTERM 或 Ctrl+C 时停止接收新连接并等待已有请求处理完毕
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");

    Ok(())
}

/// 监听关闭信号
///
/// 注册信号处理器失败时该路信号永不触发，另一路仍然有效。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}

/// 存活探针：服务进程正常即返回 ok
async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "history-admin-service"
    }))
}

/// 就绪探针：检查 PostgreSQL 与 MongoDB 是否可用
async fn readiness_check(db: Database, mongo: MongoStore) -> Json<serde_json::Value> {
    let db_ok = db.health_check().await.is_ok();
    let mongo_ok = mongo.health_check().await.is_ok();
    let all_ok = db_ok && mongo_ok;

    Json(serde_json::json!({
        "status": if all_ok { "ok" } else { "degraded" },
        "service": "history-admin-service",
        "checks": {
            "database": if db_ok { "ok" } else { "fail" },
            "mongodb": if mongo_ok { "ok" } else { "fail" }
        }
    }))
}
