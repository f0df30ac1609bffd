//! 积分事件消费服务
//!
//! 消费订单成功与积分发放完成事件，合并进 MongoDB 中的交易历史。

use std::sync::Arc;

use axum::{Json, Router, routing::get};
use event_point_service::consumer::EventConsumer;
use event_point_service::handlers::{EarnPointHandler, OrderSuccessHandler};
use ledger_shared::{
    config::AppConfig,
    mongo::MongoStore,
    observability,
    retry::{RetryPolicy, retry_with_policy},
};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};
use transaction_history::{LedgerService, MongoLedgerRepository, MongoTransactionExecutor};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("event-point-service").unwrap_or_default();

    let obs_config = config.observability.clone().with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!("Starting event-point-service...");

    let mongo = retry_with_policy(
        &RetryPolicy::startup(),
        "connect_mongodb",
        |e| e.is_retryable(),
        || MongoStore::connect(&config.mongodb),
    )
    .await?;
    let repo = Arc::new(
        MongoLedgerRepository::new(mongo.database(), &config.mongodb.collection).await?,
    );
    let executor = Arc::new(MongoTransactionExecutor::new(
        mongo.client().clone(),
        &config.ledger,
    ));
    let ledger = Arc::new(LedgerService::single_backend(repo, executor));

    let order_consumer = EventConsumer::new(
        &config.kafka,
        &config.topics.rewards_point,
        "order",
        OrderSuccessHandler::new(ledger.clone()),
    )?;
    let earn_consumer = EventConsumer::new(
        &config.kafka,
        &config.topics.core_transaction_point_success,
        "earn",
        EarnPointHandler::new(ledger),
    )?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let order_task = tokio::spawn(order_consumer.run(shutdown_rx.clone()));
    let earn_task = tokio::spawn(earn_consumer.run(shutdown_rx.clone()));

    // 探针端口：存活与就绪（MongoDB 可达）
    let app = Router::new()
        .route("/health", get(health_check))
        .route(
            "/ready",
            get({
                let mongo_for_ready = mongo;
                move || readiness_check(mongo_for_ready.clone())
            }),
        );
    let listener = TcpListener::bind(config.server_addr()).await?;
    info!("Probe endpoints listening on {}", config.server_addr());

    let mut probe_shutdown = shutdown_rx;
    let probe_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = probe_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);

    for (name, task) in [("order", order_task), ("earn", earn_task)] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!(consumer = name, error = %e, "消费者异常退出"),
            Err(e) => error!(consumer = name, error = %e, "消费者任务 panic"),
        }
    }
    if let Err(e) = probe_task.await? {
        error!(error = %e, "探针服务异常退出");
    }

    info!("event-point-service shutdown complete");
    Ok(())
}

/// 监听关闭信号（SIGTERM 或 Ctrl+C）
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "注册 Ctrl+C 处理器失败");
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
                error!(error = %e, "注册 SIGTERM 处理器失败");
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

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "event-point-service"
    }))
}

async fn readiness_check(mongo: MongoStore) -> Json<serde_json::Value> {
    let mongo_ok = mongo.health_check().await.is_ok();

    Json(serde_json::json!({
        "status": if mongo_ok { "ok" } else { "degraded" },
        "service": "event-point-service",
        "checks": {
            "mongodb": if mongo_ok { "ok" } else { "fail" }
        }
    }))
}
