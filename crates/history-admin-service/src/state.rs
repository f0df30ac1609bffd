//! 应用状态定义
//!
//! 包含 Axum 路由共享的应用状态

use std::sync::Arc;

use transaction_history::client::ReceiverClient;
use transaction_history::{LedgerRepository, LedgerService, PointService};

/// 管理端使用的账本服务：两套存储均以 trait 对象注入，不执行事件合并
pub type HistoryService = LedgerService<dyn LedgerRepository, dyn LedgerRepository, ()>;

/// 积分下单转发服务
pub type PointForwarder = PointService<dyn ReceiverClient>;

/// Axum 应用共享状态
///
/// 服务在 main 中构造后通过 Arc 在 handler 间共享
#[derive(Clone)]
pub struct AppState {
    pub history: Arc<HistoryService>,
    pub points: Arc<PointForwarder>,
}

impl AppState {
    pub fn new(history: HistoryService, points: PointForwarder) -> Self {
        Self {
            history: Arc::new(history),
            points: Arc::new(points),
        }
    }

    /// 由两套仓储和积分接收客户端组装状态
    pub fn from_parts(
        document: Arc<dyn LedgerRepository>,
        relational: Arc<dyn LedgerRepository>,
        receiver: Arc<dyn ReceiverClient>,
    ) -> Self {
        Self::new(
            LedgerService::new(document, relational, Arc::new(())),
            PointService::new(receiver),
        )
    }
}
