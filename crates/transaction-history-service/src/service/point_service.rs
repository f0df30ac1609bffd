//! 积分下单服务
//!
//! 为管理端发起的积分订单生成新的订单号，序列化后转发给积分接收服务。

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::client::ReceiverClient;
use crate::error::{Result, ServiceError};
use crate::service::dto::{OrderMessage, OrderPoint, OrderRequest};

pub struct PointService<C: ?Sized> {
    receiver: Arc<C>,
}

impl<C: ?Sized> Clone for PointService<C> {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
        }
    }
}

impl<C: ReceiverClient + ?Sized> PointService<C> {
    pub fn new(receiver: Arc<C>) -> Self {
        Self { receiver }
    }

    /// 转发积分订单，返回生成的订单号
    ///
    /// 请求中的订单号与创建时间不会被转发，订单号重新生成（UUIDv7），创建时间取当前时间。
    #[instrument(skip(self, order), fields(vga_user_id = %order.vga_user_id))]
    pub async fn create_point_transaction(&self, region: &str, order: OrderRequest) -> Result<String> {
        let point = OrderPoint {
            order_number: Uuid::now_v7().to_string(),
            create_time: Utc::now().timestamp_millis(),
            amount: order.amount,
            currency: order.currency,
            vga_user_id: order.vga_user_id,
            region: region.to_string(),
        };

        let value = serde_json::to_string(&point).map_err(|e| {
            error!(error = %e, "订单序列化失败");
            ServiceError::system("Failed to process order data")
        })?;

        let message = OrderMessage {
            source_type: order.source_type,
            value,
            sign: String::new(),
        };

        self.receiver
            .post_order(region, &message)
            .await
            .map_err(|e| {
                error!(error = %e, "积分订单转发失败");
                ServiceError::system("error create order point")
            })?;

        info!(order_number = %point.order_number, "积分订单已转发");
        Ok(point.order_number)
    }
}
