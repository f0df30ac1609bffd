//! 积分接收服务客户端
//!
//! 把积分订单转发到 rewards receiver 的内部接口，携带内部令牌与来源地区。

use std::time::Duration;

use async_trait::async_trait;
use ledger_shared::config::ReceiverConfig;
use ledger_shared::error::{LedgerError, Result};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::service::dto::OrderMessage;

/// 积分发放下单路径（action = earn，source = rewards）
pub const ORDER_EARN_PATH: &str = "/rewards/receiver/v1/internal/order/earn/rewards";

/// 地区请求头
pub const CLIENT_REGION_HEADER: &str = "X-Client-Region";

const SERVICE: &str = "rewards-receiver";

/// 积分接收服务
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReceiverClient: Send + Sync {
    async fn post_order(&self, region: &str, message: &OrderMessage) -> Result<()>;
}

/// 基于 reqwest 的实现
#[derive(Clone)]
pub struct HttpReceiverClient {
    client: Client,
    endpoint: String,
    token: String,
}

impl HttpReceiverClient {
    pub fn new(config: &ReceiverConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| LedgerError::Config(format!("receiver http client: {e}")))?;

        Ok(Self {
            client,
            endpoint: format!("{}{}", config.base_url.trim_end_matches('/'), ORDER_EARN_PATH),
            token: config.internal_token.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn external(message: impl Into<String>) -> LedgerError {
    LedgerError::ExternalService {
        service: SERVICE.to_string(),
        message: message.into(),
    }
}

#[async_trait]
impl ReceiverClient for HttpReceiverClient {
    #[instrument(skip(self, message), fields(source_type = %message.source_type))]
    async fn post_order(&self, region: &str, message: &OrderMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .header(CLIENT_REGION_HEADER, region)
            .json(message)
            .send()
            .await
            .map_err(|e| external(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(external(format!("status {status}: {body}")));
        }

        debug!(%status, "order forwarded to receiver");
        Ok(())
    }
}
