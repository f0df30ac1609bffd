//! 事件处理器
//!
//! 每个处理器负责一个 topic：解码回调信封 → 映射领域事件 → 调用账本服务 → 记录结果。
//! 处理器本身不重试，失败原样返回给消费循环，由消费循环决定回退重投。

mod earn_point;
mod order_success;

pub use earn_point::EarnPointHandler;
pub use order_success::OrderSuccessHandler;

use std::future::Future;
use std::time::Instant;

use async_trait::async_trait;
use ledger_shared::kafka::ConsumerMessage;
use ledger_shared::observability::{metrics, tracing::upstream_trace_id};
use tracing::{Instrument, error, info, info_span};
use transaction_history::events::{EarnPointCompleteEvent, OrderSuccessEvent};
use transaction_history::repository::{SessionUpsert, TransactionExecutor};
use transaction_history::{LedgerService, Result as ServiceResult};
use uuid::Uuid;

use crate::error::EventError;

/// 账本的事件合并入口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerEvents: Send + Sync {
    async fn order_success(&self, event: &OrderSuccessEvent) -> ServiceResult<()>;

    async fn earn_point_complete(&self, event: &EarnPointCompleteEvent) -> ServiceResult<()>;
}

#[async_trait]
impl<D, R, E> LedgerEvents for LedgerService<D, R, E>
where
    E: TransactionExecutor + 'static,
    D: SessionUpsert<E::Session> + 'static,
    R: Send + Sync + ?Sized + 'static,
{
    async fn order_success(&self, event: &OrderSuccessEvent) -> ServiceResult<()> {
        self.handle_order_success(event).await
    }

    async fn earn_point_complete(&self, event: &EarnPointCompleteEvent) -> ServiceResult<()> {
        self.handle_earn_point_complete(event).await
    }
}

/// 单个 topic 的消息处理器
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// 指标与日志中使用的事件名
    fn event_name(&self) -> &'static str;

    async fn handle(&self, msg: &ConsumerMessage) -> Result<(), EventError>;
}

/// 解码失败的消息：记录后跳过，位移照常提交
///
/// 原始消息可能带支付流水号，日志只记录元数据与长度。
fn skip_undecodable(event: &'static str, msg: &ConsumerMessage, err: &dyn std::fmt::Display, start: Instant) {
    error!(
        event,
        topic = %msg.topic,
        partition = msg.partition,
        offset = msg.offset,
        key = ?msg.key,
        payload_len = msg.payload.len(),
        error = %err,
        "消息解码失败，跳过"
    );
    metrics::record_ledger_event(event, "skipped", start.elapsed().as_secs_f64());
}

/// 在带请求 ID 的 span 中执行账本调用，并记录结果与耗时
async fn process<F>(event: &'static str, msg: &ConsumerMessage, start: Instant, call: F) -> Result<(), EventError>
where
    F: Future<Output = ServiceResult<()>>,
{
    let request_id = msg
        .request_id()
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let upstream = upstream_trace_id(&msg.headers).unwrap_or_default();

    let span = info_span!(
        "ledger_event",
        event,
        request_id = %request_id,
        upstream_trace_id = %upstream,
        topic = %msg.topic,
        partition = msg.partition,
        offset = msg.offset,
    );

    let result = call.instrument(span.clone()).await;
    let elapsed = start.elapsed().as_secs_f64();

    let _entered = span.enter();
    match result {
        Ok(()) => {
            metrics::record_ledger_event(event, "success", elapsed);
            info!("事件处理成功");
            Ok(())
        }
        Err(e) => {
            metrics::record_ledger_event(event, "failed", elapsed);
            error!(code = e.code.code(), description = %e.description, "事件处理失败");
            Err(e.into())
        }
    }
}


#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::HashMap;

    use ledger_shared::kafka::{ConsumerMessage, TRACE_INFO_HEADER};

    pub fn message(topic: &str, payload: &str) -> ConsumerMessage {
        ConsumerMessage {
            topic: topic.to_string(),
            partition: 0,
            offset: 42,
            key: None,
            payload: payload.as_bytes().to_vec(),
            timestamp: None,
            headers: HashMap::from([(
                TRACE_INFO_HEADER.to_string(),
                r#"{"request_id":"req-1"}"#.to_string(),
            )]),
        }
    }
}
