//! Kafka 消费者与事件分发
//!
//! 每个 topic 一个消费者（独立消费组），消息逐条交给对应的处理器：
//! - 处理成功或消息无法解码：提交位移
//! - 解码成功但处理失败（包括事件缺少关联键）：不提交，由 `KafkaConsumer` 回退位移并退避重投

use ledger_shared::config::KafkaConfig;
use ledger_shared::error::LedgerError;
use ledger_shared::kafka::{ConsumerMessage, KafkaConsumer};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::error::EventError;
use crate::handlers::MessageHandler;

/// 单 topic 的事件消费者
pub struct EventConsumer<H> {
    consumer: KafkaConsumer,
    topic: String,
    handler: H,
}

impl<H: MessageHandler> EventConsumer<H> {
    /// `group_suffix` 让两类事件使用各自的消费组，互不影响位移
    pub fn new(
        config: &KafkaConfig,
        topic: &str,
        group_suffix: &str,
        handler: H,
    ) -> Result<Self, EventError> {
        let consumer = KafkaConsumer::new(config, Some(group_suffix))?;
        Ok(Self {
            consumer,
            topic: topic.to_string(),
            handler,
        })
    }

    /// 启动消费循环，直到收到 shutdown 信号
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> Result<(), EventError> {
        self.consumer.subscribe(&[self.topic.as_str()])?;

        let event = self.handler.event_name();
        info!(topic = %self.topic, event, "事件消费者已启动");

        let handler = self.handler;
        self.consumer
            .start(shutdown, |msg| {
                let handler = &handler;
                async move { dispatch(handler, &msg).await }
            })
            .await;

        info!(topic = %self.topic, event, "事件消费者已停止");
        Ok(())
    }
}

/// 处理单条消息，返回值决定位移是否提交
///
/// 独立为函数，便于在测试中直接调用而无需构造完整的 Consumer。
pub async fn dispatch<H: MessageHandler + ?Sized>(
    handler: &H,
    msg: &ConsumerMessage,
) -> Result<(), LedgerError> {
    handler.handle(msg).await.map_err(|e| {
        warn!(
            event = handler.event_name(),
            topic = %msg.topic,
            partition = msg.partition,
            offset = msg.offset,
            error = %e,
            "事件处理失败，位移不提交"
        );
        e.into()
    })
}
