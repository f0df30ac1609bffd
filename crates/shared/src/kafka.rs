//! Kafka 基础设施封装
//!
//! 将 rdkafka 的底层 API 封装为业务友好的 Consumer 抽象，
//! 统一消息解码、错误映射、手动位移提交和优雅关闭语义。
//!
//! 位移只在 handler 成功后提交；handler 失败时回退到失败消息的位移，
//! 按 `RetryPolicy` 退避后重新投递，形成至少一次的投递语义。

use std::collections::HashMap;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Headers, Message};
use rdkafka::{Offset, TopicPartitionList};
use serde::de::DeserializeOwned;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::KafkaConfig;
use crate::error::LedgerError;
use crate::retry::RetryPolicy;

/// 消息头中携带链路信息的键
pub const TRACE_INFO_HEADER: &str = "trace_info";
/// W3C Trace Context 头
pub const TRACEPARENT_HEADER: &str = "traceparent";

// ---------------------------------------------------------------------------
// ConsumerMessage
// ---------------------------------------------------------------------------

/// 消费到的 Kafka 消息的统一表示
///
/// 将 rdkafka 的 `BorrowedMessage`（带生命周期约束）转换为拥有所有权的结构体，
/// 使消息可以安全地跨 await 点传递给异步处理函数。
#[derive(Debug, Clone)]
pub struct ConsumerMessage {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub timestamp: Option<i64>,
    pub headers: HashMap<String, String>,
}

impl ConsumerMessage {
    /// 从 rdkafka 的借用消息构造，提取并拥有所有字段
    fn from_borrowed(msg: &BorrowedMessage<'_>) -> Self {
        let key = msg
            .key()
            .and_then(|k| std::str::from_utf8(k).ok())
            .map(String::from);

        let payload = msg.payload().map(|p| p.to_vec()).unwrap_or_default();

        let timestamp = msg.timestamp().to_millis();

        let mut headers = HashMap::new();
        if let Some(h) = msg.headers() {
            for idx in 0..h.count() {
                let header = h.get(idx);
                if let Some(raw) = header.value
                    && let Ok(value) = std::str::from_utf8(raw)
                {
                    headers.insert(header.key.to_string(), value.to_string());
                }
            }
        }

        Self {
            topic: msg.topic().to_string(),
            partition: msg.partition(),
            offset: msg.offset(),
            key,
            payload,
            timestamp,
            headers,
        }
    }

    /// 将负载视为 UTF-8 字符串返回
    pub fn payload_str(&self) -> Result<&str, LedgerError> {
        std::str::from_utf8(&self.payload)
            .map_err(|e| LedgerError::Kafka(format!("负载非 UTF-8 编码: {e}")))
    }

    /// 将 JSON 格式负载反序列化为目标类型
    pub fn deserialize_payload<T: DeserializeOwned>(&self) -> Result<T, LedgerError> {
        serde_json::from_slice(&self.payload)
            .map_err(|e| LedgerError::Kafka(format!("负载反序列化失败: {e}")))
    }

    /// 提取请求 ID：优先 `trace_info` 中的 request_id，其次 `traceparent`
    pub fn request_id(&self) -> Option<String> {
        if let Some(raw) = self.headers.get(TRACE_INFO_HEADER)
            && let Ok(info) = serde_json::from_str::<TraceInfo>(raw)
            && !info.request_id.is_empty()
        {
            return Some(info.request_id);
        }

        self.headers
            .get(TRACEPARENT_HEADER)
            .filter(|v| !v.is_empty())
            .cloned()
    }
}

/// `trace_info` 消息头的 JSON 结构
#[derive(Debug, serde::Deserialize)]
struct TraceInfo {
    #[serde(default)]
    request_id: String,
}

// ---------------------------------------------------------------------------
// KafkaConsumer
// ---------------------------------------------------------------------------

/// 面向业务的 Kafka 消费者
///
/// 封装 `StreamConsumer` 并提供基于 `watch` channel 的优雅关闭语义，
/// 关闭自动提交，由消费循环在处理成功后逐条提交位移。
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    retry_policy: RetryPolicy,
}

impl KafkaConsumer {
    /// 创建消费者
    ///
    /// `group_id_suffix` 允许同一服务内不同消费逻辑使用独立的消费组，
    /// 例如 "transaction-history.order" 和 "transaction-history.earn"。
    pub fn new(config: &KafkaConfig, group_id_suffix: Option<&str>) -> Result<Self, LedgerError> {
        let group_id = match group_id_suffix {
            Some(suffix) => format!("{}.{}", config.consumer_group, suffix),
            None => config.consumer_group.clone(),
        };

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .create()
            .map_err(|e| LedgerError::Kafka(format!("创建消费者失败: {e}")))?;

        let retry_policy = RetryPolicy::redelivery(Duration::from_millis(config.max_backoff_ms));

        info!(brokers = %config.brokers, group_id, "Kafka 消费者已初始化");
        Ok(Self {
            consumer,
            retry_policy,
        })
    }

    /// 订阅指定的 topic 列表
    pub fn subscribe(&self, topics: &[&str]) -> Result<(), LedgerError> {
        self.consumer
            .subscribe(topics)
            .map_err(|e| LedgerError::Kafka(format!("订阅 topic 失败: {e}")))?;

        info!(?topics, "已订阅 Kafka topics");
        Ok(())
    }

    /// 启动消费循环
    ///
    /// 使用 `tokio::select!` 同时监听消息流和关闭信号：
    /// - handler 成功：提交该消息的下一位移。
    /// - handler 失败：不提交，回退到该消息位移并退避，下一轮重新投递同一条消息。
    /// - 关闭信号变为 `true` 时退出循环，正在执行的 handler 会先自然完成。
    pub async fn start<F, Fut>(self, mut shutdown: watch::Receiver<bool>, handler: F)
    where
        F: Fn(ConsumerMessage) -> Fut,
        Fut: std::future::Future<Output = Result<(), LedgerError>>,
    {
        use futures::StreamExt;

        let stream = self.consumer.stream();
        futures::pin_mut!(stream);

        info!("Kafka 消费循环已启动");

        let mut failures: u32 = 0;

        loop {
            tokio::select! {
                biased;

                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("收到关闭信号，Kafka 消费循环退出");
                        break;
                    }
                }

                msg_result = stream.next() => {
                    let Some(msg_result) = msg_result else {
                        warn!("Kafka 消息流意外结束");
                        break;
                    };

                    let msg = match msg_result {
                        Ok(borrowed_msg) => ConsumerMessage::from_borrowed(&borrowed_msg),
                        Err(e) => {
                            error!(error = %e, "接收 Kafka 消息出错");
                            continue;
                        }
                    };

                    debug!(
                        topic = %msg.topic,
                        partition = msg.partition,
                        offset = msg.offset,
                        "收到 Kafka 消息"
                    );

                    let (topic, partition, offset) = (msg.topic.clone(), msg.partition, msg.offset);

                    match handler(msg).await {
                        Ok(()) => {
                            failures = 0;
                            if let Err(e) = self.commit(&topic, partition, offset) {
                                error!(error = %e, topic = %topic, partition, offset, "提交位移失败");
                            }
                        }
                        Err(e) => {
                            let delay = self.retry_policy.delay_for_attempt(failures);
                            failures = failures.saturating_add(1);
                            error!(
                                error = %e,
                                topic = %topic,
                                partition,
                                offset,
                                attempt = failures,
                                delay_ms = delay.as_millis() as u64,
                                "处理 Kafka 消息失败，位移未提交，退避后重新投递"
                            );

                            if let Err(e) = self.rewind(&topic, partition, offset) {
                                error!(error = %e, topic = %topic, partition, offset, "回退位移失败");
                            }

                            tokio::select! {
                                biased;
                                _ = shutdown.changed() => {
                                    if *shutdown.borrow() {
                                        info!("退避期间收到关闭信号，Kafka 消费循环退出");
                                        break;
                                    }
                                }
                                _ = tokio::time::sleep(delay) => {}
                            }
                        }
                    }
                }
            }
        }
    }

    /// 提交已处理消息的下一位移
    fn commit(&self, topic: &str, partition: i32, offset: i64) -> Result<(), LedgerError> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(topic, partition, Offset::Offset(offset + 1))
            .map_err(|e| LedgerError::Kafka(format!("构造提交位移失败: {e}")))?;
        self.consumer
            .commit(&tpl, CommitMode::Async)
            .map_err(|e| LedgerError::Kafka(format!("提交位移失败: {e}")))
    }

    /// 回退到失败消息的位移，使其被重新投递
    fn rewind(&self, topic: &str, partition: i32, offset: i64) -> Result<(), LedgerError> {
        self.consumer
            .seek(topic, partition, Offset::Offset(offset), Duration::from_secs(5))
            .map_err(|e| LedgerError::Kafka(format!("seek 失败: {e}")))
    }
}

// ---------------------------------------------------------------------------
// 测试
// ---------------------------------------------------------------------------
