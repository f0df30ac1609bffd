//! 积分事件消费服务
//!
//! 消费订单成功（`rewards.point`）与积分发放完成（`core.transaction.point.success`）
//! 两类事件，在文档存储的事务中把它们合并进同一条交易历史记录。
//! 两类事件可以任意先后到达，重复投递不会产生重复记录。

pub mod consumer;
pub mod error;
pub mod handlers;
