//! 服务层数据传输对象
//!
//! 定义服务层与外部交互使用的 DTO，与存储层的查询条件解耦

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::TransactionRecord;

/// 历史查询请求
///
/// 交易类型与状态大小写不敏感；`tx_type` 可为逗号分隔的多个类型。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRequest {
    pub profile_id: String,
    pub offset: i64,
    pub limit: i64,
    pub tx_type: String,
    pub status: String,
    /// 近 N 个自然月，<= 0 表示不限
    pub recent_month: i32,
}

/// 历史查询结果
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub records: Vec<TransactionRecord>,
    /// 忽略分页的匹配总数
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

/// 积分下单请求
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderRequest {
    pub order_number: String,
    pub create_time: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub vga_user_id: String,
    pub source_type: String,
}

/// 转发给积分接收服务的订单内容
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPoint {
    pub order_number: String,
    /// 毫秒时间戳
    pub create_time: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    pub vga_user_id: String,
    pub region: String,
}

/// 积分接收服务的订单消息，`value` 为序列化后的 `OrderPoint`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderMessage {
    pub source_type: String,
    pub value: String,
    /// 签名暂未启用，固定为空串
    pub sign: String,
}
