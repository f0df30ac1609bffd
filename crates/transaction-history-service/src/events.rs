//! 领域事件与消息体解码
//!
//! 消息中间件投递的是回调信封 `{eventType, data}`，本模块负责把信封中的
//! 订单数据 / 积分发放数据解码并映射为领域事件，再由领域事件生成部分交易记录。

use chrono::{DateTime, Utc};
use ledger_shared::error::LedgerError;
use ledger_shared::redact::Redact;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::TransactionRecord;

// ---------------------------------------------------------------------------
// 消息体
// ---------------------------------------------------------------------------

/// 回调信封
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CallbackMessage<T> {
    #[serde(default)]
    pub event_type: String,
    pub data: T,
}

/// `rewards.point` 中的订单数据
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderEventData {
    pub order_number: String,
    #[serde(rename = "referCode")]
    pub refer_code: String,
    /// 毫秒时间戳
    pub create_time: i64,
    #[serde(rename = "profileID")]
    pub profile_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub region: String,
    pub currency: String,
    pub source: String,
    pub source_type: String,
    pub event_type: String,
    /// JSON 字符串，携带支付流水号 `paymentTransID`
    pub raw_data: String,
    pub status: String,
}

/// `rawData` 的结构
#[derive(Debug, Default, Deserialize)]
struct RawData {
    #[serde(rename = "paymentTransID", default)]
    payment_trans_id: String,
}

/// `core.transaction.point.success` 中的积分发放数据
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EarnPointOrderEvent {
    #[serde(rename = "transactionID")]
    pub transaction_id: String,
    pub transaction_type: String,
    pub point_type: i64,
    pub reference_code: String,
    pub region: String,
    pub point_amount: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub currency: String,
    pub profile_id: String,
    pub status: String,
}

// ---------------------------------------------------------------------------
// 领域事件
// ---------------------------------------------------------------------------

/// 订单支付成功
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSuccessEvent {
    pub profile_id: String,
    pub reference_code: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub currency: String,
    pub status: String,
    pub region: String,
    pub source: String,
    pub source_time: Option<DateTime<Utc>>,
    pub source_type: String,
    pub payment_transaction_id: String,
}

impl Redact for OrderSuccessEvent {
    const SENSITIVE_FIELDS: &'static [&'static str] = &["paymentTransactionId"];
}

/// 积分发放完成
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EarnPointCompleteEvent {
    pub transaction_id: String,
    pub transaction_type: String,
    pub point_type: i64,
    pub reference_code: String,
    pub region: String,
    pub point_amount: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub currency: String,
    pub profile_id: String,
    pub status: String,
}

impl Redact for EarnPointCompleteEvent {
    const SENSITIVE_FIELDS: &'static [&'static str] = &[];
}

impl OrderEventData {
    /// 映射为订单成功事件：订单号作为 ReferenceCode，createTime 作为 SourceTime
    pub fn into_event(self) -> OrderSuccessEvent {
        let payment_transaction_id = if self.raw_data.trim().is_empty() {
            String::new()
        } else {
            match serde_json::from_str::<RawData>(&self.raw_data) {
                Ok(raw) => raw.payment_trans_id,
                Err(e) => {
                    warn!(order_number = %self.order_number, error = %e, "rawData 解析失败，支付流水号置空");
                    String::new()
                }
            }
        };

        OrderSuccessEvent {
            profile_id: self.profile_id,
            reference_code: self.order_number,
            total_amount: self.amount,
            currency: self.currency,
            status: self.status,
            region: self.region,
            source: self.source,
            source_time: (self.create_time > 0)
                .then(|| DateTime::from_timestamp_millis(self.create_time))
                .flatten(),
            source_type: self.source_type,
            payment_transaction_id,
        }
    }
}

impl From<EarnPointOrderEvent> for EarnPointCompleteEvent {
    fn from(data: EarnPointOrderEvent) -> Self {
        Self {
            transaction_id: data.transaction_id,
            transaction_type: data.transaction_type,
            point_type: data.point_type,
            reference_code: data.reference_code,
            region: data.region,
            point_amount: data.point_amount,
            total_amount: data.total_amount,
            currency: data.currency,
            profile_id: data.profile_id,
            status: data.status,
        }
    }
}

impl OrderSuccessEvent {
    /// 订单成功事件必须带关联键
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.profile_id.is_empty() {
            return Err(LedgerError::Validation("profile id is required".to_string()));
        }
        if self.reference_code.is_empty() {
            return Err(LedgerError::Validation(
                "reference code (order number) is required".to_string(),
            ));
        }
        Ok(())
    }

    /// 生成订单流程拥有字段的部分记录
    pub fn to_record(&self) -> TransactionRecord {
        TransactionRecord {
            profile_id: self.profile_id.clone(),
            reference_code: self.reference_code.clone(),
            total_amount: self.total_amount,
            currency: self.currency.clone(),
            status: self.status.clone(),
            source: self.source.clone(),
            source_time: self.source_time,
            source_type: self.source_type.clone(),
            payment_transaction_id: self.payment_transaction_id.clone(),
            ..Default::default()
        }
    }
}

impl EarnPointCompleteEvent {
    /// 积分发放事件需要 TransactionID 或完整关联键之一
    pub fn validate(&self) -> Result<(), LedgerError> {
        if self.profile_id.is_empty() {
            return Err(LedgerError::Validation("profile id is required".to_string()));
        }
        if self.transaction_id.is_empty() && self.reference_code.is_empty() {
            return Err(LedgerError::Validation(
                "transaction id or reference code is required".to_string(),
            ));
        }
        Ok(())
    }

    /// 生成积分流程拥有字段的部分记录（金额与币种仅在插入时使用）
    pub fn to_record(&self) -> TransactionRecord {
        TransactionRecord {
            transaction_id: self.transaction_id.clone(),
            transaction_type: self.transaction_type.clone(),
            profile_id: self.profile_id.clone(),
            reference_code: self.reference_code.clone(),
            status: self.status.clone(),
            point_amount: self.point_amount,
            point_type: self.point_type,
            total_amount: self.total_amount,
            currency: self.currency.clone(),
            ..Default::default()
        }
    }
}
