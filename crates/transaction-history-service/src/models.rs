//! 交易记录模型
//!
//! 一条记录对应一笔积分交易。订单成功事件与积分发放完成事件各自拥有一部分字段，
//! 两者任意先后到达，最终合并为同一条记录。

use chrono::{DateTime, Utc};
use ledger_shared::error::LedgerError;
use ledger_shared::redact::Redact;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 交易记录
///
/// - 订单成功流程拥有：Source、SourceTime、SourceType、PaymentTransactionID、
///   ProfileID、TotalAmount、Currency、Status
/// - 积分发放流程拥有：TransactionID、TransactionType、PointAmount、PointType、Status
/// - TransactionID 非空时全局唯一；尚未知晓时为空串
/// - CreatedAt 首次插入后不再变化
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransactionRecord {
    #[serde(rename = "transactionID")]
    pub transaction_id: String,
    pub transaction_type: String,
    #[serde(rename = "profileID")]
    pub profile_id: String,
    /// 订单号，与 ProfileID 一起构成两类事件的关联键
    pub reference_code: String,
    pub status: String,
    pub point_amount: i64,
    pub point_type: i64,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub currency: String,
    #[serde(rename = "paymentTransactionID")]
    pub payment_transaction_id: String,
    pub source: String,
    pub source_time: Option<DateTime<Utc>>,
    pub source_type: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// 关联键是否完整
    pub fn has_correlation_key(&self) -> bool {
        !self.profile_id.is_empty() && !self.reference_code.is_empty()
    }

    /// TransactionID 唯一键冲突
    pub fn duplicate_transaction_id(&self) -> LedgerError {
        LedgerError::DuplicateTransaction {
            key: format!("transaction_id={}", self.transaction_id),
        }
    }

    /// (ProfileID, ReferenceCode) 关联键冲突
    pub fn duplicate_correlation_key(&self) -> LedgerError {
        LedgerError::DuplicateTransaction {
            key: format!(
                "profile_id={}, reference_code={}",
                self.profile_id, self.reference_code
            ),
        }
    }
}

impl Redact for TransactionRecord {
    const SENSITIVE_FIELDS: &'static [&'static str] = &["paymentTransactionID"];
}
