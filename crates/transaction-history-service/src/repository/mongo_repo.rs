//! MongoDB 交易历史仓储
//!
//! 集合 `user_transaction_history`，字段使用 snake_case 存储。
//! 两个事件合并都是单条带 upsert 的条件更新，依赖以下索引保证并发下不产生重复：
//! - `transaction_id` 唯一（仅对非空值生效）
//! - `(profile_id, reference_code)` 唯一（仅对非空 reference_code 生效）

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use ledger_shared::error::{LedgerError, Result};
use ledger_shared::observability::metrics::record_ledger_upsert;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{IndexOptions, ReturnDocument};
use mongodb::{ClientSession, Collection, Database, IndexModel};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::query::HistoryQuery;
use super::traits::{LedgerRepository, SessionUpsert};
use crate::models::TransactionRecord;

/// MongoDB 重复键错误码
const DUPLICATE_KEY: i32 = 11000;
const CORRELATION_INDEX: &str = "uniq_profile_reference";

/// 集合中的文档结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct TransactionDocument {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<ObjectId>,
    transaction_id: String,
    transaction_type: String,
    profile_id: String,
    reference_code: String,
    status: String,
    point_amount: i64,
    point_type: i64,
    total_amount: f64,
    currency: String,
    payment_transaction_id: String,
    source: String,
    source_time: Option<bson::DateTime>,
    source_type: String,
    created_at: Option<bson::DateTime>,
    updated_at: Option<bson::DateTime>,
}

fn to_bson_time(dt: DateTime<Utc>) -> bson::DateTime {
    bson::DateTime::from_millis(dt.timestamp_millis())
}

fn from_bson_time(dt: bson::DateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_millis(dt.timestamp_millis())
}

fn optional_time(dt: Option<DateTime<Utc>>) -> Bson {
    dt.map_or(Bson::Null, |t| Bson::DateTime(to_bson_time(t)))
}

fn amount_to_f64(amount: Decimal) -> f64 {
    amount.to_f64().unwrap_or_default()
}

impl TransactionDocument {
    fn from_record(record: &TransactionRecord) -> Self {
        Self {
            id: None,
            transaction_id: record.transaction_id.clone(),
            transaction_type: record.transaction_type.clone(),
            profile_id: record.profile_id.clone(),
            reference_code: record.reference_code.clone(),
            status: record.status.clone(),
            point_amount: record.point_amount,
            point_type: record.point_type,
            total_amount: amount_to_f64(record.total_amount),
            currency: record.currency.clone(),
            payment_transaction_id: record.payment_transaction_id.clone(),
            source: record.source.clone(),
            source_time: record.source_time.map(to_bson_time),
            source_type: record.source_type.clone(),
            created_at: record.created_at.map(to_bson_time),
            updated_at: record.updated_at.map(to_bson_time),
        }
    }

    fn into_record(self) -> TransactionRecord {
        TransactionRecord {
            transaction_id: self.transaction_id,
            transaction_type: self.transaction_type,
            profile_id: self.profile_id,
            reference_code: self.reference_code,
            status: self.status,
            point_amount: self.point_amount,
            point_type: self.point_type,
            total_amount: Decimal::from_f64(self.total_amount).unwrap_or_default(),
            currency: self.currency,
            payment_transaction_id: self.payment_transaction_id,
            source: self.source,
            source_time: self.source_time.and_then(from_bson_time),
            source_type: self.source_type,
            created_at: self.created_at.and_then(from_bson_time),
            updated_at: self.updated_at.and_then(from_bson_time),
        }
    }
}

/// 插入/覆盖类写入的重复键映射为业务错误，按冲突的索引给出对应的键
fn map_write_error(err: mongodb::error::Error, record: &TransactionRecord) -> LedgerError {
    // insert 返回写错误，findAndModify 返回命令错误
    let on_correlation = match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
            Some(e.message.contains(CORRELATION_INDEX))
        }
        ErrorKind::Command(e) if e.code == DUPLICATE_KEY => Some(e.message.contains(CORRELATION_INDEX)),
        _ => None,
    };

    match on_correlation {
        Some(true) => record.duplicate_correlation_key(),
        Some(false) => record.duplicate_transaction_id(),
        None => LedgerError::Mongo(err),
    }
}

fn history_filter(query: &HistoryQuery) -> Document {
    let mut filter = doc! { "profile_id": &query.profile_id };
    if !query.tx_types.is_empty() {
        filter.insert("transaction_type", doc! { "$in": query.tx_types.clone() });
    }
    if let Some(status) = &query.status {
        filter.insert("status", status.clone());
    }
    if let Some(since) = query.since {
        filter.insert("created_at", doc! { "$gte": to_bson_time(since) });
    }
    filter
}

/// 订单成功合并：以 (profile_id, reference_code) 为键的流水线更新
///
/// 命中时覆盖订单流程字段，TotalAmount/Currency 仅在仍为占位值时填充，
/// Status 只在插入时写入；未命中时其余字段取占位值。
fn order_success_update(record: &TransactionRecord, now: bson::DateTime) -> Vec<Document> {
    let amount = amount_to_f64(record.total_amount);
    vec![doc! {
        "$set": {
            "source": { "$literal": &record.source },
            "source_time": { "$literal": optional_time(record.source_time) },
            "source_type": { "$literal": &record.source_type },
            "payment_transaction_id": { "$literal": &record.payment_transaction_id },
            "updated_at": now,
            "total_amount": {
                "$cond": [
                    { "$gt": [{ "$ifNull": ["$total_amount", 0.0] }, 0.0] },
                    "$total_amount",
                    { "$literal": amount },
                ]
            },
            "currency": {
                "$cond": [
                    { "$gt": [{ "$ifNull": ["$currency", ""] }, ""] },
                    "$currency",
                    { "$literal": &record.currency },
                ]
            },
            "status": { "$ifNull": ["$status", { "$literal": &record.status }] },
            "transaction_id": { "$ifNull": ["$transaction_id", ""] },
            "transaction_type": { "$ifNull": ["$transaction_type", ""] },
            "point_amount": { "$ifNull": ["$point_amount", 0_i64] },
            "point_type": { "$ifNull": ["$point_type", 0_i64] },
            "created_at": { "$ifNull": ["$created_at", now] },
        }
    }]
}

/// 积分发放合并的过滤条件：TransactionID 优先，回退到关联键
fn earn_point_filter(record: &TransactionRecord) -> Document {
    let by_key = doc! {
        "profile_id": &record.profile_id,
        "reference_code": &record.reference_code,
    };
    match (
        record.transaction_id.is_empty(),
        record.reference_code.is_empty(),
    ) {
        (false, true) => doc! { "transaction_id": &record.transaction_id },
        (true, _) => by_key,
        (false, false) => doc! {
            "$or": [{ "transaction_id": &record.transaction_id }, by_key]
        },
    }
}

fn earn_point_update(record: &TransactionRecord, now: bson::DateTime) -> Document {
    let mut set = doc! {
        "point_amount": record.point_amount,
        "transaction_type": &record.transaction_type,
        "point_type": record.point_type,
        "status": &record.status,
        "updated_at": now,
    };
    let mut set_on_insert = doc! {
        "profile_id": &record.profile_id,
        "reference_code": &record.reference_code,
        "total_amount": amount_to_f64(record.total_amount),
        "currency": &record.currency,
        "payment_transaction_id": "",
        "source": "",
        "source_time": Bson::Null,
        "source_type": "",
        "created_at": now,
    };
    if record.transaction_id.is_empty() {
        set_on_insert.insert("transaction_id", "");
    } else {
        set.insert("transaction_id", &record.transaction_id);
    }

    doc! { "$set": set, "$setOnInsert": set_on_insert }
}

/// MongoDB 交易历史仓储
#[derive(Clone)]
pub struct MongoLedgerRepository {
    collection: Collection<TransactionDocument>,
}

impl MongoLedgerRepository {
    /// 绑定集合并确保索引存在
    #[instrument(skip(database))]
    pub async fn new(database: &Database, collection: &str) -> Result<Self> {
        let repo = Self {
            collection: database.collection(collection),
        };
        repo.ensure_indexes().await?;
        info!(collection, "MongoDB ledger collection ready");
        Ok(repo)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let indexes = vec![
            IndexModel::builder()
                .keys(doc! { "transaction_id": 1 })
                .options(
                    IndexOptions::builder()
                        .name("uniq_transaction_id".to_string())
                        .unique(true)
                        .partial_filter_expression(doc! { "transaction_id": { "$gt": "" } })
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "profile_id": 1, "reference_code": 1 })
                .options(
                    IndexOptions::builder()
                        .name(CORRELATION_INDEX.to_string())
                        .unique(true)
                        .partial_filter_expression(doc! { "reference_code": { "$gt": "" } })
                        .build(),
                )
                .build(),
            IndexModel::builder()
                .keys(doc! { "profile_id": 1, "created_at": -1 })
                .options(
                    IndexOptions::builder()
                        .name("idx_profile_created".to_string())
                        .build(),
                )
                .build(),
        ];

        self.collection.create_indexes(indexes).await?;
        Ok(())
    }

    async fn order_success(
        &self,
        session: Option<&mut ClientSession>,
        record: &TransactionRecord,
    ) -> Result<()> {
        if !record.has_correlation_key() {
            return Err(LedgerError::Validation(
                "order success upsert requires profile id and reference code".to_string(),
            ));
        }

        let filter = doc! {
            "profile_id": &record.profile_id,
            "reference_code": &record.reference_code,
        };
        let update = order_success_update(record, to_bson_time(Utc::now()));
        let action = self.collection.update_one(filter, update).upsert(true);
        let result = match session {
            Some(s) => action.session(s).await?,
            None => action.await?,
        };

        debug!(
            profile_id = %record.profile_id,
            reference_code = %record.reference_code,
            matched = result.matched_count,
            inserted = result.upserted_id.is_some(),
            "order success merged"
        );
        record_ledger_upsert("mongodb", "order_success");
        Ok(())
    }

    async fn earn_point(
        &self,
        session: Option<&mut ClientSession>,
        record: &TransactionRecord,
    ) -> Result<()> {
        if record.transaction_id.is_empty() && !record.has_correlation_key() {
            return Err(LedgerError::Validation(
                "earn point upsert requires transaction id or reference code".to_string(),
            ));
        }

        let action = self
            .collection
            .find_one_and_update(
                earn_point_filter(record),
                earn_point_update(record, to_bson_time(Utc::now())),
            )
            .upsert(true)
            .sort(doc! { "transaction_id": -1, "created_at": 1 })
            .return_document(ReturnDocument::After);
        let merged = match session {
            Some(s) => action.session(s).await?,
            None => action.await?,
        };

        debug!(
            transaction_id = %record.transaction_id,
            reference_code = %record.reference_code,
            merged = merged.is_some(),
            "earn point merged"
        );
        record_ledger_upsert("mongodb", "earn_point");
        Ok(())
    }
}

#[async_trait]
impl LedgerRepository for MongoLedgerRepository {
    #[instrument(skip(self), fields(profile_id = %query.profile_id))]
    async fn find_by_profile(&self, query: &HistoryQuery) -> Result<(Vec<TransactionRecord>, i64)> {
        let filter = history_filter(query);
        let total = self.collection.count_documents(filter.clone()).await?;

        let mut find = self
            .collection
            .find(filter)
            .sort(doc! { "created_at": -1, "_id": -1 })
            .skip(query.skip());
        if let Some(limit) = query.effective_limit() {
            find = find.limit(limit);
        }

        let documents: Vec<TransactionDocument> = find.await?.try_collect().await?;
        let records = documents
            .into_iter()
            .map(TransactionDocument::into_record)
            .collect();

        Ok((records, total as i64))
    }

    async fn create(&self, record: &TransactionRecord) -> Result<TransactionRecord> {
        let now = Utc::now();
        let mut created = record.clone();
        created.created_at = Some(now);
        created.updated_at = Some(now);

        self.collection
            .insert_one(TransactionDocument::from_record(&created))
            .await
            .map_err(|e| map_write_error(e, record))?;

        Ok(created)
    }

    async fn update_by_profile(
        &self,
        record: &TransactionRecord,
        profile_id: &str,
    ) -> Result<TransactionRecord> {
        let mut fields = bson::to_document(&TransactionDocument::from_record(record))?;
        fields.remove("_id");
        fields.remove("created_at");
        fields.insert("updated_at", to_bson_time(Utc::now()));
        if record.profile_id.is_empty() {
            fields.remove("profile_id");
        }

        let updated = self
            .collection
            .find_one_and_update(doc! { "profile_id": profile_id }, doc! { "$set": fields })
            .sort(doc! { "created_at": -1, "_id": -1 })
            .return_document(ReturnDocument::After)
            .await
            .map_err(|e| map_write_error(e, record))?;

        updated
            .map(TransactionDocument::into_record)
            .ok_or_else(|| {
                LedgerError::not_found("user_transaction_history", format!("profile_id={profile_id}"))
            })
    }

    async fn delete_by_profile(&self, profile_id: &str) -> Result<TransactionRecord> {
        let deleted = self
            .collection
            .find_one_and_delete(doc! { "profile_id": profile_id })
            .sort(doc! { "created_at": -1, "_id": -1 })
            .await?;

        deleted
            .map(TransactionDocument::into_record)
            .ok_or_else(|| {
                LedgerError::not_found("user_transaction_history", format!("profile_id={profile_id}"))
            })
    }

    async fn upsert_on_order_success(&self, record: &TransactionRecord) -> Result<()> {
        self.order_success(None, record).await
    }

    async fn upsert_on_earn_point_complete(&self, record: &TransactionRecord) -> Result<()> {
        self.earn_point(None, record).await
    }
}

#[async_trait]
impl SessionUpsert<ClientSession> for MongoLedgerRepository {
    async fn upsert_on_order_success_in(
        &self,
        session: &mut ClientSession,
        record: &TransactionRecord,
    ) -> Result<()> {
        self.order_success(Some(session), record).await
    }

    async fn upsert_on_earn_point_complete_in(
        &self,
        session: &mut ClientSession,
        record: &TransactionRecord,
    ) -> Result<()> {
        self.earn_point(Some(session), record).await
    }
}
