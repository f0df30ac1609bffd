//! PostgreSQL 交易历史仓储
//!
//! 表结构见 `migrations/`。TransactionID 为空时以 NULL 存储，
//! 使唯一约束只作用于非空值；读出时还原为空串。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ledger_shared::error::{LedgerError, PG_UNIQUE_VIOLATION, Result};
use ledger_shared::observability::metrics::record_ledger_upsert;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgConnection, PgExecutor, PgPool};
use tracing::{debug, instrument};

use super::query::HistoryQuery;
use super::traits::{LedgerRepository, SessionUpsert};
use crate::models::TransactionRecord;

const ENTITY: &str = "user_transaction_history";
const CORRELATION_INDEX: &str = "uniq_history_profile_reference";

const COLUMNS: &str = "COALESCE(transaction_id, '') AS transaction_id, transaction_type, \
    profile_id, reference_code, status, point_amount, point_type, total_amount, currency, \
    payment_transaction_id, source, source_time, source_type, created_at, updated_at";

/// $1 profile_id, $2 交易类型数组（空数组不过滤）, $3 状态, $4 起始时间
const HISTORY_FILTER: &str = "profile_id = $1 \
    AND (cardinality($2::text[]) = 0 OR transaction_type = ANY($2)) \
    AND ($3::text IS NULL OR status = $3) \
    AND ($4::timestamptz IS NULL OR created_at >= $4)";

/// 订单成功合并
///
/// 命中 (profile_id, reference_code) 时只覆盖订单流程字段，
/// 金额与币种仅在仍为占位值时填充，状态保持不变。
const UPSERT_ORDER_SUCCESS: &str = r#"
INSERT INTO user_transaction_history AS t (
    transaction_id, transaction_type, profile_id, reference_code, status,
    point_amount, point_type, total_amount, currency, payment_transaction_id,
    source, source_time, source_type, created_at, updated_at
)
VALUES (NULL, '', $1, $2, $3, 0, 0, $4, $5, $6, $7, $8, $9, NOW(), NOW())
ON CONFLICT (profile_id, reference_code) WHERE reference_code <> ''
DO UPDATE SET
    source = EXCLUDED.source,
    source_time = EXCLUDED.source_time,
    source_type = EXCLUDED.source_type,
    payment_transaction_id = EXCLUDED.payment_transaction_id,
    total_amount = CASE WHEN t.total_amount = 0 THEN EXCLUDED.total_amount ELSE t.total_amount END,
    currency = CASE WHEN t.currency = '' THEN EXCLUDED.currency ELSE t.currency END,
    updated_at = NOW()
"#;

/// 积分发放合并
///
/// 先按 transaction_id 匹配，再回退到 (profile_id, reference_code)，
/// 锁定命中的一行并更新积分流程字段；没有命中则插入新行。
/// 并发插入竞争产生的唯一冲突由事务执行器重跑。
const UPSERT_EARN_POINT: &str = r#"
WITH matched AS (
    SELECT id FROM user_transaction_history
    WHERE transaction_id = NULLIF($1, '')
       OR ($3 <> '' AND profile_id = $2 AND reference_code = $3)
    ORDER BY (transaction_id IS NOT DISTINCT FROM NULLIF($1, '')) DESC, created_at
    LIMIT 1
    FOR UPDATE
),
updated AS (
    UPDATE user_transaction_history t SET
        point_amount = $4,
        transaction_id = COALESCE(NULLIF($1, ''), t.transaction_id),
        transaction_type = $5,
        point_type = $6,
        status = $7,
        updated_at = NOW()
    FROM matched
    WHERE t.id = matched.id
    RETURNING t.id
)
INSERT INTO user_transaction_history (
    transaction_id, transaction_type, profile_id, reference_code, status,
    point_amount, point_type, total_amount, currency, payment_transaction_id,
    source, source_time, source_type, created_at, updated_at
)
SELECT NULLIF($1, ''), $5, $2, $3, $7, $4, $6, $8, $9, '', '', NULL, '', NOW(), NOW()
WHERE NOT EXISTS (SELECT 1 FROM updated)
"#;

/// 数据库行
#[derive(Debug, FromRow)]
struct TransactionRow {
    transaction_id: String,
    transaction_type: String,
    profile_id: String,
    reference_code: String,
    status: String,
    point_amount: i64,
    point_type: i64,
    total_amount: Decimal,
    currency: String,
    payment_transaction_id: String,
    source: String,
    source_time: Option<DateTime<Utc>>,
    source_type: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TransactionRow> for TransactionRecord {
    fn from(row: TransactionRow) -> Self {
        Self {
            transaction_id: row.transaction_id,
            transaction_type: row.transaction_type,
            profile_id: row.profile_id,
            reference_code: row.reference_code,
            status: row.status,
            point_amount: row.point_amount,
            point_type: row.point_type,
            total_amount: row.total_amount,
            currency: row.currency,
            payment_transaction_id: row.payment_transaction_id,
            source: row.source,
            source_time: row.source_time,
            source_type: row.source_type,
            created_at: Some(row.created_at),
            updated_at: Some(row.updated_at),
        }
    }
}

/// 唯一约束冲突映射为重复交易
fn map_unique_violation(err: sqlx::Error, record: &TransactionRecord) -> LedgerError {
    match &err {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(PG_UNIQUE_VIOLATION) => {
            if db.constraint() == Some(CORRELATION_INDEX) {
                record.duplicate_correlation_key()
            } else {
                record.duplicate_transaction_id()
            }
        }
        _ => LedgerError::Database(err),
    }
}

async fn order_success<'e, E: PgExecutor<'e>>(executor: E, record: &TransactionRecord) -> Result<()> {
    if !record.has_correlation_key() {
        return Err(LedgerError::Validation(
            "order success upsert requires profile id and reference code".to_string(),
        ));
    }

    let result = sqlx::query(UPSERT_ORDER_SUCCESS)
        .bind(&record.profile_id)
        .bind(&record.reference_code)
        .bind(&record.status)
        .bind(record.total_amount)
        .bind(&record.currency)
        .bind(&record.payment_transaction_id)
        .bind(&record.source)
        .bind(record.source_time)
        .bind(&record.source_type)
        .execute(executor)
        .await?;

    debug!(
        profile_id = %record.profile_id,
        reference_code = %record.reference_code,
        rows = result.rows_affected(),
        "order success merged"
    );
    record_ledger_upsert("postgres", "order_success");
    Ok(())
}

async fn earn_point<'e, E: PgExecutor<'e>>(executor: E, record: &TransactionRecord) -> Result<()> {
    if record.transaction_id.is_empty() && !record.has_correlation_key() {
        return Err(LedgerError::Validation(
            "earn point upsert requires transaction id or reference code".to_string(),
        ));
    }

    let result = sqlx::query(UPSERT_EARN_POINT)
        .bind(&record.transaction_id)
        .bind(&record.profile_id)
        .bind(&record.reference_code)
        .bind(record.point_amount)
        .bind(&record.transaction_type)
        .bind(record.point_type)
        .bind(&record.status)
        .bind(record.total_amount)
        .bind(&record.currency)
        .execute(executor)
        .await?;

    debug!(
        transaction_id = %record.transaction_id,
        reference_code = %record.reference_code,
        inserted = result.rows_affected() > 0,
        "earn point merged"
    );
    record_ledger_upsert("postgres", "earn_point");
    Ok(())
}

/// PostgreSQL 交易历史仓储
#[derive(Clone)]
pub struct PostgresLedgerRepository {
    pool: PgPool,
}

impl PostgresLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerRepository for PostgresLedgerRepository {
    #[instrument(skip(self), fields(profile_id = %query.profile_id))]
    async fn find_by_profile(&self, query: &HistoryQuery) -> Result<(Vec<TransactionRecord>, i64)> {
        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM user_transaction_history WHERE {HISTORY_FILTER}"
        ))
        .bind(&query.profile_id)
        .bind(&query.tx_types)
        .bind(query.status.as_deref())
        .bind(query.since)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {COLUMNS} FROM user_transaction_history WHERE {HISTORY_FILTER} \
             ORDER BY created_at DESC, id DESC OFFSET $5 LIMIT $6"
        ))
        .bind(&query.profile_id)
        .bind(&query.tx_types)
        .bind(query.status.as_deref())
        .bind(query.since)
        .bind(query.skip() as i64)
        .bind(query.effective_limit())
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn create(&self, record: &TransactionRecord) -> Result<TransactionRecord> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            INSERT INTO user_transaction_history (
                transaction_id, transaction_type, profile_id, reference_code, status,
                point_amount, point_type, total_amount, currency, payment_transaction_id,
                source, source_time, source_type, created_at, updated_at
            )
            VALUES (NULLIF($1, ''), $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW(), NOW())
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&record.transaction_id)
        .bind(&record.transaction_type)
        .bind(&record.profile_id)
        .bind(&record.reference_code)
        .bind(&record.status)
        .bind(record.point_amount)
        .bind(record.point_type)
        .bind(record.total_amount)
        .bind(&record.currency)
        .bind(&record.payment_transaction_id)
        .bind(&record.source)
        .bind(record.source_time)
        .bind(&record.source_type)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, record))?;

        Ok(row.into())
    }

    async fn update_by_profile(
        &self,
        record: &TransactionRecord,
        profile_id: &str,
    ) -> Result<TransactionRecord> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            UPDATE user_transaction_history SET
                transaction_id = NULLIF($1, ''),
                transaction_type = $2,
                profile_id = COALESCE(NULLIF($3, ''), profile_id),
                reference_code = $4,
                status = $5,
                point_amount = $6,
                point_type = $7,
                total_amount = $8,
                currency = $9,
                payment_transaction_id = $10,
                source = $11,
                source_time = $12,
                source_type = $13,
                updated_at = NOW()
            WHERE id = (
                SELECT id FROM user_transaction_history
                WHERE profile_id = $14
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            )
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&record.transaction_id)
        .bind(&record.transaction_type)
        .bind(&record.profile_id)
        .bind(&record.reference_code)
        .bind(&record.status)
        .bind(record.point_amount)
        .bind(record.point_type)
        .bind(record.total_amount)
        .bind(&record.currency)
        .bind(&record.payment_transaction_id)
        .bind(&record.source)
        .bind(record.source_time)
        .bind(&record.source_type)
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, record))?;

        row.map(Into::into)
            .ok_or_else(|| LedgerError::not_found(ENTITY, format!("profile_id={profile_id}")))
    }

    async fn delete_by_profile(&self, profile_id: &str) -> Result<TransactionRecord> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            r#"
            DELETE FROM user_transaction_history
            WHERE id = (
                SELECT id FROM user_transaction_history
                WHERE profile_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            )
            RETURNING {COLUMNS}
            "#
        ))
        .bind(profile_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into)
            .ok_or_else(|| LedgerError::not_found(ENTITY, format!("profile_id={profile_id}")))
    }

    async fn upsert_on_order_success(&self, record: &TransactionRecord) -> Result<()> {
        order_success(&self.pool, record).await
    }

    async fn upsert_on_earn_point_complete(&self, record: &TransactionRecord) -> Result<()> {
        earn_point(&self.pool, record).await
    }
}

#[async_trait]
impl SessionUpsert<PgConnection> for PostgresLedgerRepository {
    async fn upsert_on_order_success_in(
        &self,
        session: &mut PgConnection,
        record: &TransactionRecord,
    ) -> Result<()> {
        order_success(&mut *session, record).await
    }

    async fn upsert_on_earn_point_complete_in(
        &self,
        session: &mut PgConnection,
        record: &TransactionRecord,
    ) -> Result<()> {
        earn_point(&mut *session, record).await
    }
}
