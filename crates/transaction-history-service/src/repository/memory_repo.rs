//! 内存交易历史仓储
//!
//! 与 MongoDB / PostgreSQL 实现保持相同的查询与合并语义，用于测试与本地运行。
//! 事务执行器持有整张表的锁，在暂存副本上执行工作，提交时整体写回，丢弃即回滚。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use ledger_shared::config::LedgerConfig;
use ledger_shared::error::{LedgerError, Result};
use ledger_shared::observability::metrics::record_ledger_upsert;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::query::HistoryQuery;
use super::traits::{LedgerRepository, SessionUpsert};
use super::transaction::{TransactionExecutor, bounded};
use crate::models::TransactionRecord;

const ENTITY: &str = "user_transaction_history";

#[derive(Debug, Clone)]
struct StoredRecord {
    /// 插入序号，created_at 相同时新插入的排在前面
    seq: u64,
    record: TransactionRecord,
}

/// 内存表
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    records: Vec<StoredRecord>,
    next_seq: u64,
}

impl MemoryState {
    fn find(&self, query: &HistoryQuery) -> (Vec<TransactionRecord>, i64) {
        let mut matched: Vec<&StoredRecord> = self
            .records
            .iter()
            .filter(|stored| query.matches(&stored.record))
            .collect();
        matched.sort_by(|a, b| {
            b.record
                .created_at
                .cmp(&a.record.created_at)
                .then(b.seq.cmp(&a.seq))
        });

        let total = matched.len() as i64;
        let page = matched
            .into_iter()
            .skip(query.skip() as usize)
            .take(query.effective_limit().map_or(usize::MAX, |l| l as usize))
            .map(|stored| stored.record.clone())
            .collect();

        (page, total)
    }

    fn position_by_transaction_id(&self, transaction_id: &str) -> Option<usize> {
        if transaction_id.is_empty() {
            return None;
        }
        self.records
            .iter()
            .position(|s| s.record.transaction_id == transaction_id)
    }

    fn position_by_correlation(&self, profile_id: &str, reference_code: &str) -> Option<usize> {
        if reference_code.is_empty() {
            return None;
        }
        self.records.iter().position(|s| {
            s.record.profile_id == profile_id && s.record.reference_code == reference_code
        })
    }

    /// 唯一约束检查：非空 TransactionID、非空 (ProfileID, ReferenceCode)
    fn check_unique(&self, record: &TransactionRecord, except: Option<usize>) -> Result<()> {
        let conflict = |idx: Option<usize>| idx.is_some_and(|i| Some(i) != except);

        if conflict(self.position_by_transaction_id(&record.transaction_id)) {
            return Err(record.duplicate_transaction_id());
        }
        if conflict(self.position_by_correlation(&record.profile_id, &record.reference_code)) {
            return Err(record.duplicate_correlation_key());
        }
        Ok(())
    }

    fn push(&mut self, record: TransactionRecord) {
        self.next_seq += 1;
        self.records.push(StoredRecord {
            seq: self.next_seq,
            record,
        });
    }

    fn insert(&mut self, record: &TransactionRecord, now: DateTime<Utc>) -> Result<TransactionRecord> {
        self.check_unique(record, None)?;

        let mut created = record.clone();
        created.created_at = Some(now);
        created.updated_at = Some(now);
        self.push(created.clone());
        Ok(created)
    }

    /// 该用户最近创建的一条（CreatedAt 相同时取后写入的）
    fn latest_index(&self, profile_id: &str) -> Result<usize> {
        self.records
            .iter()
            .enumerate()
            .filter(|(_, s)| s.record.profile_id == profile_id)
            .max_by(|(_, a), (_, b)| {
                a.record
                    .created_at
                    .cmp(&b.record.created_at)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|(i, _)| i)
            .ok_or_else(|| LedgerError::not_found(ENTITY, format!("profile_id={profile_id}")))
    }

    fn update_latest(
        &mut self,
        record: &TransactionRecord,
        profile_id: &str,
        now: DateTime<Utc>,
    ) -> Result<TransactionRecord> {
        let idx = self.latest_index(profile_id)?;

        let mut updated = record.clone();
        if updated.profile_id.is_empty() {
            updated.profile_id = profile_id.to_string();
        }
        self.check_unique(&updated, Some(idx))?;

        updated.created_at = self.records[idx].record.created_at;
        updated.updated_at = Some(now);
        self.records[idx].record = updated.clone();
        Ok(updated)
    }

    fn delete_latest(&mut self, profile_id: &str) -> Result<TransactionRecord> {
        let idx = self.latest_index(profile_id)?;
        Ok(self.records.remove(idx).record)
    }

    fn apply_order_success(&mut self, record: &TransactionRecord, now: DateTime<Utc>) -> Result<()> {
        if !record.has_correlation_key() {
            return Err(LedgerError::Validation(
                "order success upsert requires profile id and reference code".to_string(),
            ));
        }

        match self.position_by_correlation(&record.profile_id, &record.reference_code) {
            Some(idx) => {
                let existing = &mut self.records[idx].record;
                existing.source = record.source.clone();
                existing.source_time = record.source_time;
                existing.source_type = record.source_type.clone();
                existing.payment_transaction_id = record.payment_transaction_id.clone();
                if existing.total_amount.is_zero() {
                    existing.total_amount = record.total_amount;
                }
                if existing.currency.is_empty() {
                    existing.currency = record.currency.clone();
                }
                existing.updated_at = Some(now);
            }
            None => {
                self.push(TransactionRecord {
                    transaction_id: String::new(),
                    transaction_type: String::new(),
                    point_amount: 0,
                    point_type: 0,
                    created_at: Some(now),
                    updated_at: Some(now),
                    ..record.clone()
                });
            }
        }
        Ok(())
    }

    fn apply_earn_point(&mut self, record: &TransactionRecord, now: DateTime<Utc>) -> Result<()> {
        if record.transaction_id.is_empty() && !record.has_correlation_key() {
            return Err(LedgerError::Validation(
                "earn point upsert requires transaction id or reference code".to_string(),
            ));
        }

        let matched = self
            .position_by_transaction_id(&record.transaction_id)
            .or_else(|| self.position_by_correlation(&record.profile_id, &record.reference_code));

        match matched {
            Some(idx) => {
                if let Some(other) = self.position_by_transaction_id(&record.transaction_id)
                    && other != idx
                {
                    return Err(record.duplicate_transaction_id());
                }

                let existing = &mut self.records[idx].record;
                existing.point_amount = record.point_amount;
                if !record.transaction_id.is_empty() {
                    existing.transaction_id = record.transaction_id.clone();
                }
                existing.transaction_type = record.transaction_type.clone();
                existing.point_type = record.point_type;
                existing.status = record.status.clone();
                existing.updated_at = Some(now);
            }
            None => {
                self.push(TransactionRecord {
                    payment_transaction_id: String::new(),
                    source: String::new(),
                    source_time: None,
                    source_type: String::new(),
                    created_at: Some(now),
                    updated_at: Some(now),
                    ..record.clone()
                });
            }
        }
        Ok(())
    }
}

/// 内存交易历史仓储
#[derive(Clone, Default)]
pub struct MemoryLedgerRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryLedgerRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 共享同一张内存表的事务执行器
    pub fn executor(&self, config: &LedgerConfig) -> MemoryTransactionExecutor {
        MemoryTransactionExecutor {
            state: self.state.clone(),
            timeout: config.transaction_timeout(),
        }
    }

    /// 当前全部记录（插入顺序）
    pub async fn snapshot(&self) -> Vec<TransactionRecord> {
        self.state
            .lock()
            .await
            .records
            .iter()
            .map(|s| s.record.clone())
            .collect()
    }
}

#[async_trait]
impl LedgerRepository for MemoryLedgerRepository {
    async fn find_by_profile(&self, query: &HistoryQuery) -> Result<(Vec<TransactionRecord>, i64)> {
        Ok(self.state.lock().await.find(query))
    }

    async fn create(&self, record: &TransactionRecord) -> Result<TransactionRecord> {
        self.state.lock().await.insert(record, Utc::now())
    }

    async fn update_by_profile(
        &self,
        record: &TransactionRecord,
        profile_id: &str,
    ) -> Result<TransactionRecord> {
        self.state
            .lock()
            .await
            .update_latest(record, profile_id, Utc::now())
    }

    async fn delete_by_profile(&self, profile_id: &str) -> Result<TransactionRecord> {
        self.state.lock().await.delete_latest(profile_id)
    }

    async fn upsert_on_order_success(&self, record: &TransactionRecord) -> Result<()> {
        self.state
            .lock()
            .await
            .apply_order_success(record, Utc::now())?;
        record_ledger_upsert("memory", "order_success");
        Ok(())
    }

    async fn upsert_on_earn_point_complete(&self, record: &TransactionRecord) -> Result<()> {
        self.state
            .lock()
            .await
            .apply_earn_point(record, Utc::now())?;
        record_ledger_upsert("memory", "earn_point");
        Ok(())
    }
}

/// 内存事务会话：持有表锁与暂存副本
pub struct MemorySession {
    guard: OwnedMutexGuard<MemoryState>,
    staged: MemoryState,
}

#[async_trait]
impl SessionUpsert<MemorySession> for MemoryLedgerRepository {
    async fn upsert_on_order_success_in(
        &self,
        session: &mut MemorySession,
        record: &TransactionRecord,
    ) -> Result<()> {
        session.staged.apply_order_success(record, Utc::now())?;
        record_ledger_upsert("memory", "order_success");
        Ok(())
    }

    async fn upsert_on_earn_point_complete_in(
        &self,
        session: &mut MemorySession,
        record: &TransactionRecord,
    ) -> Result<()> {
        session.staged.apply_earn_point(record, Utc::now())?;
        record_ledger_upsert("memory", "earn_point");
        Ok(())
    }
}

/// 内存事务执行器
#[derive(Clone)]
pub struct MemoryTransactionExecutor {
    state: Arc<Mutex<MemoryState>>,
    timeout: Duration,
}

#[async_trait]
impl TransactionExecutor for MemoryTransactionExecutor {
    type Session = MemorySession;

    async fn execute_in_transaction<T, F>(&self, mut work: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut Self::Session) -> BoxFuture<'c, Result<T>> + Send,
    {
        bounded(self.timeout, async move {
            let guard = self.state.clone().lock_owned().await;
            let staged = guard.clone();
            let mut session = MemorySession { guard, staged };

            let value = work(&mut session).await?;

            let MemorySession { mut guard, staged } = session;
            *guard = staged;
            Ok(value)
        })
        .await
    }
}
