//! 交易历史账本服务
//!
//! 组合文档存储（MongoDB）与关系存储（PostgreSQL）两套仓储以及事务执行器，
//! 两套存储互不同步，各自是独立的账本。
//!
//! 错误映射沿用对外约定：
//! - 查询与创建：任何存储错误都报告为 NotFound，描述保留存储错误
//! - 按用户更新 / 删除：存储错误只记日志，不向调用方报告
//! - 事件合并：存储错误报告为 System，缺少关联键报告为 DataInvalid

use std::sync::Arc;

use chrono::Utc;
use ledger_shared::error::LedgerError;
use ledger_shared::redact::Redacted;
use tracing::{error, info, instrument, warn};

use crate::error::{Result, ServiceError};
use crate::events::{EarnPointCompleteEvent, OrderSuccessEvent};
use crate::models::TransactionRecord;
use crate::repository::{
    HistoryQuery, LedgerRepository, SessionUpsert, TransactionExecutor, months_ago,
    parse_tx_types,
};
use crate::service::dto::{HistoryPage, HistoryRequest};

/// 账本服务
///
/// - `D`: 文档存储仓储，同时可在执行器的会话中执行事件合并
/// - `R`: 关系存储仓储
/// - `E`: 事务执行器
pub struct LedgerService<D: ?Sized, R: ?Sized, E> {
    document: Arc<D>,
    relational: Arc<R>,
    executor: Arc<E>,
}

impl<D: ?Sized, R: ?Sized, E> Clone for LedgerService<D, R, E> {
    fn clone(&self) -> Self {
        Self {
            document: self.document.clone(),
            relational: self.relational.clone(),
            executor: self.executor.clone(),
        }
    }
}

impl<D: ?Sized, R: ?Sized, E> LedgerService<D, R, E> {
    pub fn new(document: Arc<D>, relational: Arc<R>, executor: Arc<E>) -> Self {
        Self {
            document,
            relational,
            executor,
        }
    }
}

impl<D: ?Sized, E> LedgerService<D, D, E> {
    /// 只使用一个存储后端（事件消费只写文档存储）
    pub fn single_backend(repo: Arc<D>, executor: Arc<E>) -> Self {
        Self::new(repo.clone(), repo, executor)
    }
}

/// 把查询请求转换为查询条件：类型与状态转大写，近 N 个月换算为起始时间
fn history_query(req: &HistoryRequest) -> HistoryQuery {
    let mut query = HistoryQuery::new(req.profile_id.as_str())
        .with_tx_types(parse_tx_types(&req.tx_type))
        .with_status(req.status.trim().to_uppercase())
        .paginate(req.offset, req.limit);

    if req.recent_month > 0
        && let Some(since) = months_ago(Utc::now(), req.recent_month as u32)
    {
        query = query.since(since);
    }
    query
}

async fn find_history<Repo: LedgerRepository + ?Sized>(
    repo: &Repo,
    backend: &'static str,
    req: &HistoryRequest,
) -> Result<HistoryPage> {
    let query = history_query(req);
    match repo.find_by_profile(&query).await {
        Ok((records, total)) => Ok(HistoryPage {
            records,
            total,
            offset: req.offset,
            limit: req.limit,
        }),
        Err(e) => {
            error!(backend, profile_id = %req.profile_id, error = %e, "查询交易历史失败");
            Err(ServiceError::not_found_from(&e))
        }
    }
}

async fn create_in<Repo: LedgerRepository + ?Sized>(
    repo: &Repo,
    backend: &'static str,
    record: Option<TransactionRecord>,
) -> Result<TransactionRecord> {
    let Some(record) = record else {
        return Err(ServiceError::not_found("order cannot be nil"));
    };

    match repo.create(&record).await {
        Ok(created) => {
            info!(backend, record = %Redacted(&created), "交易记录已创建");
            Ok(created)
        }
        Err(e) => {
            error!(backend, profile_id = %record.profile_id, error = %e, "创建交易记录失败");
            Err(ServiceError::not_found_from(&e))
        }
    }
}

impl<D, R, E> LedgerService<D, R, E>
where
    D: LedgerRepository + ?Sized,
    R: LedgerRepository + ?Sized,
{
    /// 查询交易历史（文档存储）
    #[instrument(skip(self, req), fields(profile_id = %req.profile_id))]
    pub async fn get_history(&self, req: &HistoryRequest) -> Result<HistoryPage> {
        find_history(self.document.as_ref(), "mongodb", req).await
    }

    /// 查询交易历史（关系存储）
    #[instrument(skip(self, req), fields(profile_id = %req.profile_id))]
    pub async fn get_history_relational(&self, req: &HistoryRequest) -> Result<HistoryPage> {
        find_history(self.relational.as_ref(), "postgres", req).await
    }

    /// 创建交易记录（文档存储）
    #[instrument(skip(self, record))]
    pub async fn create_record(&self, record: Option<TransactionRecord>) -> Result<TransactionRecord> {
        create_in(self.document.as_ref(), "mongodb", record).await
    }

    /// 创建交易记录（关系存储）
    #[instrument(skip(self, record))]
    pub async fn create_record_relational(
        &self,
        record: Option<TransactionRecord>,
    ) -> Result<TransactionRecord> {
        create_in(self.relational.as_ref(), "postgres", record).await
    }

    /// 覆盖该用户最近的一条记录
    ///
    /// 存储失败时只记日志并原样返回请求中的记录。
    #[instrument(skip(self, record))]
    pub async fn update_record(&self, record: TransactionRecord, profile_id: &str) -> TransactionRecord {
        match self.document.update_by_profile(&record, profile_id).await {
            Ok(updated) => updated,
            Err(e) => {
                warn!(profile_id, error = %e, "更新交易记录失败，忽略");
                record
            }
        }
    }

    /// 删除该用户最近的一条记录，存储失败时只记日志
    #[instrument(skip(self))]
    pub async fn delete_record(&self, profile_id: &str) {
        match self.document.delete_by_profile(profile_id).await {
            Ok(deleted) => info!(
                profile_id,
                transaction_id = %deleted.transaction_id,
                "交易记录已删除"
            ),
            Err(e) => warn!(profile_id, error = %e, "删除交易记录失败，忽略"),
        }
    }
}

impl<D, R, E> LedgerService<D, R, E>
where
    E: TransactionExecutor,
    D: SessionUpsert<E::Session> + 'static,
    R: ?Sized,
{
    /// 订单支付成功：在事务中按关联键合并订单字段
    #[instrument(
        skip(self, event),
        fields(profile_id = %event.profile_id, reference_code = %event.reference_code)
    )]
    pub async fn handle_order_success(&self, event: &OrderSuccessEvent) -> Result<()> {
        event.validate().map_err(|e| ServiceError::system_from(&e))?;
        info!(event = %Redacted(event), "处理订单成功事件");

        let record = event.to_record();
        let repo = self.document.clone();
        self.executor
            .execute_in_transaction(move |session| {
                let repo = repo.clone();
                let record = record.clone();
                Box::pin(async move { repo.upsert_on_order_success_in(session, &record).await })
            })
            .await
            .map_err(|e| self.report("order_success", e))?;

        info!("订单成功事件已合并");
        Ok(())
    }

    /// 积分发放完成：在事务中按 TransactionID（回退到关联键）合并积分字段
    #[instrument(
        skip(self, event),
        fields(transaction_id = %event.transaction_id, reference_code = %event.reference_code)
    )]
    pub async fn handle_earn_point_complete(&self, event: &EarnPointCompleteEvent) -> Result<()> {
        event.validate().map_err(|e| ServiceError::system_from(&e))?;
        info!(event = %Redacted(event), "处理积分发放完成事件");

        let record = event.to_record();
        let repo = self.document.clone();
        self.executor
            .execute_in_transaction(move |session| {
                let repo = repo.clone();
                let record = record.clone();
                Box::pin(async move {
                    repo.upsert_on_earn_point_complete_in(session, &record)
                        .await
                })
            })
            .await
            .map_err(|e| self.report("earn_point", e))?;

        info!("积分发放完成事件已合并");
        Ok(())
    }

    fn report(&self, kind: &'static str, err: LedgerError) -> ServiceError {
        error!(kind, error = %err, retryable = err.is_retryable(), "事件合并失败");
        ServiceError::system_from(&err)
    }
}
