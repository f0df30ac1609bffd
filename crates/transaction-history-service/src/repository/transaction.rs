//! 事务执行器
//!
//! 在存储事务中执行一段工作：工作失败则回滚并原样返回其错误，成功则提交。
//! 瞬时冲突（MongoDB TransientTransactionError、PostgreSQL 串行化失败/死锁/
//! 并发插入唯一冲突）会整体重跑工作，重跑次数与整体超时由 `LedgerConfig` 决定。
//!
//! 工作闭包可能被执行多次，闭包内不得产生事务以外的副作用。

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use ledger_shared::config::LedgerConfig;
use ledger_shared::error::{LedgerError, Result};
use ledger_shared::retry::RetryPolicy;
use mongodb::{Client, ClientSession};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, warn};

/// 提交结果未知时单独重试提交的次数
const MAX_COMMIT_RETRIES: u32 = 3;

/// 事务执行器
#[async_trait]
pub trait TransactionExecutor: Send + Sync {
    /// 工作闭包拿到的事务会话
    type Session: Send;

    /// 在一个事务中执行 `work`
    ///
    /// 超时返回 `LedgerError::Timeout`，会话随之释放并回滚；
    /// 调用方丢弃返回的 future 同样会回滚。
    async fn execute_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut Self::Session) -> BoxFuture<'c, Result<T>> + Send;
}

/// 为事务单元加上整体超时
pub(crate) async fn bounded<T>(
    timeout: Duration,
    unit: impl Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(timeout, unit).await {
        Ok(result) => result,
        Err(_) => Err(LedgerError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

/// 记录一次冲突重跑并退避
async fn backoff(backend: &str, policy: &RetryPolicy, attempt: u32, err: &LedgerError) {
    let delay = policy.delay_for_attempt(attempt);
    warn!(
        backend,
        attempt = attempt + 1,
        delay_ms = delay.as_millis() as u64,
        error = %err,
        "事务瞬时冲突，重跑事务单元"
    );
    tokio::time::sleep(delay).await;
}

// ---------------------------------------------------------------------------
// MongoDB
// ---------------------------------------------------------------------------

/// 基于 MongoDB 客户端会话的执行器（要求副本集部署）
#[derive(Clone)]
pub struct MongoTransactionExecutor {
    client: Client,
    timeout: Duration,
    policy: RetryPolicy,
}

impl MongoTransactionExecutor {
    pub fn new(client: Client, config: &LedgerConfig) -> Self {
        Self {
            client,
            timeout: config.transaction_timeout(),
            policy: RetryPolicy::for_transaction(config.transaction_max_attempts),
        }
    }

    async fn run<T, F>(&self, mut work: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut ClientSession) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut session = self.client.start_session().await?;
        let mut attempt: u32 = 0;

        loop {
            session.start_transaction().await?;

            let outcome = match work(&mut session).await {
                Ok(value) => commit_mongo(&mut session).await.map(|()| value),
                Err(err) => {
                    if let Err(abort_err) = session.abort_transaction().await {
                        debug!(error = %abort_err, "MongoDB 事务回滚失败（可能已被服务端终止）");
                    }
                    Err(err)
                }
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient_conflict() && self.policy.should_retry(attempt) => {
                    backoff("mongodb", &self.policy, attempt, &err).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// 提交事务，提交结果未知时单独重试提交
async fn commit_mongo(session: &mut ClientSession) -> Result<()> {
    let mut retries: u32 = 0;
    loop {
        match session.commit_transaction().await {
            Ok(()) => return Ok(()),
            Err(e) => {
                let err = LedgerError::from(e);
                if err.is_unknown_commit_result() && retries < MAX_COMMIT_RETRIES {
                    retries += 1;
                    warn!(retries, error = %err, "MongoDB 提交结果未知，重试提交");
                    continue;
                }
                return Err(err);
            }
        }
    }
}

#[async_trait]
impl TransactionExecutor for MongoTransactionExecutor {
    type Session = ClientSession;

    async fn execute_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut Self::Session) -> BoxFuture<'c, Result<T>> + Send,
    {
        bounded(self.timeout, self.run(work)).await
    }
}

// ---------------------------------------------------------------------------
// PostgreSQL
// ---------------------------------------------------------------------------

/// 基于 `pool.begin()` 的执行器
#[derive(Clone)]
pub struct PgTransactionExecutor {
    pool: PgPool,
    timeout: Duration,
    policy: RetryPolicy,
}

impl PgTransactionExecutor {
    pub fn new(pool: PgPool, config: &LedgerConfig) -> Self {
        Self {
            pool,
            timeout: config.transaction_timeout(),
            policy: RetryPolicy::for_transaction(config.transaction_max_attempts),
        }
    }

    async fn run<T, F>(&self, mut work: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut PgConnection) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut attempt: u32 = 0;

        loop {
            let mut tx = self.pool.begin().await?;

            let outcome = match work(&mut *tx).await {
                Ok(value) => tx.commit().await.map(|()| value).map_err(LedgerError::from),
                Err(err) => {
                    if let Err(rollback_err) = tx.rollback().await {
                        debug!(error = %rollback_err, "PostgreSQL 事务回滚失败");
                    }
                    Err(err)
                }
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient_conflict() && self.policy.should_retry(attempt) => {
                    backoff("postgres", &self.policy, attempt, &err).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl TransactionExecutor for PgTransactionExecutor {
    type Session = PgConnection;

    async fn execute_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'c> FnMut(&'c mut Self::Session) -> BoxFuture<'c, Result<T>> + Send,
    {
        bounded(self.timeout, self.run(work)).await
    }
}
