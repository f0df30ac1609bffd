//! 仓储 Trait 定义
//!
//! 定义仓储接口，便于服务层依赖抽象而非具体实现，支持 mock 测试

use async_trait::async_trait;
use ledger_shared::error::Result;

use super::query::HistoryQuery;
use crate::models::TransactionRecord;

/// 交易历史仓储接口
///
/// MongoDB、PostgreSQL 与内存实现共享同一语义：
/// - 查询按 created_at 倒序，total 为忽略分页的过滤后总数，无匹配返回空列表
/// - 两个 upsert 都是单次条件写入，重复投递幂等，不会覆盖对方流程拥有的字段
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// 按查询条件分页查询，返回 (记录, 总数)
    async fn find_by_profile(&self, query: &HistoryQuery) -> Result<(Vec<TransactionRecord>, i64)>;

    /// 插入新记录，CreatedAt/UpdatedAt 置为当前时间；非空 TransactionID 重复时返回
    /// `LedgerError::DuplicateTransaction`
    async fn create(&self, record: &TransactionRecord) -> Result<TransactionRecord>;

    /// 覆盖该用户最近创建的一条记录的全部字段，保留 CreatedAt；无匹配返回 NotFound
    async fn update_by_profile(
        &self,
        record: &TransactionRecord,
        profile_id: &str,
    ) -> Result<TransactionRecord>;

    /// 删除该用户最近创建的一条记录并返回它；无匹配返回 NotFound
    async fn delete_by_profile(&self, profile_id: &str) -> Result<TransactionRecord>;

    /// 订单成功事件合并，以 (ProfileID, ReferenceCode) 为键
    async fn upsert_on_order_success(&self, record: &TransactionRecord) -> Result<()>;

    /// 积分发放完成事件合并，以 TransactionID 为键，回退到 (ProfileID, ReferenceCode)
    async fn upsert_on_earn_point_complete(&self, record: &TransactionRecord) -> Result<()>;
}

/// 在执行器打开的事务会话中执行事件合并
///
/// `S` 为执行器的会话类型：MongoDB 的 `ClientSession`、PostgreSQL 的 `PgConnection`、
/// 内存实现的暂存快照。
#[async_trait]
pub trait SessionUpsert<S: Send>: Send + Sync {
    async fn upsert_on_order_success_in(
        &self,
        session: &mut S,
        record: &TransactionRecord,
    ) -> Result<()>;

    async fn upsert_on_earn_point_complete_in(
        &self,
        session: &mut S,
        record: &TransactionRecord,
    ) -> Result<()>;
}
