//! 仓储层
//!
//! - `traits`: 仓储接口与会话内合并接口
//! - `query`: 历史查询条件
//! - `transaction`: 事务执行器接口及 MongoDB / PostgreSQL 实现
//! - `mongo_repo` / `postgres_repo` / `memory_repo`: 三种存储实现

mod memory_repo;
mod mongo_repo;
mod postgres_repo;
pub mod query;
mod traits;
mod transaction;

pub use memory_repo::{MemoryLedgerRepository, MemorySession, MemoryState, MemoryTransactionExecutor};
pub use mongo_repo::MongoLedgerRepository;
pub use postgres_repo::PostgresLedgerRepository;
pub use query::{HistoryQuery, months_ago, parse_tx_types};
pub use traits::*;
pub use transaction::{MongoTransactionExecutor, PgTransactionExecutor, TransactionExecutor};

