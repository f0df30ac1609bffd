//! 积分交易历史服务
//!
//! 记录用户的积分交易历史（与订单关联的积分获取），支持 MongoDB 与 PostgreSQL 双存储后端。
//!
//! ## 核心功能
//!
//! - **历史查询**：按用户、交易类型、状态、近 N 个月过滤，分页返回并给出总数
//! - **管理操作**：创建、按用户更新、按用户删除交易记录
//! - **事件合并**：订单成功事件与积分发放完成事件可任意先后到达，
//!   以 (ProfileID, ReferenceCode) 关联并幂等合并为同一条记录
//! - **事务执行**：事件合并在存储事务中执行，瞬时冲突自动重跑
//! - **积分下单转发**：将积分订单转发到积分接收服务
//!
//! ## 模块结构
//!
//! - `models`: 交易记录模型
//! - `error`: 业务错误码与服务错误
//! - `events`: 领域事件与消息体解码
//! - `repository`: 仓储接口、三种实现（MongoDB / PostgreSQL / 内存）与事务执行器
//! - `service`: 账本服务与积分下单服务
//! - `client`: 积分接收服务 HTTP 客户端

pub mod client;
pub mod error;
pub mod events;
pub mod models;
pub mod repository;
pub mod service;

pub use error::{ErrorCode, Result, ServiceError};
pub use models::TransactionRecord;
pub use repository::{
    HistoryQuery, LedgerRepository, MemoryLedgerRepository, MemoryTransactionExecutor,
    MongoLedgerRepository, MongoTransactionExecutor, PgTransactionExecutor,
    PostgresLedgerRepository, SessionUpsert, TransactionExecutor,
};
pub use service::{HistoryPage, HistoryRequest, LedgerService, PointService};
