//! 共享库
//!
//! 包含所有服务共用的配置、错误处理、PostgreSQL/MongoDB 连接、Kafka、
//! 可观测性与日志脱敏等基础设施代码。

pub mod config;
pub mod database;
pub mod error;
pub mod kafka;
pub mod mongo;
pub mod observability;
pub mod redact;
pub mod retry;
