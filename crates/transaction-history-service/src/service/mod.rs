//! 服务层
//!
//! ## 模块结构
//!
//! - `dto`: 数据传输对象定义
//! - `ledger_service`: 交易历史查询、管理与事件合并
//! - `point_service`: 积分下单转发

pub mod dto;
pub mod ledger_service;
pub mod point_service;

pub use dto::*;
pub use ledger_service::LedgerService;
pub use point_service::PointService;
