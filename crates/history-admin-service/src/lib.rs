//! 交易历史管理服务
//!
//! 提供积分交易历史的查询、维护以及积分下单转发的 REST API。
//!
//! ## 核心功能
//!
//! - **历史查询**：按用户分页查询交易历史，MongoDB 与 PostgreSQL 各有一组端点
//! - **记录维护**：创建记录、按用户覆盖最近一条记录、按用户删除全部记录
//! - **积分下单**：生成订单号并转发到积分接收服务
//!
//! ## 模块结构
//!
//! - `dto`: 请求参数与统一响应信封
//! - `error`: 错误类型与 HTTP 映射
//! - `handlers`: HTTP 请求处理器
//! - `routes`: 路由配置
//! - `state`: 应用状态
//!
//! ## 技术栈
//!
//! - Web 框架：Axum
//! - 数据验证：validator
//! - 序列化：serde (camelCase)

pub mod dto;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use dto::{ApiResponse, DeleteParams, HistoryParams, Paging};
pub use error::{ApiError, Result};
pub use state::{AppState, HistoryService, PointForwarder};
