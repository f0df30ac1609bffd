//! 数据传输对象模块
//!
//! 请求参数与统一响应信封

mod request;
mod response;

pub use request::*;
pub use response::*;
