//! 外部服务客户端

mod receiver;

pub use receiver::*;
