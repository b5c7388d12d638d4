//! # 代理分发模块
//!
//! 按请求 Host 查找后端并转发

pub mod dispatcher;

pub use dispatcher::ProxyDispatcher;
