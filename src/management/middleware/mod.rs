//! # 管理服务器中间件
//!
//! 提供请求 ID 与租户 Host 范围校验

pub mod host_scope;
pub mod request_id;

pub use host_scope::host_scope_middleware;
pub use request_id::{RequestId, request_id_middleware};
