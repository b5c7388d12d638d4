//! # 控制服务
//!
//! 路由表的 Add / Update / Delete / List / Health 操作，由 HTTP 与 gRPC 适配层共享

pub mod service;
pub mod types;

pub use service::ControlService;
pub use types::{
    DeleteRecordRequest, Grant, HealthStatus, Operation, ProxyRecordRequest, RouteEntry,
};
