//! # gRPC 控制面
//!
//! `prx.Reverse` 服务，与 HTTP 管理接口共享同一个控制服务

pub mod server;
pub mod service;

/// 由 `proto/prx.proto` 生成的代码
#[allow(missing_docs, clippy::all, clippy::pedantic, clippy::nursery)]
pub mod proto {
    tonic::include_proto!("prx");
}

pub use server::RpcServer;
pub use service::ReverseService;
