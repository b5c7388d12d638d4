//! # PRX Gateway Library
//!
//! 集群原生反向代理网关核心库：路由表保存在集群中，通过 HTTP 与 gRPC 远程管理

pub mod auth;
pub mod cache;
pub mod config;
pub mod control;
pub mod error;
pub mod logging;
pub mod management;
pub mod proxy;
pub mod rpc;
pub mod store;
pub mod supervisor;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{GatewayError, Result};

/// 构建版本：优先使用编译期注入的 `PRX_BUILD_VERSION`
#[must_use]
pub fn build_version() -> &'static str {
    option_env!("PRX_BUILD_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}
