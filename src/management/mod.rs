//! # HTTP 管理接口模块
//!
//! 提供 JSON 管理 API，并将其余请求交给代理分发器

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;

pub use routes::create_routes;
pub use server::{AppState, HttpServer};
