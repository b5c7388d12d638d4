//! # 路由定义
//!
//! 单一 HTTP 监听同时承载管理接口与代理：
//! - `/api/status`、`/api/prx` 为管理接口（受 Host 范围校验）
//! - 其他 `/api/...` 返回 404 包装
//! - 其余路径（包括不带斜杠的 `/api`）全部交给代理分发器

use axum::{
    Router,
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get},
};
use tower_http::trace::TraceLayer;

use super::handlers::{proxies, system};
use super::middleware::{host_scope_middleware, request_id_middleware};
use super::server::AppState;

/// 创建完整路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/api/status", get(system::status_handler))
        .route(
            "/api/prx",
            get(proxies::list_proxies)
                .post(proxies::add_proxy)
                .patch(proxies::update_proxy)
                .delete(proxies::delete_proxy),
        )
        .route_layer(from_fn_with_state(state.clone(), host_scope_middleware))
        .route("/api/{*rest}", any(system::api_not_found))
        .fallback(system::proxy_handler)
        .layer(from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
