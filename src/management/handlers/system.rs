//! # 系统处理器

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    response::Response,
};

use super::authorization;
use crate::control::Operation;
use crate::management::response;
use crate::management::server::AppState;

/// 健康检查
pub async fn status_handler(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = state
        .control
        .authorize(Operation::Health, authorization(&headers))
        .and_then(|grant| state.control.health(&grant));

    match result {
        Ok(health) => response::success(health),
        Err(e) => response::app_error(e),
    }
}

/// 未知的 `/api` 路径
pub async fn api_not_found() -> Response {
    response::error(StatusCode::NOT_FOUND, "resource not found")
}

/// 非 `/api` 请求交给代理分发器
pub async fn proxy_handler(State(state): State<AppState>, request: Request) -> Response {
    state.dispatcher.dispatch(request).await
}
