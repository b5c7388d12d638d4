//! # 路由记录处理器
//!
//! `/api/prx` 的 GET / POST / PATCH / DELETE。先校验令牌，再解析请求体。

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Response,
};
use serde::de::DeserializeOwned;

use super::authorization;
use crate::control::{DeleteRecordRequest, Operation, ProxyRecordRequest, RouteEntry};
use crate::error::{GatewayError, Result};
use crate::management::response;
use crate::management::server::AppState;

/// 解析 JSON 请求体，失败视为校验错误
fn decode_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| {
        GatewayError::validation(vec![(
            "body".to_string(),
            format!("request body decode error: {e}"),
        )])
    })
}

fn entry_of(request: &ProxyRecordRequest) -> RouteEntry {
    RouteEntry {
        from: request.from.trim().to_string(),
        to: request.to.trim().to_string(),
    }
}

/// 列出路由
pub async fn list_proxies(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let result = async {
        let grant = state.control.authorize(Operation::List, authorization(&headers))?;
        state.control.list(&grant).await
    }
    .await;

    match result {
        Ok(entries) if entries.is_empty() => response::no_content(),
        Ok(entries) => response::success(entries),
        Err(e) => response::app_error(e),
    }
}

/// 新增路由
pub async fn add_proxy(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let result = async {
        let grant = state.control.authorize(Operation::Add, authorization(&headers))?;
        let request: ProxyRecordRequest = decode_body(&body)?;
        let entry = entry_of(&request);
        state.control.add(&grant, request).await?;
        Ok::<_, GatewayError>(entry)
    }
    .await;

    match result {
        Ok(entry) => response::created(entry),
        Err(e) => response::app_error(e),
    }
}

/// 更新路由
pub async fn update_proxy(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        let grant = state.control.authorize(Operation::Update, authorization(&headers))?;
        let request: ProxyRecordRequest = decode_body(&body)?;
        let entry = entry_of(&request);
        state.control.update(&grant, request).await?;
        Ok::<_, GatewayError>(entry)
    }
    .await;

    match result {
        Ok(entry) => response::success(entry),
        Err(e) => response::app_error(e),
    }
}

/// 删除路由
pub async fn delete_proxy(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let result = async {
        let grant = state.control.authorize(Operation::Delete, authorization(&headers))?;
        let request: DeleteRecordRequest = decode_body(&body)?;
        state.control.delete(&grant, request).await
    }
    .await;

    match result {
        Ok(()) => response::success_without_data(),
        Err(e) => response::app_error(e),
    }
}
