//! # 管理接口处理器

pub mod proxies;
pub mod system;

use axum::http::{HeaderMap, header};

/// 读取 `Authorization` 头
pub(crate) fn authorization(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
}
