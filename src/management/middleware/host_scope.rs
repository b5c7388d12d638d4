//! # 租户 Host 范围校验
//!
//! 管理请求的 Host 必须包含租户名称，否则返回 503。

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::error::GatewayError;
use crate::logging::{LogComponent, LogStage};
use crate::lwarn;
use crate::management::response;
use crate::management::server::AppState;
use crate::proxy::dispatcher::resolve_host;

/// Host 是否属于租户
#[must_use]
pub fn host_in_scope(host: Option<&str>, tenant_name: &str) -> bool {
    host.is_some_and(|host| host.contains(tenant_name))
}

/// Host 范围中间件
pub async fn host_scope_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if !state.control.access().host_scope {
        return next.run(request).await;
    }

    let host = resolve_host(request.headers(), request.uri());
    if host_in_scope(host.as_deref(), &state.tenant.name) {
        return next.run(request).await;
    }

    lwarn!(
        "system",
        LogStage::Authentication,
        LogComponent::Management,
        "host_out_of_scope",
        "管理请求的 Host 不属于当前租户",
        host = host.as_deref().unwrap_or("-"),
        path = request.uri().path()
    );
    response::app_error(GatewayError::host_scope(host.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_in_scope() {
        assert!(host_in_scope(Some("shop.example.com"), "shop"));
        assert!(host_in_scope(Some("admin-shop"), "shop"));
        assert!(!host_in_scope(Some("other.example.com"), "shop"));
        assert!(!host_in_scope(None, "shop"));
    }
}
