//! # HTTP 服务器
//!
//! Axum HTTP 服务器，提供代理转发与管理接口

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;

use crate::config::TenantIdentity;
use crate::control::ControlService;
use crate::error::{GatewayError, Result};
use crate::linfo;
use crate::logging::{LogComponent, LogStage};
use crate::proxy::ProxyDispatcher;

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    /// 控制服务
    pub control: Arc<ControlService>,
    /// 代理分发器
    pub dispatcher: Arc<ProxyDispatcher>,
    /// 租户身份
    pub tenant: Arc<TenantIdentity>,
}

impl AppState {
    /// 创建共享状态
    #[must_use]
    pub const fn new(
        control: Arc<ControlService>,
        dispatcher: Arc<ProxyDispatcher>,
        tenant: Arc<TenantIdentity>,
    ) -> Self {
        Self {
            control,
            dispatcher,
            tenant,
        }
    }
}

/// HTTP 服务器
pub struct HttpServer {
    addr: SocketAddr,
    router: Router,
}

impl HttpServer {
    /// 创建服务器
    #[must_use]
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            router: super::routes::create_routes(state),
        }
    }

    /// 监听地址
    #[must_use]
    pub const fn bind_address(&self) -> SocketAddr {
        self.addr
    }

    /// 绑定端口
    pub async fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.addr).await.map_err(|e| {
            GatewayError::server_init_with_source(format!("failed to bind HTTP listener on {}", self.addr), e)
        })
    }

    /// 启动服务器
    pub async fn serve(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve_on(listener).await
    }

    /// 在已绑定的监听器上运行
    pub async fn serve_on(self, listener: TcpListener) -> Result<()> {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Management,
            "http_server_start",
            &format!("HTTP server listening on {}", self.addr)
        );

        axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| GatewayError::server_init_with_source("HTTP server error", e))
    }
}
