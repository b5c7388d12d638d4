//! # gRPC 服务器
//!
//! 配置了证书与私钥时启用 TLS；缺少 TLS 材料时按 `rpc.tls_required` 决定拒绝启动或明文运行。

use std::net::SocketAddr;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Identity, Server, ServerTlsConfig};

use super::proto::reverse_server::ReverseServer;
use super::service::ReverseService;
use crate::config::RpcConfig;
use crate::control::ControlService;
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{config_error, linfo, lwarn};

/// gRPC 服务器
pub struct RpcServer {
    addr: SocketAddr,
    service: ReverseService,
    tls: Option<ServerTlsConfig>,
}

impl RpcServer {
    /// 按配置创建服务器
    pub fn new(config: &RpcConfig, control: Arc<ControlService>) -> Result<Self> {
        let addr = config.bind_address().map_err(|e| {
            GatewayError::config_with_source("invalid RPC bind address", e)
        })?;

        let tls = if config.has_tls_material() {
            Some(load_tls(
                config.tls_cert_b64.as_deref().unwrap_or_default(),
                config.tls_key_b64.as_deref().unwrap_or_default(),
            )?)
        } else if config.tls_required {
            return Err(config_error!(
                "RPC TLS material missing: set TLS_CRT and TLS_KEY or disable rpc.tls_required"
            ));
        } else {
            lwarn!(
                "system",
                LogStage::Startup,
                LogComponent::Rpc,
                "rpc_plaintext",
                "未配置 TLS 材料，gRPC 以明文运行"
            );
            None
        };

        Ok(Self {
            addr,
            service: ReverseService::new(control),
            tls,
        })
    }

    /// 创建不带 TLS 的服务器
    #[must_use]
    pub const fn plaintext(addr: SocketAddr, control: Arc<ControlService>) -> Self {
        Self {
            addr,
            service: ReverseService::new(control),
            tls: None,
        }
    }

    /// 监听地址
    #[must_use]
    pub const fn bind_address(&self) -> SocketAddr {
        self.addr
    }

    /// 是否启用 TLS
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    fn builder(&mut self) -> Result<Server> {
        let mut builder = Server::builder();
        if let Some(tls) = self.tls.take() {
            builder = builder
                .tls_config(tls)
                .map_err(|e| GatewayError::server_init_with_source("invalid RPC TLS configuration", e))?;
        }
        Ok(builder)
    }

    /// 启动服务器
    pub async fn serve(mut self) -> Result<()> {
        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Rpc,
            "rpc_server_start",
            &format!("gRPC server listening on {}", self.addr),
            tls = self.is_tls()
        );

        self.builder()?
            .add_service(ReverseServer::new(self.service))
            .serve(self.addr)
            .await
            .map_err(|e| GatewayError::server_init_with_source("gRPC server error", e))
    }

    /// 在已绑定的监听器上运行
    pub async fn serve_on(mut self, listener: TcpListener) -> Result<()> {
        self.builder()?
            .add_service(ReverseServer::new(self.service))
            .serve_with_incoming(TcpListenerStream::new(listener))
            .await
            .map_err(|e| GatewayError::server_init_with_source("gRPC server error", e))
    }
}

/// 解码 base64 PEM 并构建 TLS 配置
fn load_tls(cert_b64: &str, key_b64: &str) -> Result<ServerTlsConfig> {
    let cert = STANDARD
        .decode(cert_b64.trim())
        .map_err(|e| GatewayError::config_with_source("TLS_CRT is not valid base64", e))?;
    let key = STANDARD
        .decode(key_b64.trim())
        .map_err(|e| GatewayError::config_with_source("TLS_KEY is not valid base64", e))?;

    Ok(ServerTlsConfig::new().identity(Identity::from_pem(cert, key)))
}
