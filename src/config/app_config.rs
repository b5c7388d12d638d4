//! # 应用配置结构定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

/// 应用主配置结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 租户身份
    pub tenant: TenantConfig,
    /// HTTP 监听（代理 + 管理接口）
    pub http: ListenerConfig,
    /// gRPC 监听
    pub rpc: RpcConfig,
    /// 集群存储
    pub store: StoreConfig,
    /// 映射缓存
    pub cache: CacheConfig,
    /// 访问控制
    pub access: AccessConfig,
    /// 代理转发
    pub proxy: ProxyConfig,
    /// 日志级别（`RUST_LOG` 优先）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
}

/// 租户配置
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantConfig {
    /// Kubernetes 命名空间
    pub namespace: String,
    /// 租户名称，为空时使用命名空间
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// HS256 签名密钥
    pub jwt_secret: String,
}

impl fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantConfig")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("jwt_secret", &"***")
            .finish()
    }
}

/// 监听器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 80,
        }
    }
}

impl ListenerConfig {
    /// 获取绑定地址
    pub fn bind_address(&self) -> std::io::Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse().map_err(|e| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("Invalid address '{addr}': {e}"),
            )
        })
    }
}

/// gRPC 配置
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
    /// 缺少 TLS 材料时是否拒绝启动
    pub tls_required: bool,
    /// base64 编码的 PEM 证书
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_cert_b64: Option<String>,
    /// base64 编码的 PEM 私钥
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_key_b64: Option<String>,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
            tls_required: true,
            tls_cert_b64: None,
            tls_key_b64: None,
        }
    }
}

impl fmt::Debug for RpcConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RpcConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("tls_required", &self.tls_required)
            .field("tls_cert_b64", &self.tls_cert_b64.as_ref().map(|_| "***"))
            .field("tls_key_b64", &self.tls_key_b64.as_ref().map(|_| "***"))
            .finish()
    }
}

impl RpcConfig {
    /// 获取绑定地址
    pub fn bind_address(&self) -> std::io::Result<SocketAddr> {
        ListenerConfig {
            host: self.host.clone(),
            port: self.port,
        }
        .bind_address()
    }

    /// 证书和私钥是否都已配置
    #[must_use]
    pub fn has_tls_material(&self) -> bool {
        self.tls_cert_b64.as_deref().is_some_and(|v| !v.is_empty())
            && self.tls_key_b64.as_deref().is_some_and(|v| !v.is_empty())
    }
}

/// 存储后端类型
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Kubernetes 集群
    #[default]
    Kube,
    /// 进程内存（本地开发）
    Memory,
}

/// 集群存储配置
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 存储后端
    pub backend: StoreBackend,
    /// base64 编码的 kubeconfig，为空时使用默认发现
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kubeconfig_b64: Option<String>,
    /// 所有者标记
    pub owner: String,
    /// Ingress class
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingress_class: Option<String>,
    /// Ingress 指向的 Service 端口
    pub backend_port: u16,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Kube,
            kubeconfig_b64: None,
            owner: "prx".to_string(),
            ingress_class: None,
            backend_port: 80,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("kubeconfig_b64", &self.kubeconfig_b64.as_ref().map(|_| "***"))
            .field("owner", &self.owner)
            .field("ingress_class", &self.ingress_class)
            .field("backend_port", &self.backend_port)
            .finish()
    }
}

/// 缓存配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 启动时预加载完整映射
    pub warm_on_start: bool,
}

/// 访问控制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// 管理请求的 Host 必须包含租户名称
    pub host_scope: bool,
    /// List 是否需要令牌
    pub list_requires_auth: bool,
    /// Health 是否需要令牌
    pub health_requires_auth: bool,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            host_scope: true,
            list_requires_auth: true,
            health_requires_auth: false,
        }
    }
}

/// 代理转发配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// 连接后端的超时（秒）
    pub connect_timeout_secs: u64,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// 租户名称，未配置时回退到命名空间
    #[must_use]
    pub fn tenant_name(&self) -> &str {
        self.tenant
            .name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.tenant.namespace)
    }

    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.tenant.namespace.trim().is_empty() {
            return Err("tenant namespace cannot be empty (set NAMESPACE)".to_string());
        }
        if self.tenant.jwt_secret.is_empty() {
            return Err("tenant jwt_secret cannot be empty (set JWT_SECRET)".to_string());
        }
        if self.http.port == 0 {
            return Err("http port must be greater than 0".to_string());
        }
        if self.rpc.port == 0 {
            return Err("rpc port must be greater than 0".to_string());
        }
        if self.http.host == self.rpc.host && self.http.port == self.rpc.port {
            return Err(format!(
                "HTTP port ({}) conflicts with RPC port ({})",
                self.http.port, self.rpc.port
            ));
        }
        if self.store.owner.trim().is_empty() {
            return Err("store owner cannot be empty".to_string());
        }
        if self.store.backend_port == 0 {
            return Err("store backend_port must be greater than 0".to_string());
        }

        self.http
            .bind_address()
            .map_err(|e| format!("Invalid HTTP address: {e}"))?;
        self.rpc
            .bind_address()
            .map_err(|e| format!("Invalid RPC address: {e}"))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.tenant.namespace = "shop".to_string();
        config.tenant.jwt_secret = "s3cret".to_string();
        config
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();

        assert_eq!(config.http.port, 80);
        assert_eq!(config.rpc.port, 50051);
        assert!(config.rpc.tls_required);
        assert_eq!(config.store.owner, "prx");
        assert_eq!(config.store.backend_port, 80);
        assert!(config.access.host_scope);
        assert!(config.access.list_requires_auth);
        assert!(!config.access.health_requires_auth);
    }

    #[test]
    fn test_tenant_name_falls_back_to_namespace() {
        let mut config = valid_config();
        assert_eq!(config.tenant_name(), "shop");

        config.tenant.name = Some("storefront".to_string());
        assert_eq!(config.tenant_name(), "storefront");

        config.tenant.name = Some(String::new());
        assert_eq!(config.tenant_name(), "shop");
    }

    #[test]
    fn test_validation() {
        assert!(valid_config().validate().is_ok());

        let mut config = valid_config();
        config.tenant.jwt_secret.clear();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.rpc.port = 80;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.http.host = "not an address".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_hides_secrets() {
        let mut config = valid_config();
        config.rpc.tls_key_b64 = Some("a2V5".to_string());
        let rendered = format!("{config:?}");

        assert!(!rendered.contains("s3cret"));
        assert!(!rendered.contains("a2V5"));
    }

    #[test]
    fn test_example_config_parses() {
        let mut config: AppConfig =
            toml::from_str(include_str!("../../config/config.example.toml")).unwrap();
        config.tenant.jwt_secret = "s3cret".to_string();

        assert!(config.validate().is_ok());
        assert_eq!(config.log_level.as_deref(), Some("info"));
        assert_eq!(config.store.backend, StoreBackend::Kube);
    }

    #[test]
    fn test_parse_partial_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [tenant]
            namespace = "shop"
            jwt_secret = "x"

            [store]
            backend = "memory"

            [access]
            list_requires_auth = false
            "#,
        )
        .unwrap();

        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(!config.access.list_requires_auth);
        assert!(config.access.host_scope);
        assert_eq!(config.http.port, 80);
    }
}
