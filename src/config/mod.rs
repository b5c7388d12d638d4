//! # 配置管理模块
//!
//! 处理应用配置加载、验证，以及由配置派生的租户身份

mod app_config;
mod manager;

pub use app_config::{
    AccessConfig, AppConfig, CacheConfig, ListenerConfig, ProxyConfig, RpcConfig, StoreBackend,
    StoreConfig, TenantConfig,
};
pub use manager::{CONFIG_PATH_ENV, ConfigManager};

use std::fmt;

/// 租户身份：启动时由配置构建一次，之后只读共享
#[derive(Clone, PartialEq, Eq)]
pub struct TenantIdentity {
    /// Kubernetes 命名空间
    pub namespace: String,
    /// 租户名称（管理请求 Host 必须包含此值）
    pub name: String,
    /// 签名密钥
    pub secret: String,
}

impl TenantIdentity {
    /// 直接构建
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            secret: secret.into(),
        }
    }

    /// 从应用配置构建
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(
            config.tenant.namespace.clone(),
            config.tenant_name(),
            config.tenant.jwt_secret.clone(),
        )
    }
}

impl fmt::Debug for TenantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantIdentity")
            .field("namespace", &self.namespace)
            .field("name", &self.name)
            .field("secret", &"***")
            .finish()
    }
}
