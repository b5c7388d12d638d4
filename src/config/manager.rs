//! # 配置管理器
//!
//! 加载 TOML 配置文件并应用环境变量覆盖。配置在启动时读取一次，之后不再重载。

use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::{ensure_config, ldebug, linfo, lwarn};

use super::AppConfig;

/// 指定配置文件路径的环境变量
pub const CONFIG_PATH_ENV: &str = "PRX_CONFIG_PATH";

/// 通用覆盖前缀：`PRX_<SECTION>_<FIELD>`
const OVERRIDE_PREFIX: &str = "PRX_";

/// 允许通过 `PRX_<SECTION>_<FIELD>` 覆盖的配置路径
///
/// 其余 `PRX_*` 变量（例如 Kubernetes 为 `prx-http` Service 注入的
/// `PRX_HTTP_SERVICE_HOST`）一律忽略。
const OVERRIDE_PATHS: &[&str] = &[
    "http.host",
    "http.port",
    "rpc.host",
    "rpc.port",
    "rpc.tls_required",
    "store.backend",
    "store.owner",
    "store.ingress_class",
    "store.backend_port",
    "cache.warm_on_start",
    "access.host_scope",
    "access.list_requires_auth",
    "access.health_requires_auth",
    "proxy.connect_timeout_secs",
    "log.level",
];

/// Service link 注入的值形如 `tcp://10.0.0.5:80`
fn is_service_link(value: &str) -> bool {
    ["tcp://", "udp://", "sctp://"]
        .iter()
        .any(|scheme| value.starts_with(scheme))
}

/// 配置管理器
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<AppConfig>,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// 从进程环境加载配置
    ///
    /// 路径优先级：参数 > `PRX_CONFIG_PATH` > 无文件（全部默认值）
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = config_path
            .map(Path::to_path_buf)
            .or_else(|| env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));

        Self::from_sources(path.as_deref(), env::vars())
    }

    /// 从给定的文件与变量集合构建配置
    pub fn from_sources<I>(config_path: Option<&Path>, vars: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut config = match config_path {
            Some(path) => Self::load_config_file(path)?,
            None => AppConfig::default(),
        };

        let overrides = Self::build_env_overrides(vars);
        Self::apply_env_overrides(&mut config, &overrides)?;

        config.validate().map_err(GatewayError::config)?;

        linfo!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "config_loaded",
            "配置加载完成",
            source = config_path.map_or_else(|| "defaults".to_string(), |p| p.display().to_string()),
            overrides = overrides.len()
        );

        Ok(Self {
            config: Arc::new(config),
            source: config_path.map(Path::to_path_buf),
        })
    }

    /// 获取当前配置
    #[must_use]
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    /// 配置文件路径（未使用文件时为 `None`）
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// 加载配置文件
    fn load_config_file(path: &Path) -> Result<AppConfig> {
        ensure_config!(path.exists(), "config file does not exist: {}", path.display());

        let config_content = std::fs::read_to_string(path).map_err(|e| {
            GatewayError::config_with_source(format!("failed to read config file: {}", path.display()), e)
        })?;

        toml::from_str(&config_content).map_err(|e| {
            GatewayError::config_with_source(
                format!("TOML parse failed - file: {}, detail: {e}", path.display()),
                e,
            )
        })
    }

    /// 构建环境变量覆盖映射（配置路径 -> 值）
    fn build_env_overrides<I>(vars: I) -> HashMap<String, String>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut overrides = HashMap::new();

        for (key, value) in vars {
            let path = match key.as_str() {
                "NAMESPACE" => Some("tenant.namespace".to_string()),
                "NAME" => Some("tenant.name".to_string()),
                "JWT_SECRET" => Some("tenant.jwt_secret".to_string()),
                "TLS_CRT" => Some("rpc.tls_cert_b64".to_string()),
                "TLS_KEY" => Some("rpc.tls_key_b64".to_string()),
                "PRX_KUBE_CONFIG" => Some("store.kubeconfig_b64".to_string()),
                CONFIG_PATH_ENV => None,
                other => other
                    .strip_prefix(OVERRIDE_PREFIX)
                    .and_then(|rest| {
                        // PRX_HTTP_PORT -> http.port, PRX_ACCESS_HOST_SCOPE -> access.host_scope
                        let (section, field) = rest.split_once('_')?;
                        Some(format!("{}.{}", section.to_lowercase(), field.to_lowercase()))
                    })
                    .filter(|path| OVERRIDE_PATHS.contains(&path.as_str()))
                    .filter(|path| {
                        if is_service_link(&value) {
                            ldebug!(
                                "system",
                                LogStage::Startup,
                                LogComponent::Config,
                                "service_link_skipped",
                                "忽略 Service link 环境变量",
                                key = other,
                                path = path
                            );
                            return false;
                        }
                        true
                    }),
            };

            if let Some(path) = path {
                overrides.insert(path, value);
            }
        }

        ldebug!(
            "system",
            LogStage::Startup,
            LogComponent::Config,
            "env_overrides",
            &format!("发现 {} 个环境变量覆盖", overrides.len())
        );
        overrides
    }

    /// 应用环境变量覆盖
    fn apply_env_overrides(config: &mut AppConfig, overrides: &HashMap<String, String>) -> Result<()> {
        for (path, value) in overrides {
            ldebug!(
                "system",
                LogStage::Startup,
                LogComponent::Config,
                "apply_override",
                "应用环境变量覆盖",
                path = path,
                value = if path.contains("secret") || path.contains("key") || path.contains("kubeconfig") {
                    "***"
                } else {
                    value.as_str()
                }
            );

            Self::apply_override_to_config(config, path, value)?;
        }
        Ok(())
    }

    /// 将单个覆盖应用到配置对象
    fn apply_override_to_config(config: &mut AppConfig, path: &str, value: &str) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();

        match parts.as_slice() {
            ["tenant", "namespace"] => config.tenant.namespace = value.to_string(),
            ["tenant", "name"] => config.tenant.name = Some(value.to_string()),
            ["tenant", "jwt_secret"] => config.tenant.jwt_secret = value.to_string(),
            ["http", "host"] => config.http.host = value.to_string(),
            ["http", "port"] => config.http.port = parse_value(path, value)?,
            ["rpc", "host"] => config.rpc.host = value.to_string(),
            ["rpc", "port"] => config.rpc.port = parse_value(path, value)?,
            ["rpc", "tls_required"] => config.rpc.tls_required = parse_value(path, value)?,
            ["rpc", "tls_cert_b64"] => config.rpc.tls_cert_b64 = non_empty(value),
            ["rpc", "tls_key_b64"] => config.rpc.tls_key_b64 = non_empty(value),
            ["store", "backend"] => {
                config.store.backend = match value.to_lowercase().as_str() {
                    "kube" => super::StoreBackend::Kube,
                    "memory" => super::StoreBackend::Memory,
                    other => {
                        return Err(GatewayError::config(format!(
                            "unknown store backend '{other}', expected kube or memory"
                        )));
                    }
                };
            }
            ["store", "kubeconfig_b64"] => config.store.kubeconfig_b64 = non_empty(value),
            ["store", "owner"] => config.store.owner = value.to_string(),
            ["store", "ingress_class"] => config.store.ingress_class = non_empty(value),
            ["store", "backend_port"] => config.store.backend_port = parse_value(path, value)?,
            ["cache", "warm_on_start"] => config.cache.warm_on_start = parse_value(path, value)?,
            ["access", "host_scope"] => config.access.host_scope = parse_value(path, value)?,
            ["access", "list_requires_auth"] => {
                config.access.list_requires_auth = parse_value(path, value)?;
            }
            ["access", "health_requires_auth"] => {
                config.access.health_requires_auth = parse_value(path, value)?;
            }
            ["proxy", "connect_timeout_secs"] => {
                config.proxy.connect_timeout_secs = parse_value(path, value)?;
            }
            ["log", "level"] => config.log_level = non_empty(value),
            _ => {
                lwarn!(
                    "system",
                    LogStage::Startup,
                    LogComponent::Config,
                    "unknown_override",
                    "未知的配置路径，忽略环境变量覆盖",
                    path = path
                );
            }
        }

        Ok(())
    }
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .map_err(|e| GatewayError::config_with_source(format!("invalid value for {path}: {value}"), e))
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}
