//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

use super::ErrorCategory;

/// 网关主要错误类型
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 认证失败：缺少、格式错误、无效或过期的令牌
    #[error("authentication failed: {message}")]
    Auth { message: String },

    /// 管理请求的 Host 不属于当前租户
    ///
    /// 对外消息固定，不回显请求的 Host
    #[error("operation not permitted")]
    HostScope { host: String },

    /// 一个或多个必填字段为空或格式非法
    #[error("validation error: {}", .problems.join(", "))]
    Validation {
        /// 出错的字段名（按出现顺序）
        fields: Vec<String>,
        /// 每个字段对应的描述
        problems: Vec<String>,
    },

    /// 缓存与权威映射中都不存在该主机
    #[error("no redirect record found for host {host}")]
    NotFound { host: String },

    /// 资源不是由本系统创建，拒绝修改
    #[error("{resource} for host {host} is not managed by this gateway")]
    Ownership { resource: String, host: String },

    /// 集群存储或后端网络失败
    #[error("transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 配置相关错误
    #[error("configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 服务器初始化错误
    #[error("server init error: {message}")]
    ServerInit {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 系统内部错误
    #[error("internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// IO相关错误
    #[error("io error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// 附加了上下文的错误
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<GatewayError>,
    },
}

impl GatewayError {
    /// 创建认证错误
    pub fn auth<S: Into<String>>(message: S) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// 创建租户范围错误
    pub fn host_scope<S: Into<String>>(host: S) -> Self {
        Self::HostScope { host: host.into() }
    }

    /// 创建校验错误
    ///
    /// `problems` 为 `(字段名, 描述)` 列表
    #[must_use]
    pub fn validation(problems: Vec<(String, String)>) -> Self {
        let (fields, problems) = problems.into_iter().unzip();
        Self::Validation { fields, problems }
    }

    /// 创建主机未找到错误
    pub fn not_found<S: Into<String>>(host: S) -> Self {
        Self::NotFound { host: host.into() }
    }

    /// 创建资源归属错误
    pub fn ownership<R: Into<String>, H: Into<String>>(resource: R, host: H) -> Self {
        Self::Ownership {
            resource: resource.into(),
            host: host.into(),
        }
    }

    /// 创建传输错误
    pub fn transport<S: Into<String>>(message: S) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的传输错误
    pub fn transport_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<anyhow::Error>,
    {
        Self::Transport {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建配置错误
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的配置错误
    pub fn config_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<anyhow::Error>,
    {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建服务器初始化错误
    pub fn server_init<S: Into<String>>(message: S) -> Self {
        Self::ServerInit {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的服务器初始化错误
    pub fn server_init_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<anyhow::Error>,
    {
        Self::ServerInit {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建内部错误
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带源错误的内部错误
    pub fn internal_with_source<S, E>(message: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<anyhow::Error>,
    {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 剥离上下文包装，返回最内层的错误
    #[must_use]
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// 错误归类（客户端 / 服务端）
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self.root() {
            Self::Auth { .. }
            | Self::HostScope { .. }
            | Self::Validation { .. }
            | Self::NotFound { .. }
            | Self::Ownership { .. } => ErrorCategory::Client,
            _ => ErrorCategory::Server,
        }
    }

    /// 对应的 HTTP 状态码
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self.root() {
            Self::Auth { .. } => StatusCode::UNAUTHORIZED,
            Self::HostScope { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Ownership { .. } => StatusCode::FORBIDDEN,
            Self::Transport { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 稳定的错误代码，用于日志
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self.root() {
            Self::Auth { .. } => "AUTH_ERROR",
            Self::HostScope { .. } => "HOST_SCOPE_ERROR",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Ownership { .. } => "OWNERSHIP_ERROR",
            Self::Transport { .. } => "TRANSPORT_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::ServerInit { .. } => "SERVER_INIT_ERROR",
            Self::Internal { .. } | Self::Context { .. } => "INTERNAL_ERROR",
            Self::Io { .. } => "IO_ERROR",
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal_with_source("JSON serialization failed", err)
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        Self::config_with_source(format!("TOML parse failed: {err}"), err)
    }
}
