//! # 日志配置模块
//!
//! 初始化 `tracing` 订阅器，并提供带阶段/组件标签的结构化日志宏

use std::env;
use std::fmt;

use tracing_subscriber::{EnvFilter, fmt as fmt_layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::GatewayError;

/// 日志所处的处理阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogStage {
    /// 启动
    Startup,
    /// 关闭
    Shutdown,
    /// 令牌校验
    Authentication,
    /// 请求入口
    RequestStart,
    /// 转发到后端
    Forward,
    /// 后端响应
    Response,
    /// 管理操作
    Control,
    /// 缓存读写
    Cache,
    /// 集群存储读写
    Store,
    /// 错误处理
    Error,
}

impl LogStage {
    /// 稳定的小写名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::Authentication => "authentication",
            Self::RequestStart => "request_start",
            Self::Forward => "forward",
            Self::Response => "response",
            Self::Control => "control",
            Self::Cache => "cache",
            Self::Store => "store",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 产生日志的组件
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogComponent {
    /// 进程入口
    Main,
    /// 服务器生命周期
    Supervisor,
    /// 配置加载
    Config,
    /// JWT
    Auth,
    /// 映射缓存
    Cache,
    /// Kubernetes / 内存存储
    Store,
    /// 代理分发
    Proxy,
    /// 控制服务
    Control,
    /// HTTP 管理接口
    Management,
    /// gRPC 接口
    Rpc,
}

impl LogComponent {
    /// 稳定的小写名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Supervisor => "supervisor",
            Self::Config => "config",
            Self::Auth => "auth",
            Self::Cache => "cache",
            Self::Store => "store",
            Self::Proxy => "proxy",
            Self::Control => "control",
            Self::Management => "management",
            Self::Rpc => "rpc",
        }
    }
}

impl fmt::Display for LogComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 结构化 info 日志
///
/// `linfo!(request_id, stage, component, operation, description, key = value, ...)`
#[macro_export]
macro_rules! linfo {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr $(, $key:ident = $value:expr)* $(,)?) => {
        ::tracing::info!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            $($key = %$value,)*
            "{}",
            $description
        )
    };
}

/// 结构化 warn 日志
#[macro_export]
macro_rules! lwarn {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr $(, $key:ident = $value:expr)* $(,)?) => {
        ::tracing::warn!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            $($key = %$value,)*
            "{}",
            $description
        )
    };
}

/// 结构化 error 日志
#[macro_export]
macro_rules! lerror {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr $(, $key:ident = $value:expr)* $(,)?) => {
        ::tracing::error!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            $($key = %$value,)*
            "{}",
            $description
        )
    };
}

/// 结构化 debug 日志
#[macro_export]
macro_rules! ldebug {
    ($request_id:expr, $stage:expr, $component:expr, $operation:expr, $description:expr $(, $key:ident = $value:expr)* $(,)?) => {
        ::tracing::debug!(
            request_id = %$request_id,
            stage = %$stage,
            component = %$component,
            operation = %$operation,
            $($key = %$value,)*
            "{}",
            $description
        )
    };
}

/// 记录一个网关错误，客户端错误用 warn，服务端错误用 error
pub fn log_gateway_error(
    request_id: &str,
    stage: LogStage,
    component: LogComponent,
    operation: &str,
    description: &str,
    error: &GatewayError,
) {
    match error.category() {
        crate::error::ErrorCategory::Client => {
            crate::lwarn!(
                request_id,
                stage,
                component,
                operation,
                description,
                error_code = error.error_code(),
                error = error
            );
        }
        crate::error::ErrorCategory::Server => {
            crate::lerror!(
                request_id,
                stage,
                component,
                operation,
                description,
                error_code = error.error_code(),
                error = format!("{error:?}")
            );
        }
    }
}

/// 默认日志过滤器
pub const DEFAULT_LOG_FILTER: &str = "info,prx_gateway=debug,kube=warn,hyper=warn,h2=warn";

/// 初始化日志系统
///
/// `RUST_LOG` 优先；否则使用 `log_level` 加上默认的模块级别
pub fn init_logging(log_level: Option<&str>) {
    let default_filter = log_level.map_or_else(
        || DEFAULT_LOG_FILTER.to_string(),
        |level| format!("{level},kube=warn,hyper=warn,h2=warn"),
    );

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    // 测试中可能被多次调用，重复初始化直接忽略
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            fmt_layer::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .try_init();
}
