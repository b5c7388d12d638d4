//! # 错误处理
//!
//! `GatewayError` 覆盖控制面、代理与启动阶段的全部失败；HTTP 状态码与
//! gRPC 状态都从最内层错误推导，`Context` 包装不改变分类。

pub use types::GatewayError;

/// 网关统一的 `Result`
pub type Result<T> = std::result::Result<T, GatewayError>;

pub mod macros;
pub mod types;

/// 为错误附加上下文
pub trait Context<T, E> {
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display;

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display;
}

impl<T, E> Context<T, E> for std::result::Result<T, E>
where
    E: Into<GatewayError>,
{
    #[track_caller]
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display,
    {
        self.with_context(|| context)
    }

    #[track_caller]
    fn with_context<C, F>(self, context: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: std::fmt::Display,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => {
                let context_message = context().to_string();
                Err(GatewayError::Context {
                    context: context_message,
                    source: Box::new(error.into()),
                })
            }
        }
    }
}

/// 错误归类，决定日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// 调用方的问题：令牌、请求体、Host、资源归属（4xx）
    Client,
    /// 存储、后端或网关自身的问题（5xx）
    Server,
}
