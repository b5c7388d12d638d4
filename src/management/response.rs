//! # API 响应结构
//!
//! 管理接口统一使用 `{ success, data?, error? }` 包装。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// # 标准响应包装
#[derive(Debug, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// 是否成功
    pub success: bool,
    /// 成功时的数据
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// 失败时的错误消息
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// # API响应枚举
///
/// 统一所有API出口，方便转换为 `axum::response::Response`
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    /// 200 + data
    Success(T),
    /// 201 + data
    Created(T),
    /// 200，无 data
    SuccessWithoutData,
    /// 204，无响应体
    NoContent,
    /// 指定状态码与错误消息
    Error(StatusCode, String),
    /// 由网关错误推导状态码
    AppError(GatewayError),
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        match self {
            Self::Success(data) => envelope(StatusCode::OK, Some(data), None),
            Self::Created(data) => envelope(StatusCode::CREATED, Some(data), None),
            Self::SuccessWithoutData => envelope::<()>(StatusCode::OK, None, None),
            Self::NoContent => StatusCode::NO_CONTENT.into_response(),
            Self::Error(status, message) => envelope::<()>(status, None, Some(message)),
            Self::AppError(error) => {
                envelope::<()>(error.status_code(), None, Some(error.to_string()))
            }
        }
    }
}

fn envelope<T: Serialize>(status: StatusCode, data: Option<T>, error: Option<String>) -> Response {
    (
        status,
        Json(Envelope {
            success: error.is_none(),
            data,
            error,
        }),
    )
        .into_response()
}

/// 200 成功响应
pub fn success<T: Serialize>(data: T) -> Response {
    ApiResponse::Success(data).into_response()
}

/// 201 创建成功响应
pub fn created<T: Serialize>(data: T) -> Response {
    ApiResponse::Created(data).into_response()
}

/// 200 无数据响应
#[must_use]
pub fn success_without_data() -> Response {
    ApiResponse::<()>::SuccessWithoutData.into_response()
}

/// 204 响应
#[must_use]
pub fn no_content() -> Response {
    ApiResponse::<()>::NoContent.into_response()
}

/// 错误响应
pub fn app_error(error: GatewayError) -> Response {
    ApiResponse::<()>::AppError(error).into_response()
}

/// 自定义错误响应
pub fn error(status: StatusCode, message: impl Into<String>) -> Response {
    ApiResponse::<()>::Error(status, message.into()).into_response()
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        app_error(self)
    }
}
