//! # 控制面数据类型
//!
//! HTTP 与 gRPC 两种传输共享的请求 / 响应结构

use std::fmt;

use serde::{Deserialize, Serialize};

/// 控制面操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// 新增路由
    Add,
    /// 更新路由
    Update,
    /// 删除路由
    Delete,
    /// 列出路由
    List,
    /// 健康检查
    Health,
}

impl Operation {
    /// 稳定的小写名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::List => "list",
            Self::Health => "health",
        }
    }

    /// 是否修改路由表
    #[must_use]
    pub const fn is_mutation(self) -> bool {
        matches!(self, Self::Add | Self::Update | Self::Delete)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 授权凭据
///
/// 只能通过 `ControlService::authorize` 获得，每个操作都要求持有对应的凭据，
/// 因此令牌校验总是先于参数校验与存储修改。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    operation: Operation,
}

impl Grant {
    pub(crate) const fn new(operation: Operation) -> Self {
        Self { operation }
    }

    /// 凭据覆盖的操作
    #[must_use]
    pub const fn operation(&self) -> Operation {
        self.operation
    }
}

/// Add / Update 请求体
///
/// `cert` 与 `key` 为标准 base64 编码的 PEM 文本
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyRecordRequest {
    /// 入站主机名
    pub from: String,
    /// 后端基础 URL
    pub to: String,
    /// base64 证书
    pub cert: String,
    /// base64 私钥
    pub key: String,
}

impl fmt::Debug for ProxyRecordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyRecordRequest")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("cert_len", &self.cert.len())
            .field("key_len", &self.key.len())
            .finish()
    }
}

/// Delete 请求体
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteRecordRequest {
    /// 要删除的主机名
    pub from: String,
}

/// 列表项
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RouteEntry {
    /// 主机名
    pub from: String,
    /// 后端基础 URL
    pub to: String,
}

/// 健康状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// 固定为 `OK`
    pub status: String,
    /// RFC3339 时间
    pub time: String,
    /// 构建版本
    pub version: String,
}
