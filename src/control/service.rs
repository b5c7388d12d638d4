//! # 控制服务实现
//!
//! 每个操作的流程固定为：授权 → 参数校验 → 存储修改 → 缓存更新。
//! 存储修改运行在独立任务中，调用方（例如断开的 HTTP 连接）被取消时修改仍会完成。

use std::future::Future;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{SecondsFormat, Utc};
use url::Url;

use super::types::{
    DeleteRecordRequest, Grant, HealthStatus, Operation, ProxyRecordRequest, RouteEntry,
};
use crate::auth::{JwtManager, extract_bearer_token};
use crate::cache::MappingCache;
use crate::config::AccessConfig;
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage, log_gateway_error};
use crate::store::RoutingRecord;
use crate::{lerror, linfo};

/// 控制服务
pub struct ControlService {
    jwt: Arc<JwtManager>,
    cache: Arc<MappingCache>,
    access: AccessConfig,
    version: String,
}

impl ControlService {
    /// 创建控制服务
    pub fn new(
        jwt: Arc<JwtManager>,
        cache: Arc<MappingCache>,
        access: AccessConfig,
        version: impl Into<String>,
    ) -> Self {
        Self {
            jwt,
            cache,
            access,
            version: version.into(),
        }
    }

    /// 映射缓存
    #[must_use]
    pub fn cache(&self) -> &Arc<MappingCache> {
        &self.cache
    }

    /// 访问控制配置
    #[must_use]
    pub const fn access(&self) -> &AccessConfig {
        &self.access
    }

    /// 操作是否需要令牌
    #[must_use]
    pub const fn requires_auth(&self, operation: Operation) -> bool {
        match operation {
            Operation::Add | Operation::Update | Operation::Delete => true,
            Operation::List => self.access.list_requires_auth,
            Operation::Health => self.access.health_requires_auth,
        }
    }

    /// 校验认证头并签发操作凭据
    pub fn authorize(&self, operation: Operation, authorization: Option<&str>) -> Result<Grant> {
        if !self.requires_auth(operation) {
            return Ok(Grant::new(operation));
        }

        let result = extract_bearer_token(authorization)
            .and_then(|token| self.jwt.validate_token(token));
        if let Err(err) = result {
            log_gateway_error(
                "system",
                LogStage::Authentication,
                LogComponent::Auth,
                operation.as_str(),
                "令牌校验失败",
                &err,
            );
            return Err(err);
        }

        Ok(Grant::new(operation))
    }

    /// 新增路由
    pub async fn add(&self, grant: &Grant, request: ProxyRecordRequest) -> Result<()> {
        ensure_grant(grant, Operation::Add)?;
        let record = validate_record(&request)?;

        let cache = Arc::clone(&self.cache);
        run_detached(async move { cache.write_through(&record).await }).await?;

        linfo!(
            "system",
            LogStage::Control,
            LogComponent::Control,
            "add",
            "路由已添加",
            from = request.from.trim(),
            to = request.to.trim()
        );
        Ok(())
    }

    /// 更新路由：先删除再添加
    ///
    /// 删除成功而添加失败时不会回滚，该主机此时没有路由。
    pub async fn update(&self, grant: &Grant, request: ProxyRecordRequest) -> Result<()> {
        ensure_grant(grant, Operation::Update)?;
        let record = validate_record(&request)?;

        let cache = Arc::clone(&self.cache);
        run_detached(async move {
            cache.delete_through(&record.from).await?;
            if let Err(err) = cache.write_through(&record).await {
                lerror!(
                    "system",
                    LogStage::Control,
                    LogComponent::Control,
                    "update_partial",
                    "更新时旧路由已删除但新路由写入失败，该主机当前没有路由",
                    host = record.from,
                    error = err
                );
                return Err(err);
            }
            Ok(())
        })
        .await?;

        linfo!(
            "system",
            LogStage::Control,
            LogComponent::Control,
            "update",
            "路由已更新",
            from = request.from.trim(),
            to = request.to.trim()
        );
        Ok(())
    }

    /// 删除路由
    pub async fn delete(&self, grant: &Grant, request: DeleteRecordRequest) -> Result<()> {
        ensure_grant(grant, Operation::Delete)?;
        let host = request.from.trim().to_string();
        if host.is_empty() {
            return Err(GatewayError::validation(vec![(
                "from".to_string(),
                "from is required".to_string(),
            )]));
        }

        let cache = Arc::clone(&self.cache);
        let target = host.clone();
        run_detached(async move { cache.delete_through(&target).await }).await?;

        linfo!("system", LogStage::Control, LogComponent::Control, "delete", "路由已删除", from = host);
        Ok(())
    }

    /// 列出全部路由（按主机名排序）；空列表表示没有内容
    pub async fn list(&self, grant: &Grant) -> Result<Vec<RouteEntry>> {
        ensure_grant(grant, Operation::List)?;

        let mut entries: Vec<RouteEntry> = self
            .cache
            .lookup_all()
            .await?
            .into_iter()
            .map(|(from, to)| RouteEntry { from, to })
            .collect();
        entries.sort();
        Ok(entries)
    }

    /// 健康检查
    pub fn health(&self, grant: &Grant) -> Result<HealthStatus> {
        ensure_grant(grant, Operation::Health)?;

        Ok(HealthStatus {
            status: "OK".to_string(),
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            version: self.version.clone(),
        })
    }
}

fn ensure_grant(grant: &Grant, operation: Operation) -> Result<()> {
    if grant.operation() == operation {
        Ok(())
    } else {
        Err(GatewayError::auth(format!(
            "credential was issued for {} not {operation}",
            grant.operation()
        )))
    }
}

/// 在独立任务中执行存储修改并等待结果
async fn run_detached<F>(task: F) -> Result<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(task)
        .await
        .map_err(|e| GatewayError::internal_with_source("control task failed", e))?
}

/// 校验并解码路由记录
///
/// 先检查所有必填字段，再检查格式；每一步都报告全部出错字段。
pub fn validate_record(request: &ProxyRecordRequest) -> Result<RoutingRecord> {
    let from = request.from.trim();
    let to = request.to.trim();
    let cert = request.cert.trim();
    let key = request.key.trim();

    let blanks: Vec<(String, String)> = [("from", from), ("to", to), ("cert", cert), ("key", key)]
        .into_iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| (field.to_string(), format!("{field} is required")))
        .collect();
    if !blanks.is_empty() {
        return Err(GatewayError::validation(blanks));
    }

    let mut problems = Vec::new();

    if let Err(problem) = validate_target(to) {
        problems.push(("to".to_string(), problem));
    }

    let cert_bytes = STANDARD.decode(cert).map_err(|_| {
        problems.push(("cert".to_string(), "cert must be base64 encoded".to_string()));
    });
    let key_bytes = STANDARD.decode(key).map_err(|_| {
        problems.push(("key".to_string(), "key must be base64 encoded".to_string()));
    });

    match (cert_bytes, key_bytes) {
        (Ok(cert), Ok(key)) if problems.is_empty() => Ok(RoutingRecord {
            from: from.to_string(),
            to: to.to_string(),
            cert,
            key,
        }),
        _ => Err(GatewayError::validation(problems)),
    }
}

fn validate_target(to: &str) -> std::result::Result<(), String> {
    let url = Url::parse(to).map_err(|e| format!("to is not a valid URL: {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err("to must use http or https".to_string());
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err("to must include a host".to_string());
    }
    Ok(())
}
