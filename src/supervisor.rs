//! # 服务监督器
//!
//! 构建共享服务，启动 HTTP 与 gRPC 两个监听任务，等待第一个终止原因后关闭。
//!
//! 状态流转：`Starting → Running → Terminating → Stopped`

use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::auth::JwtManager;
use crate::cache::MappingCache;
use crate::config::{AppConfig, TenantIdentity};
use crate::control::ControlService;
use crate::error::{Context, GatewayError, Result};
use crate::logging::{LogComponent, LogStage, log_gateway_error};
use crate::management::{AppState, HttpServer};
use crate::proxy::ProxyDispatcher;
use crate::rpc::RpcServer;
use crate::store::build_store;
use crate::{lerror, linfo};

/// 监督器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// 构建服务中
    Starting,
    /// 监听任务运行中
    Running,
    /// 收到终止原因，正在关闭
    Terminating,
    /// 已关闭
    Stopped,
}

impl SupervisorState {
    /// 日志中使用的名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Terminating => "terminating",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 终止原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// SIGINT / SIGTERM
    Signal(&'static str),
    /// 监听任务出错、panic 或意外退出
    Fatal(String),
}

impl ExitReason {
    /// 进程退出码
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Signal(_) => 0,
            Self::Fatal(_) => 1,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(f, "{signal} received"),
            Self::Fatal(reason) => f.write_str(reason),
        }
    }
}

/// 启动阶段构建的服务集合
pub struct Services {
    /// 租户身份
    pub tenant: Arc<TenantIdentity>,
    /// 令牌管理器
    pub jwt: Arc<JwtManager>,
    /// 映射缓存
    pub cache: Arc<MappingCache>,
    /// 控制服务（HTTP 与 gRPC 共享）
    pub control: Arc<ControlService>,
    /// 代理分发器
    pub dispatcher: Arc<ProxyDispatcher>,
}

fn transition(state: SupervisorState) {
    let stage = match state {
        SupervisorState::Starting | SupervisorState::Running => LogStage::Startup,
        SupervisorState::Terminating | SupervisorState::Stopped => LogStage::Shutdown,
    };
    linfo!(
        "system",
        stage,
        LogComponent::Supervisor,
        "state_transition",
        &format!("supervisor {state}"),
        state = state
    );
}

/// 构建共享服务
///
/// 存储不可用、缓存预加载失败都会导致启动失败。
pub async fn initialize_services(config: &AppConfig) -> Result<Services> {
    let tenant = Arc::new(TenantIdentity::from_config(config));
    let jwt = Arc::new(JwtManager::new(&tenant.secret).context("Failed to create JWT manager")?);

    let store = build_store(&config.store)
        .await
        .context("Failed to connect cluster store")?;
    let cache = Arc::new(MappingCache::new(store, Arc::clone(&tenant)));
    if config.cache.warm_on_start {
        cache.warm().await.context("Failed to warm mapping cache")?;
    }

    let control = Arc::new(ControlService::new(
        Arc::clone(&jwt),
        Arc::clone(&cache),
        config.access.clone(),
        crate::build_version(),
    ));
    let dispatcher = Arc::new(
        ProxyDispatcher::new(Arc::clone(&cache), &config.proxy)
            .context("Failed to create proxy dispatcher")?,
    );

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Supervisor,
        "services_ready",
        "共享服务初始化完成",
        namespace = tenant.namespace,
        tenant = tenant.name,
        store = format!("{:?}", config.store.backend).to_lowercase()
    );

    Ok(Services {
        tenant,
        jwt,
        cache,
        control,
        dispatcher,
    })
}

/// 签发并记录诊断令牌
fn log_diagnostic_token(jwt: &JwtManager) -> Result<()> {
    let token = jwt.issue_token()?;
    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Auth,
        "diagnostic_token",
        "已签发管理令牌",
        token = token
    );
    Ok(())
}

/// 等待 Ctrl+C
async fn ctrl_c_signal() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        lerror!(
            "system",
            LogStage::Shutdown,
            LogComponent::Supervisor,
            "ctrl_c_error",
            &format!("Failed to listen for Ctrl+C: {e:?}")
        );
        std::future::pending::<()>().await;
    }
    "SIGINT"
}

/// 等待 SIGTERM
#[cfg(unix)]
async fn terminate_signal() -> &'static str {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut stream) => {
            stream.recv().await;
        }
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::Supervisor,
                "sigterm_error",
                &format!("Failed to listen for SIGTERM: {e:?}")
            );
            std::future::pending::<()>().await;
        }
    }
    "SIGTERM"
}

#[cfg(not(unix))]
async fn terminate_signal() -> &'static str {
    std::future::pending::<()>().await;
    "SIGTERM"
}

/// 处理监听任务退出结果
fn handle_task_result(
    server_name: &str,
    result: std::result::Result<Result<()>, tokio::task::JoinError>,
) -> ExitReason {
    match result {
        Ok(Err(e)) => {
            log_gateway_error(
                "system",
                LogStage::Shutdown,
                LogComponent::Supervisor,
                &format!("{}_error", server_name.to_lowercase().replace(' ', "_")),
                &format!("{server_name} error"),
                &e,
            );
            ExitReason::Fatal(format!("{server_name} error: {e}"))
        }
        Err(e) => {
            lerror!(
                "system",
                LogStage::Shutdown,
                LogComponent::Supervisor,
                &format!("{}_panic", server_name.to_lowercase().replace(' ', "_")),
                &format!("{server_name} panicked: {e:?}")
            );
            ExitReason::Fatal(format!("{server_name} panic"))
        }
        Ok(Ok(())) => ExitReason::Fatal(format!("{server_name} exited unexpectedly")),
    }
}

/// 等待第一个终止原因
async fn await_exit_reason(
    http_task: &mut JoinHandle<Result<()>>,
    rpc_task: &mut JoinHandle<Result<()>>,
) -> ExitReason {
    tokio::select! {
        signal = ctrl_c_signal() => ExitReason::Signal(signal),
        signal = terminate_signal() => ExitReason::Signal(signal),
        result = http_task => handle_task_result("HTTP server", result),
        result = rpc_task => handle_task_result("RPC server", result),
    }
}

/// 运行网关，返回终止原因
///
/// 启动阶段的错误直接返回；运行阶段的错误转换为 `ExitReason::Fatal`。
pub async fn run(config: Arc<AppConfig>) -> Result<ExitReason> {
    transition(SupervisorState::Starting);

    let services = initialize_services(&config).await?;
    log_diagnostic_token(&services.jwt)?;

    let http_addr = config
        .http
        .bind_address()
        .map_err(|e| GatewayError::config_with_source("invalid HTTP bind address", e))?;
    let http_server = HttpServer::new(
        http_addr,
        AppState::new(
            Arc::clone(&services.control),
            Arc::clone(&services.dispatcher),
            Arc::clone(&services.tenant),
        ),
    );
    let rpc_server = RpcServer::new(&config.rpc, Arc::clone(&services.control))?;

    let mut http_task = tokio::spawn(http_server.serve());
    let mut rpc_task = tokio::spawn(rpc_server.serve());
    transition(SupervisorState::Running);

    let reason = await_exit_reason(&mut http_task, &mut rpc_task).await;

    transition(SupervisorState::Terminating);
    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Supervisor,
        "shutdown_initiated",
        &format!("Shutting down: {reason}")
    );
    http_task.abort();
    rpc_task.abort();

    transition(SupervisorState::Stopped);
    Ok(reason)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreBackend;

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitReason::Signal("SIGTERM").exit_code(), 0);
        assert_eq!(ExitReason::Fatal("HTTP server error".to_string()).exit_code(), 1);
    }

    #[tokio::test]
    async fn test_task_error_is_fatal() {
        let task: JoinHandle<Result<()>> =
            tokio::spawn(async { Err(GatewayError::server_init("address in use")) });
        let reason = handle_task_result("HTTP server", task.await);
        assert!(matches!(reason, ExitReason::Fatal(ref message) if message.contains("address in use")));
    }

    #[tokio::test]
    async fn test_task_panic_is_fatal() {
        let task: JoinHandle<Result<()>> = tokio::spawn(async { panic!("boom") });
        let reason = handle_task_result("RPC server", task.await);
        assert_eq!(reason, ExitReason::Fatal("RPC server panic".to_string()));
    }

    #[tokio::test]
    async fn test_first_exit_wins() {
        let mut http: JoinHandle<Result<()>> =
            tokio::spawn(async { Err(GatewayError::server_init("bind failed")) });
        let mut rpc: JoinHandle<Result<()>> = tokio::spawn(std::future::pending());

        let reason = await_exit_reason(&mut http, &mut rpc).await;
        rpc.abort();

        assert_eq!(reason.exit_code(), 1);
        assert!(rpc.await.unwrap_err().is_cancelled());
    }

    #[tokio::test]
    async fn test_initialize_with_memory_store() {
        let mut config = AppConfig::default();
        config.tenant.namespace = "shop".to_string();
        config.tenant.jwt_secret = "secret".to_string();
        config.store.backend = StoreBackend::Memory;
        config.cache.warm_on_start = true;

        let services = initialize_services(&config).await.unwrap();
        assert_eq!(services.tenant.name, "shop");
        assert!(services.cache.is_empty());
        assert!(log_diagnostic_token(&services.jwt).is_ok());
    }
}
