//! # PRX Gateway 主程序
//!
//! 启动代理与管理监听，直到收到信号或监听任务失败

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use prx_gateway::{
    config::{CONFIG_PATH_ENV, ConfigManager},
    linfo,
    logging::{self, LogComponent, LogStage, log_gateway_error},
    supervisor,
};

/// 集群原生反向代理网关
#[derive(Debug, Parser)]
#[command(name = "prx-gateway", version, about)]
struct Cli {
    /// TOML 配置文件路径
    #[arg(short, long, env = CONFIG_PATH_ENV)]
    config: Option<PathBuf>,

    /// 日志级别（`RUST_LOG` 优先）
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let manager = ConfigManager::load(cli.config.as_deref());
    let log_level = cli.log_level.clone().or_else(|| {
        manager
            .as_ref()
            .ok()
            .and_then(|manager| manager.config().log_level.clone())
    });
    logging::init_logging(log_level.as_deref());

    let config = match manager {
        Ok(manager) => manager.config(),
        Err(e) => {
            log_gateway_error(
                "system",
                LogStage::Startup,
                LogComponent::Config,
                "config_load_failed",
                "配置加载失败",
                &e,
            );
            return ExitCode::FAILURE;
        }
    };

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "service_starting",
        "服务启动",
        version = prx_gateway::build_version()
    );

    match supervisor::run(config).await {
        Ok(reason) => {
            linfo!(
                "system",
                LogStage::Shutdown,
                LogComponent::Main,
                "service_shutdown",
                &format!("服务已停止: {reason}")
            );
            if reason.exit_code() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            log_gateway_error(
                "system",
                LogStage::Startup,
                LogComponent::Main,
                "service_start_failed",
                "服务启动失败",
                &e,
            );
            ExitCode::FAILURE
        }
    }
}
