//! # prxctl
//!
//! 通过 gRPC 管理网关路由表的命令行客户端

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use clap::{Args, Parser, Subcommand};
use tonic::Request;
use tonic::transport::{Certificate, Channel, ClientTlsConfig};

use prx_gateway::rpc::proto::{
    DeleteRequest, HealthRequest, ListRequest, ProxyRequest, reverse_client::ReverseClient,
};

/// 单次调用超时
const CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// 网关路由表管理工具
#[derive(Debug, Parser)]
#[command(name = "prxctl", version, about)]
struct Cli {
    /// 网关 gRPC 地址（host:port）
    #[arg(long, env = "PROXY_HOST", default_value = "localhost:50051")]
    addr: String,

    /// 管理令牌
    #[arg(long, env = "PROXY_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// 用于校验服务端证书的 CA（PEM），指定后使用 TLS
    #[arg(long)]
    ca_cert: Option<PathBuf>,

    /// TLS 校验使用的服务端域名
    #[arg(long)]
    domain: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// 新增路由
    Add(RecordArgs),
    /// 更新路由
    Update(RecordArgs),
    /// 删除路由
    Delete {
        /// 入站主机名
        #[arg(long)]
        from: String,
    },
    /// 列出全部路由
    List,
    /// 健康检查
    Health,
}

#[derive(Debug, Args)]
struct RecordArgs {
    /// 入站主机名
    #[arg(long)]
    from: String,
    /// 后端基础 URL
    #[arg(long)]
    to: String,
    /// PEM 证书文件
    #[arg(long)]
    cert: PathBuf,
    /// PEM 私钥文件
    #[arg(long)]
    key: PathBuf,
}

impl RecordArgs {
    fn into_request(self) -> Result<ProxyRequest> {
        Ok(ProxyRequest {
            from: self.from,
            to: self.to,
            cert: read_base64(&self.cert)?,
            key: read_base64(&self.key)?,
        })
    }
}

fn read_base64(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(STANDARD.encode(bytes))
}

async fn connect(cli: &Cli) -> Result<ReverseClient<Channel>> {
    let scheme = if cli.ca_cert.is_some() { "https" } else { "http" };
    let mut endpoint = Channel::from_shared(format!("{scheme}://{}", cli.addr))
        .with_context(|| format!("invalid address: {}", cli.addr))?
        .connect_timeout(CALL_TIMEOUT)
        .timeout(CALL_TIMEOUT);

    if let Some(ca_path) = &cli.ca_cert {
        let ca = std::fs::read(ca_path)
            .with_context(|| format!("failed to read {}", ca_path.display()))?;
        let mut tls = ClientTlsConfig::new().ca_certificate(Certificate::from_pem(ca));
        if let Some(domain) = &cli.domain {
            tls = tls.domain_name(domain.clone());
        }
        endpoint = endpoint.tls_config(tls).context("invalid TLS configuration")?;
    }

    let channel = endpoint
        .connect()
        .await
        .with_context(|| format!("failed to connect to {}", cli.addr))?;
    Ok(ReverseClient::new(channel))
}

fn authorized<T>(message: T, token: Option<&str>) -> Result<Request<T>> {
    let mut request = Request::new(message);
    if let Some(token) = token {
        let value = format!("Bearer {token}")
            .parse()
            .context("token contains characters not allowed in metadata")?;
        request.metadata_mut().insert("authorization", value);
    }
    Ok(request)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut client = connect(&cli).await?;
    let token = cli.token.as_deref();

    match cli.command {
        Command::Add(args) => {
            let from = args.from.clone();
            client.add(authorized(args.into_request()?, token)?).await?;
            println!("added {from}");
        }
        Command::Update(args) => {
            let from = args.from.clone();
            client.update(authorized(args.into_request()?, token)?).await?;
            println!("updated {from}");
        }
        Command::Delete { from } => {
            client
                .delete(authorized(DeleteRequest { from: from.clone() }, token)?)
                .await?;
            println!("deleted {from}");
        }
        Command::List => {
            let records = client
                .list(authorized(ListRequest {}, token)?)
                .await?
                .into_inner()
                .records;
            if records.is_empty() {
                println!("no routes");
            }
            for record in records {
                println!("{}\t{}", record.from, record.to);
            }
        }
        Command::Health => {
            let health = client
                .health(authorized(HealthRequest {}, token)?)
                .await?
                .into_inner();
            println!("{} {} {}", health.status, health.time, health.version);
        }
    }

    Ok(())
}
