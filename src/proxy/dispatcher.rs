//! # 代理分发器
//!
//! 所有非 `/api` 请求都由这里处理：
//! 1. 从 `Host`（或 URI authority、`X-Forwarded-Host`）得到主机名
//! 2. 通过映射缓存解析后端基础 URL
//! 3. 拼接路径与查询参数，转发一次（不重试、不跟随重定向），流式回传响应
//!
//! 分发器的错误响应不带 JSON 包装，只有状态码。

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use url::Url;

use crate::cache::MappingCache;
use crate::config::ProxyConfig;
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage, log_gateway_error};
use crate::management::middleware::RequestId;
use crate::{ldebug, linfo, lwarn};

/// 不应被转发的逐跳头部
const HOP_BY_HOP_HEADERS: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

const X_FORWARDED_FOR: &str = "x-forwarded-for";
const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// 代理分发器
pub struct ProxyDispatcher {
    cache: Arc<MappingCache>,
    client: reqwest::Client,
}

impl ProxyDispatcher {
    /// 创建分发器
    pub fn new(cache: Arc<MappingCache>, config: &ProxyConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .no_proxy()
            .build()
            .map_err(|e| GatewayError::server_init_with_source("failed to build proxy client", e))?;

        Ok(Self { cache, client })
    }

    /// 处理一个代理请求
    pub async fn dispatch(&self, request: Request) -> Response {
        let request_id = request
            .extensions()
            .get::<RequestId>()
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), ToString::to_string);

        if !is_forwardable_method(request.method()) {
            return StatusCode::METHOD_NOT_ALLOWED.into_response();
        }

        let Some(host) = resolve_host(request.headers(), request.uri()) else {
            lwarn!(
                request_id,
                LogStage::RequestStart,
                LogComponent::Proxy,
                "missing_host",
                "请求缺少 Host"
            );
            return StatusCode::BAD_REQUEST.into_response();
        };

        let target = match self.cache.lookup(&host).await {
            Ok(target) => target,
            Err(err) => {
                log_gateway_error(
                    &request_id,
                    LogStage::RequestStart,
                    LogComponent::Proxy,
                    "lookup",
                    &format!("无法解析主机 {host}"),
                    &err,
                );
                return match err.root() {
                    GatewayError::NotFound { .. } => StatusCode::NOT_FOUND.into_response(),
                    _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                };
            }
        };

        let Some(base) = parse_target(&target) else {
            lwarn!(
                request_id,
                LogStage::RequestStart,
                LogComponent::Proxy,
                "invalid_target",
                "映射的后端地址不是有效的 http(s) URL",
                host = host,
                target = target
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        linfo!(
            request_id,
            LogStage::Forward,
            LogComponent::Proxy,
            "forward",
            "转发请求",
            host = host,
            target = target,
            method = request.method(),
            path = request.uri().path()
        );

        self.forward(&request_id, &base, request).await
    }

    async fn forward(&self, request_id: &str, base: &Url, request: Request) -> Response {
        let client_addr = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        let (parts, body) = request.into_parts();
        let url = join_target(base, parts.uri.path(), parts.uri.query());

        let mut headers = strip_hop_by_hop(&parts.headers);
        if let Some(addr) = client_addr {
            append_forwarded_for(&mut headers, &addr.ip().to_string());
        }

        // 没有请求体的请求不附带流，避免以 chunked 方式发送空 GET
        let has_body = parts.headers.contains_key(header::CONTENT_LENGTH)
            || parts.headers.contains_key(header::TRANSFER_ENCODING);

        let mut builder = self.client.request(parts.method, url.as_str()).headers(headers);
        if has_body {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }
        let upstream = builder.send().await;

        let upstream = match upstream {
            Ok(response) => response,
            Err(err) => {
                lwarn!(
                    request_id,
                    LogStage::Forward,
                    LogComponent::Proxy,
                    "backend_unreachable",
                    "后端请求失败",
                    url = url,
                    error = err
                );
                return StatusCode::BAD_GATEWAY.into_response();
            }
        };

        ldebug!(
            request_id,
            LogStage::Response,
            LogComponent::Proxy,
            "backend_response",
            "收到后端响应",
            status = upstream.status()
        );

        let status = upstream.status();
        let headers = strip_hop_by_hop(upstream.headers());
        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// 是否为允许转发的方法
#[must_use]
pub fn is_forwardable_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::PUT | Method::POST | Method::PATCH | Method::DELETE
    )
}

/// 解析请求的目标主机（不含端口）
///
/// `Host` 头优先，其次是 URI authority，都为空时使用 `X-Forwarded-Host` 的第一个值。
#[must_use]
pub fn resolve_host(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let direct = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .or_else(|| uri.authority().map(|a| a.as_str()).filter(|v| !v.is_empty()));

    let raw = direct.or_else(|| {
        headers
            .get(X_FORWARDED_HOST)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    })?;

    let host = strip_port(raw);
    (!host.is_empty()).then(|| host.to_string())
}

/// 去掉主机中的端口，支持 `[v6]:port`
#[must_use]
pub fn strip_port(host: &str) -> &str {
    // authority 可能带 userinfo
    let host = host.rsplit('@').next().unwrap_or(host);

    if let Some(rest) = host.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }

    match host.rsplit_once(':') {
        // 多个冒号且无方括号：裸 IPv6 地址
        Some((name, _)) if name.contains(':') => host,
        Some((name, port)) if port.chars().all(|c| c.is_ascii_digit()) => name,
        _ => host,
    }
}

/// 解析映射中的后端 URL，只接受带主机的 http(s) 地址
#[must_use]
pub fn parse_target(target: &str) -> Option<Url> {
    let url = Url::parse(target.trim()).ok()?;
    let valid = matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty());
    valid.then_some(url)
}

/// 将请求路径拼接到后端路径之后并合并查询参数
#[must_use]
pub fn join_target(base: &Url, path: &str, query: Option<&str>) -> Url {
    let base_path = base.path();
    let joined = match (base_path.ends_with('/'), path.starts_with('/')) {
        (true, true) => format!("{base_path}{}", &path[1..]),
        (false, false) => format!("{base_path}/{path}"),
        _ => format!("{base_path}{path}"),
    };

    let query = match (base.query().filter(|q| !q.is_empty()), query.filter(|q| !q.is_empty())) {
        (Some(a), Some(b)) => Some(format!("{a}&{b}")),
        (Some(a), None) => Some(a.to_string()),
        (None, Some(b)) => Some(b.to_string()),
        (None, None) => None,
    };

    let mut url = base.clone();
    url.set_path(&joined);
    url.set_query(query.as_deref());
    url
}

/// 复制头部并移除逐跳头部（包括 `Connection` 中列出的头部）
#[must_use]
pub fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|name| name.trim().to_ascii_lowercase())
        .filter(|name| !name.is_empty())
        .collect();

    let mut filtered = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let lower = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&lower) || listed.iter().any(|l| l == lower) {
            continue;
        }
        filtered.append(name.clone(), value.clone());
    }
    filtered
}

/// 在 `X-Forwarded-For` 末尾追加客户端地址
pub fn append_forwarded_for(headers: &mut HeaderMap, client_ip: &str) {
    let name = HeaderName::from_static(X_FORWARDED_FOR);
    let prior: Vec<&str> = headers
        .get_all(&name)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let combined = if prior.is_empty() {
        client_ip.to_string()
    } else {
        format!("{}, {client_ip}", prior.join(", "))
    };

    if let Ok(value) = HeaderValue::from_str(&combined) {
        headers.insert(name, value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a.example.com", "a.example.com")]
    #[case("a.example.com:8080", "a.example.com")]
    #[case("[::1]:8080", "::1")]
    #[case("[::1]", "::1")]
    #[case("::1", "::1")]
    #[case("127.0.0.1:80", "127.0.0.1")]
    fn test_strip_port(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(strip_port(input), expected);
    }

    #[test]
    fn test_resolve_host_prefers_host_header() {
        let mut headers = HeaderMap::new();
        headers.insert(header::HOST, HeaderValue::from_static("a.example.com:80"));
        headers.insert(X_FORWARDED_HOST, HeaderValue::from_static("b.example.com"));

        let host = resolve_host(&headers, &Uri::from_static("/path"));
        assert_eq!(host.as_deref(), Some("a.example.com"));
    }

    #[test]
    fn test_resolve_host_falls_back_to_forwarded_host() {
        let mut headers = HeaderMap::new();
        headers.insert(X_FORWARDED_HOST, HeaderValue::from_static("b.example.com, c.example.com"));

        let host = resolve_host(&headers, &Uri::from_static("/path"));
        assert_eq!(host.as_deref(), Some("b.example.com"));
    }

    #[test]
    fn test_resolve_host_uses_uri_authority() {
        let host = resolve_host(&HeaderMap::new(), &Uri::from_static("http://c.example.com:81/x"));
        assert_eq!(host.as_deref(), Some("c.example.com"));
    }

    #[test]
    fn test_resolve_host_missing() {
        assert_eq!(resolve_host(&HeaderMap::new(), &Uri::from_static("/x")), None);
    }

    #[rstest]
    #[case("http://svc", "/a/b", None, "http://svc/a/b")]
    #[case("http://svc/", "/a", None, "http://svc/a")]
    #[case("http://svc/base", "/a", None, "http://svc/base/a")]
    #[case("http://svc/base/", "/a", Some("x=1"), "http://svc/base/a?x=1")]
    #[case("http://svc/base?k=v", "/a", Some("x=1"), "http://svc/base/a?k=v&x=1")]
    #[case("https://svc:8443?k=v", "/", None, "https://svc:8443/?k=v")]
    fn test_join_target(
        #[case] base: &str,
        #[case] path: &str,
        #[case] query: Option<&str>,
        #[case] expected: &str,
    ) {
        let base = Url::parse(base).unwrap();
        assert_eq!(join_target(&base, path, query).as_str(), expected);
    }

    #[rstest]
    #[case("http://svc:8080", true)]
    #[case("https://svc/base", true)]
    #[case("ftp://svc", false)]
    #[case("svc:8080", false)]
    #[case("not a url", false)]
    fn test_parse_target(#[case] target: &str, #[case] valid: bool) {
        assert_eq!(parse_target(target).is_some(), valid);
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive, x-private"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert("x-private", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(header::HOST, HeaderValue::from_static("a.example.com"));

        let filtered = strip_hop_by_hop(&headers);
        assert_eq!(filtered.len(), 2);
        assert!(filtered.contains_key(header::CONTENT_TYPE));
        assert!(filtered.contains_key(header::HOST));
    }

    #[test]
    fn test_append_forwarded_for() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "10.0.0.1");
        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.1");

        append_forwarded_for(&mut headers, "10.0.0.2");
        assert_eq!(headers[X_FORWARDED_FOR], "10.0.0.1, 10.0.0.2");
    }

    #[test]
    fn test_method_filter() {
        assert!(is_forwardable_method(&Method::PATCH));
        assert!(!is_forwardable_method(&Method::OPTIONS));
        assert!(!is_forwardable_method(&Method::HEAD));
    }
}
