//! # gRPC 往返测试
//!
//! 在本地端口启动明文 tonic 服务器，用生成的客户端调用全部方法

mod common;

use std::sync::Arc;

use tokio::net::TcpListener;
use tonic::transport::Channel;
use tonic::{Code, Request};

use common::{TestStack, record_request};
use prx_gateway::rpc::RpcServer;
use prx_gateway::rpc::proto::{
    DeleteRequest, HealthRequest, ListRequest, ProxyRequest, reverse_client::ReverseClient,
};

async fn start(stack: &TestStack) -> ReverseClient<Channel> {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = RpcServer::plaintext(addr, Arc::clone(&stack.control));
    tokio::spawn(server.serve_on(listener));

    let channel = Channel::from_shared(format!("http://{addr}"))
        .unwrap()
        .connect()
        .await
        .unwrap();
    ReverseClient::new(channel)
}

fn with_token<T>(message: T, token: &str) -> Request<T> {
    let mut request = Request::new(message);
    request
        .metadata_mut()
        .insert("authorization", token.parse().unwrap());
    request
}

fn proxy_request(from: &str, to: &str) -> ProxyRequest {
    let record = record_request(from, to);
    ProxyRequest {
        from: record.from,
        to: record.to,
        cert: record.cert,
        key: record.key,
    }
}

#[tokio::test]
async fn test_rpc_round_trip() {
    let stack = TestStack::new();
    let token = stack.bearer();
    let mut client = start(&stack).await;

    client
        .add(with_token(proxy_request("a.example.com", "http://a"), &token))
        .await
        .unwrap();
    client
        .update(with_token(proxy_request("a.example.com", "http://a2"), &token))
        .await
        .unwrap();
    client
        .add(with_token(proxy_request("b.example.com", "http://b"), &token))
        .await
        .unwrap();

    let records = client
        .list(with_token(ListRequest {}, &token))
        .await
        .unwrap()
        .into_inner()
        .records;
    let pairs: Vec<(String, String)> = records.into_iter().map(|r| (r.from, r.to)).collect();
    assert_eq!(
        pairs,
        vec![
            ("a.example.com".to_string(), "http://a2".to_string()),
            ("b.example.com".to_string(), "http://b".to_string()),
        ]
    );

    client
        .delete(with_token(DeleteRequest { from: "a.example.com".to_string() }, &token))
        .await
        .unwrap();
    assert_eq!(stack.cache.peek("a.example.com"), None);

    let health = client
        .health(Request::new(HealthRequest {}))
        .await
        .unwrap()
        .into_inner();
    assert_eq!(health.status, "OK");
    assert_eq!(health.version, "test-version");
}

#[tokio::test]
async fn test_rpc_status_codes() {
    let stack = TestStack::new();
    stack.store.insert_foreign(&stack.tenant, "legacy.example.com", "helm");
    let token = stack.bearer();
    let mut client = start(&stack).await;

    let status = client
        .add(Request::new(proxy_request("a.example.com", "http://a")))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let status = client
        .list(with_token(ListRequest {}, "Bearer forged"))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unauthenticated);

    let status = client
        .add(with_token(proxy_request("a.example.com", ""), &token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    let status = client
        .add(with_token(proxy_request("legacy.example.com", "http://l"), &token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::PermissionDenied);

    stack.store.fail_next(1);
    let status = client
        .add(with_token(proxy_request("c.example.com", "http://c"), &token))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::Unavailable);

    assert_eq!(stack.cache.peek("c.example.com"), None);
}
