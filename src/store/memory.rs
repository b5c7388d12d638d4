//! # 内存存储
//!
//! 与 Kubernetes 实现相同的契约与归属规则，数据保存在进程内。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ClusterStore, RoutingRecord, StoreError, StoreResult};
use crate::config::TenantIdentity;

#[derive(Debug, Default)]
struct MemoryState {
    /// 每个租户命名空间的映射；缺失表示尚未创建
    mappings: HashMap<String, HashMap<String, String>>,
    /// 已创建的 TLS / 路由资源：(租户命名空间, 主机) -> 所有者
    resources: HashMap<(String, String), String>,
    /// 接下来需要失败的调用次数
    fail_next: usize,
    /// 接下来需要失败的 put 次数
    fail_next_put: usize,
    /// 已完成的调用次数
    calls: usize,
}

/// 内存集群存储
#[derive(Debug)]
pub struct MemoryStore {
    owner: String,
    latency: Option<Duration>,
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    /// 创建空存储
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            latency: None,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// 每次调用前等待 `latency`
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// 预置一个由其他系统创建的资源
    pub fn insert_foreign(&self, tenant: &TenantIdentity, host: &str, owner: &str) {
        self.state
            .lock()
            .resources
            .insert((tenant.namespace.clone(), host.to_string()), owner.to_string());
    }

    /// 预置映射条目（不创建资源）
    pub fn seed_mapping(&self, tenant: &TenantIdentity, host: &str, target: &str) {
        self.state
            .lock()
            .mappings
            .entry(tenant.namespace.clone())
            .or_default()
            .insert(host.to_string(), target.to_string());
    }

    /// 让接下来的 `count` 次调用返回传输错误
    pub fn fail_next(&self, count: usize) {
        self.state.lock().fail_next = count;
    }

    /// 让接下来的 `count` 次 put 返回传输错误（其他调用不受影响）
    pub fn fail_next_put(&self, count: usize) {
        self.state.lock().fail_next_put = count;
    }

    /// 已完成的调用次数
    #[must_use]
    pub fn calls(&self) -> usize {
        self.state.lock().calls
    }

    /// 主机的资源是否存在
    #[must_use]
    pub fn has_resources(&self, tenant: &TenantIdentity, host: &str) -> bool {
        self.state
            .lock()
            .resources
            .contains_key(&(tenant.namespace.clone(), host.to_string()))
    }

    async fn begin_call(&self) -> StoreResult<()> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state.lock();
        state.calls += 1;
        if state.fail_next > 0 {
            state.fail_next -= 1;
            return Err(StoreError::Transport("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn get_all(&self, tenant: &TenantIdentity) -> StoreResult<HashMap<String, String>> {
        self.begin_call().await?;

        self.state
            .lock()
            .mappings
            .get(&tenant.namespace)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn put(&self, tenant: &TenantIdentity, record: &RoutingRecord) -> StoreResult<()> {
        self.begin_call().await?;

        let mut state = self.state.lock();
        if state.fail_next_put > 0 {
            state.fail_next_put -= 1;
            return Err(StoreError::Transport("injected put failure".to_string()));
        }

        let resource_key = (tenant.namespace.clone(), record.from.clone());
        if let Some(owner) = state.resources.get(&resource_key) {
            if owner != &self.owner {
                return Err(StoreError::ownership("ingress", &record.from));
            }
        }

        state.resources.insert(resource_key, self.owner.clone());
        state
            .mappings
            .entry(tenant.namespace.clone())
            .or_default()
            .insert(record.from.clone(), record.to.clone());
        Ok(())
    }

    async fn delete(&self, tenant: &TenantIdentity, host: &str) -> StoreResult<()> {
        self.begin_call().await?;

        let mut state = self.state.lock();
        let resource_key = (tenant.namespace.clone(), host.to_string());
        match state.resources.get(&resource_key) {
            Some(owner) if owner == &self.owner => {}
            _ => return Err(StoreError::ownership("ingress", host)),
        }

        state.resources.remove(&resource_key);
        if let Some(mapping) = state.mappings.get_mut(&tenant.namespace) {
            mapping.remove(host);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantIdentity {
        TenantIdentity::new("shop", "shop", "secret")
    }

    fn record(from: &str, to: &str) -> RoutingRecord {
        RoutingRecord {
            from: from.to_string(),
            to: to.to_string(),
            cert: b"cert".to_vec(),
            key: b"key".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new("prx");
        let tenant = tenant();

        store.put(&tenant, &record("a.example.com", "http://a")).await.unwrap();
        let all = store.get_all(&tenant).await.unwrap();
        assert_eq!(all.get("a.example.com").map(String::as_str), Some("http://a"));

        store.delete(&tenant, "a.example.com").await.unwrap();
        assert!(store.get_all(&tenant).await.unwrap().is_empty());
        assert!(!store.has_resources(&tenant, "a.example.com"));
    }

    #[tokio::test]
    async fn test_put_is_idempotent() {
        let store = MemoryStore::new("prx");
        let tenant = tenant();

        store.put(&tenant, &record("a.example.com", "http://a")).await.unwrap();
        store.put(&tenant, &record("a.example.com", "http://b")).await.unwrap();

        let all = store.get_all(&tenant).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["a.example.com"], "http://b");
    }

    #[tokio::test]
    async fn test_foreign_resources_are_protected() {
        let store = MemoryStore::new("prx");
        let tenant = tenant();
        store.insert_foreign(&tenant, "b.example.com", "someone-else");

        let put = store.put(&tenant, &record("b.example.com", "http://b")).await;
        assert!(matches!(put, Err(StoreError::Ownership { .. })));

        let delete = store.delete(&tenant, "b.example.com").await;
        assert!(matches!(delete, Err(StoreError::Ownership { .. })));
        assert!(store.has_resources(&tenant, "b.example.com"));
    }

    #[tokio::test]
    async fn test_delete_missing_host() {
        let store = MemoryStore::new("prx");
        let result = store.delete(&tenant(), "missing.example.com").await;
        assert!(matches!(result, Err(StoreError::Ownership { .. })));
    }

    #[tokio::test]
    async fn test_fail_next() {
        let store = MemoryStore::new("prx");
        store.fail_next(1);

        assert!(matches!(
            store.get_all(&tenant()).await,
            Err(StoreError::Transport(_))
        ));
        assert!(matches!(store.get_all(&tenant()).await, Err(StoreError::NotFound)));
        assert_eq!(store.calls(), 2);
    }
}
